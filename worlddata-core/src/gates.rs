use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::block::{direction_side, side_direction, BlockKind, BlockRef};
use crate::driver::{Context, Rewrite, Targets};
use crate::record::{self, BLOCK_NAMES, MAP_ID};
use crate::roads::{RoadMap, RoadMask};
use crate::select::uniform_pick;
use crate::Result;

const GATE_VARIANTS: [u8; 3] = [0, 1, 2];

fn road_mask_for(roads: &RoadMap, doc: &Value) -> Result<RoadMask> {
    let map_id = record::as_int(record::require(doc, MAP_ID)?).ok_or_else(|| record::missing(MAP_ID))?;
    roads.for_map_id(map_id)
}

/// Resolves `WALLAA{08..11}.ROAD.RMB` gate blocks to a tavern gate when the
/// matching cardinal road exists, otherwise to a farm gate.
pub(crate) struct WallGates {
    roads: RoadMap,
}

impl WallGates {
    pub(crate) fn new(roads: RoadMap) -> Self {
        Self { roads }
    }
}

impl Rewrite for WallGates {
    fn name(&self) -> &'static str {
        "wall-gates"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let mask = road_mask_for(&self.roads, doc)?;
        let names = record::require_array_mut(doc, BLOCK_NAMES)?;

        for name in names.iter_mut() {
            let Some(side) = name.as_str().and_then(|s| match BlockKind::classify(s) {
                BlockKind::WallRoad { side } => Some(side),
                _ => None,
            }) else {
                continue;
            };
            let Some(dir) = side_direction(side) else {
                continue;
            };

            let family = if mask.has(dir) { "TVRNAS" } else { "FARMAA" };
            let Some(&variant) = uniform_pick(cx.rng, &GATE_VARIANTS) else {
                continue;
            };
            let chosen = BlockKind::WallCombo {
                side,
                inner: BlockRef::new(family, variant),
            }
            .render();
            debug!(path = %path.display(), ?dir, road = mask.has(dir), %chosen, "gate resolved");
            *name = Value::from(chosen);
        }
        Ok(())
    }
}

/// For cells reached only by diagonal roads, turns the first farm gate on a
/// randomly chosen cardinal side of each diagonal into a tavern gate.
pub(crate) struct DiagonalGates {
    roads: RoadMap,
}

impl DiagonalGates {
    pub(crate) fn new(roads: RoadMap) -> Self {
        Self { roads }
    }
}

fn tavern_for(farm: &BlockRef) -> Option<BlockRef> {
    let prefix = match farm.prefix.as_str() {
        "FARMAA" => "TVRNAS",
        "FARMBA" => "TVRNBS",
        _ => return None,
    };
    Some(BlockRef {
        prefix: prefix.to_string(),
        number: farm.number,
    })
}

impl Rewrite for DiagonalGates {
    fn name(&self) -> &'static str {
        "diagonal-gates"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let mask = road_mask_for(&self.roads, doc)?;
        let chosen = mask.diagonal_cardinals(cx.rng);
        if chosen.is_empty() {
            return Ok(());
        }
        let names = record::require_array_mut(doc, BLOCK_NAMES)?;

        for dir in chosen {
            let Some(wanted) = direction_side(dir) else {
                continue;
            };
            let hit = names.iter_mut().find_map(|name| {
                let kind = BlockKind::classify(name.as_str()?);
                match kind {
                    BlockKind::WallCombo { side, ref inner } if side == wanted => {
                        let tavern = tavern_for(inner)?;
                        Some((name, BlockKind::WallCombo { side, inner: tavern }))
                    }
                    _ => None,
                }
            });
            if let Some((name, tavern)) = hit {
                let tavern = tavern.render();
                debug!(path = %path.display(), ?dir, %tavern, "diagonal gate");
                *name = Value::from(tavern);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roads::{Direction, MAP_WIDTH};
    use crate::store::memory::MemoryStore;
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    fn roads_with(map_id: usize, byte: u8) -> RoadMap {
        let mut data = vec![0u8; MAP_WIDTH * 10];
        data[map_id % 1000 + (map_id / 1000) * MAP_WIDTH] = byte;
        RoadMap::from_bytes(data, MAP_WIDTH)
    }

    fn location(map_id: i64, names: &[&str]) -> Value {
        json!({"Exterior": {"ExteriorData": {"MapId": map_id, "BlockNames": names}}})
    }

    fn run(rewrite: &mut dyn Rewrite, doc: &mut Value, seed: u64) {
        let mut store = MemoryStore::default();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cx = Context {
            dir: Path::new("."),
            store: &mut store,
            rng: &mut rng,
        };
        rewrite
            .rewrite(&mut cx, Path::new("location1.json"), doc)
            .unwrap();
    }

    #[test]
    fn north_road_opens_a_tavern_gate() {
        let mut gates = WallGates::new(roads_with(3042, Direction::N.bit()));
        for seed in 0..30 {
            let mut doc = location(3042, &["WALLAA08.ROAD.RMB", "WALLAA09.ROAD.RMB"]);
            run(&mut gates, &mut doc, seed);
            let north = doc["Exterior"]["ExteriorData"]["BlockNames"][0].as_str().unwrap();
            let east = doc["Exterior"]["ExteriorData"]["BlockNames"][1].as_str().unwrap();
            assert!(north.starts_with("WALLAA08.TVRNAS0"), "{north}");
            assert!(east.starts_with("WALLAA09.FARMAA0"), "{east}");
        }
    }

    #[test]
    fn other_blocks_are_left_alone() {
        let mut gates = WallGates::new(roads_with(1, 0xFF));
        let mut doc = location(1, &["WALLAA08.RMB", "FARMAA10.RMB"]);
        let before = doc.clone();
        run(&mut gates, &mut doc, 0);
        assert_eq!(doc, before);
    }

    #[test]
    fn diagonal_only_cell_converts_one_farm_gate_per_diagonal() {
        let mut gates = DiagonalGates::new(roads_with(5, Direction::NE.bit()));
        for seed in 0..30 {
            let mut doc = location(
                5,
                &["WALLAA08.FARMAA01.RMB", "WALLAA08.FARMAA02.RMB", "WALLAA09.FARMBA04.RMB"],
            );
            run(&mut gates, &mut doc, seed);
            let names = &doc["Exterior"]["ExteriorData"]["BlockNames"];
            let changed: Vec<&str> = names
                .as_array()
                .unwrap()
                .iter()
                .filter_map(Value::as_str)
                .filter(|n| n.contains("TVRN"))
                .collect();
            assert_eq!(changed.len(), 1);
            assert!(
                changed[0] == "WALLAA08.TVRNAS01.RMB" || changed[0] == "WALLAA09.TVRNBS04.RMB",
                "{changed:?}"
            );
            assert_eq!(names[1], json!("WALLAA08.FARMAA02.RMB"));
        }
    }

    #[test]
    fn cardinal_road_disables_diagonal_choice() {
        let mut gates = DiagonalGates::new(roads_with(5, Direction::NE.bit() | Direction::S.bit()));
        let mut doc = location(5, &["WALLAA08.FARMAA01.RMB"]);
        let before = doc.clone();
        run(&mut gates, &mut doc, 0);
        assert_eq!(doc, before);
    }
}
