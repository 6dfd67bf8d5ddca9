use rand::Rng;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::block::{BlockKind, BlockRef};
use crate::corpus::{json_stem, Pattern};
use crate::driver::{Context, Rewrite, Targets};
use crate::record::{self, BLOCK_NAMES, CLIMATE_TYPE, EXTERIOR_HEIGHT, EXTERIOR_WIDTH};
use crate::select::{preferred_pick, UsageState};
use crate::{Result, UsageScope};

const TEMPERATE_FARM: &str = "FARMAA";
const DESERT_FARM: &str = "FARMBA";
const PREFERRED_VARIANT: u8 = 10;
const ROAD_KEY: &str = "ROAD";

fn is_desert(doc: &Value) -> bool {
    record::str_at(doc, CLIMATE_TYPE) == Some("Desert")
}

/// Border cells of a full 8-wide or 8-high town stay as they are.
fn on_edge(index: usize, width: usize, height: usize) -> bool {
    if width == 0 {
        return false;
    }
    let (row, col) = (index / width, index % width);
    (width == 8 && (col == 0 || col == width - 1)) || (height == 8 && (row == 0 || row == height - 1))
}

/// Variant number of the farm part of a block name, or `ROAD` for road fillers.
fn variant_key(name: &str) -> String {
    name.split('.')
        .filter_map(BlockRef::parse)
        .find(|b| b.prefix == TEMPERATE_FARM || b.prefix == DESERT_FARM)
        .and_then(|b| b.number)
        .map(|n| format!("{n:02}"))
        .unwrap_or_else(|| ROAD_KEY.to_string())
}

/// Fills empty cells and wall cells with farm blocks (or road fillers) found
/// next to the locations, favouring variant 10.
pub(crate) struct AddFarms {
    climate_aware: bool,
    preferred_chance: f64,
    scope: UsageScope,
    usage: UsageState<String>,
    blocks: Option<Vec<String>>,
}

impl AddFarms {
    pub(crate) fn new(climate_aware: bool, preferred_chance: f64, scope: UsageScope) -> Self {
        Self {
            climate_aware,
            preferred_chance,
            scope,
            usage: UsageState::new(),
            blocks: None,
        }
    }

    /// Block names (`*.RMB`) available in the working directory, scanned once.
    fn blocks(&mut self, cx: &Context<'_>) -> Result<&[String]> {
        if self.blocks.is_none() {
            let found = cx
                .store
                .scan(cx.dir, &Pattern::new("*.RMB.json")?, false)?
                .iter()
                .map(|p| json_stem(p).to_string())
                .collect();
            self.blocks = Some(found);
        }
        Ok(self.blocks.as_deref().unwrap_or(&[]))
    }

    fn pick<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        candidates: &[String],
        farm: &str,
    ) -> Option<String> {
        let special = format!("{farm}{PREFERRED_VARIANT:02}");
        let (preferred, rest): (Vec<String>, Vec<String>) =
            candidates.iter().cloned().partition(|c| c.contains(&special));
        preferred_pick(
            rng,
            &preferred,
            &rest,
            self.preferred_chance,
            &mut self.usage,
            |c: &String| variant_key(c),
        )
        .cloned()
    }
}

impl Rewrite for AddFarms {
    fn name(&self) -> &'static str {
        "add-farms"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn begin_document(&mut self) {
        if self.scope == UsageScope::PerDocument {
            self.usage.clear();
        }
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let width = record::int_at(doc, EXTERIOR_WIDTH)
            .ok_or_else(|| record::missing(EXTERIOR_WIDTH))? as usize;
        let height = record::int_at(doc, EXTERIOR_HEIGHT)
            .ok_or_else(|| record::missing(EXTERIOR_HEIGHT))? as usize;
        let farm = if self.climate_aware && is_desert(doc) {
            DESERT_FARM
        } else {
            TEMPERATE_FARM
        };

        let blocks = self.blocks(cx)?.to_vec();
        let names = record::require_array_mut(doc, BLOCK_NAMES)?;

        for (i, name) in names.iter_mut().enumerate() {
            if on_edge(i, width, height) {
                continue;
            }
            let Some(current) = name.as_str() else {
                continue;
            };
            let (farm_glob, road_glob) = match BlockKind::classify(current) {
                BlockKind::Empty => (format!("{farm}*.RMB"), "ROAD*.RMB".to_string()),
                kind => match kind.wall_side() {
                    Some(side) => (
                        format!("WALLAA{side:02}.{farm}*.RMB"),
                        format!("WALLAA{side:02}.ROAD*.RMB"),
                    ),
                    None => continue,
                },
            };
            let farm_glob = Pattern::new(&farm_glob)?;
            let road_glob = Pattern::new(&road_glob)?;
            let candidates: Vec<String> = blocks
                .iter()
                .filter(|b| farm_glob.matches(b) || road_glob.matches(b))
                .cloned()
                .collect();

            let Some(chosen) = self.pick(cx.rng, &candidates, farm) else {
                continue;
            };
            debug!(path = %path.display(), cell = i, from = current, to = %chosen, "farm placed");
            *name = Value::from(chosen);
        }
        Ok(())
    }
}

/// Spreads the preferred farm variant over variants 10 to 13.
pub(crate) struct VaryFarms;

impl Rewrite for VaryFarms {
    fn name(&self) -> &'static str {
        "vary-farms"
    }

    fn targets(&self) -> Targets {
        Targets::recursive("location*.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, _path: &Path, doc: &mut Value) -> Result<()> {
        let Some(names) = record::array_mut(doc, BLOCK_NAMES) else {
            return Ok(());
        };
        for name in names.iter_mut() {
            let Some(current) = name.as_str() else {
                continue;
            };
            for farm in [TEMPERATE_FARM, DESERT_FARM] {
                let preferred = format!("{farm}{PREFERRED_VARIANT:02}");
                if current.contains(&preferred) {
                    let variant: u8 = cx.rng.gen_range(10..=13);
                    *name = Value::from(current.replace(&preferred, &format!("{farm}{variant:02}")));
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Swaps temperate farm and tavern blocks for their desert versions in
/// desert locations.
pub(crate) struct DesertSuburbs;

fn desert_name(s: &str) -> String {
    s.replace("FARMAA", "FARMBA").replace("TVRNAS", "TVRNBS")
}

impl Rewrite for DesertSuburbs {
    fn name(&self) -> &'static str {
        "desert-suburbs"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn rewrite(&mut self, _cx: &mut Context<'_>, _path: &Path, doc: &mut Value) -> Result<()> {
        if !is_desert(doc) {
            return Ok(());
        }
        record::walk_strings_mut(doc, &mut |s: &mut String| {
            if s.contains("FARMAA") || s.contains("TVRNAS") {
                *s = desert_name(s);
            }
        });
        Ok(())
    }
}
