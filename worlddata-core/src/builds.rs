use rand::Rng;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::block::{BlockKind, BlockRef};
use crate::buildings::{code_or, normalize_to_name, BuildingType};
use crate::corpus::{file_name, json_stem};
use crate::driver::{Context, Rewrite, Targets};
use crate::record::{self, as_int, BLOCK_NAMES, BUILDINGS, BUILDING_DATA_LIST, LOCATION_ID, SUB_RECORDS};
use crate::select::uniform_pick;
use crate::Result;

const SECTOR_STEP: i64 = 3;
const MAX_NAME_SEED: i64 = 30000;

/// Per building type, what the vanilla location handed out.
#[derive(Default)]
struct VanillaPool {
    name_seeds: VecDeque<Value>,
    qualities: VecDeque<Value>,
    sectors: VecDeque<Value>,
}

fn type_name(value: Option<&Value>) -> String {
    let normalized = normalize_to_name(value.unwrap_or(&Value::Null));
    normalized.as_str().unwrap_or(BuildingType::None.name()).to_string()
}

fn vanilla_pools(vanilla: Option<&Value>) -> HashMap<String, VanillaPool> {
    let mut pools: HashMap<String, VanillaPool> = HashMap::new();
    let buildings = vanilla.and_then(|v| record::array(v, BUILDINGS));
    for building in buildings.into_iter().flatten() {
        let pool = pools.entry(type_name(building.get("BuildingType"))).or_default();
        let field = |name: &str| building.get(name).filter(|v| !v.is_null()).cloned();
        pool.name_seeds.extend(field("NameSeed"));
        pool.qualities.extend(field("Quality"));
        pool.sectors.extend(field("Sector"));
    }
    pools
}

/// Allocates sectors for buildings the vanilla location has no sector for.
struct Sectors {
    used: HashSet<i64>,
    max_by_type: HashMap<String, i64>,
}

impl Sectors {
    fn new(pools: &HashMap<String, VanillaPool>) -> Self {
        let max_by_type = pools
            .iter()
            .map(|(kind, pool)| {
                let max = pool.sectors.iter().filter_map(as_int).max().unwrap_or(0);
                (kind.clone(), max)
            })
            .collect();
        Self {
            used: HashSet::new(),
            max_by_type,
        }
    }

    fn next(&mut self, kind: &str) -> i64 {
        let mut sector = self.max_by_type.get(kind).copied().unwrap_or(0);
        while self.used.contains(&sector) {
            sector += SECTOR_STEP;
        }
        self.max_by_type.insert(kind.to_string(), sector);
        sector
    }

    fn mark(&mut self, sector: &Value) {
        if let Some(s) = as_int(sector) {
            self.used.insert(s);
        }
    }
}

fn interior_count(rmb: &Value) -> usize {
    record::array(rmb, SUB_RECORDS)
        .map_or(0, |subs| subs.iter().filter(|s| s.get("Interior").is_some()).count())
}

/// Rebuilds a location's building list from the RMB blocks it is made of,
/// reusing the vanilla location's name seeds, qualities and sectors.
pub(crate) struct FixBuilds {
    vanilla_dir: PathBuf,
}

impl FixBuilds {
    pub(crate) fn new(vanilla_dir: PathBuf) -> Self {
        Self { vanilla_dir }
    }
}

impl Rewrite for FixBuilds {
    fn name(&self) -> &'static str {
        "fix-builds"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let location_id = record::require(doc, LOCATION_ID)?.clone();
        let block_names: Vec<String> = record::array(doc, BLOCK_NAMES)
            .filter(|names| !names.is_empty())
            .ok_or_else(|| record::missing(BLOCK_NAMES))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        let vanilla_path = self.vanilla_dir.join(file_name(path));
        let vanilla = cx.load_optional(&vanilla_path);
        if vanilla.is_none() {
            warn!(path = %vanilla_path.display(), "no vanilla location");
        }
        let mut pools = vanilla_pools(vanilla.as_ref());
        let mut sectors = Sectors::new(&pools);

        let mut rebuilt = Vec::new();
        for block in &block_names {
            let rmb_path = cx.dir.join(format!("{block}.json"));
            let Some(rmb) = cx.load_optional(&rmb_path) else {
                debug!(block = %block, "block file missing");
                continue;
            };
            let take = interior_count(&rmb);
            let source = record::array(&rmb, BUILDING_DATA_LIST).map(Vec::as_slice).unwrap_or(&[]);

            for building in source.iter().take(take) {
                let mut building = building.as_object().cloned().unwrap_or_default();
                let kind = type_name(building.get("BuildingType"));
                let pool = pools.entry(kind.clone()).or_default();

                let name_seed = pool
                    .name_seeds
                    .pop_front()
                    .unwrap_or_else(|| Value::from(cx.rng.gen_range(0..=MAX_NAME_SEED)));
                if let Some(quality) = pool.qualities.pop_front() {
                    building.insert("Quality".into(), quality);
                }
                let sector = match pool.sectors.pop_front() {
                    Some(sector) => sector,
                    None => Value::from(sectors.next(&kind)),
                };
                sectors.mark(&sector);

                building.insert("BuildingType".into(), Value::from(kind));
                building.insert("NameSeed".into(), name_seed);
                building.insert("Sector".into(), sector);
                building.insert("LocationId".into(), location_id.clone());
                rebuilt.push(Value::Object(building));
            }
        }

        debug!(path = %path.display(), buildings = rebuilt.len(), "rebuilt building list");
        let exterior = record::ensure_object(doc, &["Exterior"]).ok_or_else(|| record::missing(&["Exterior"]))?;
        exterior.insert("BuildingCount".into(), Value::from(rebuilt.len()));
        exterior.insert("Buildings".into(), Value::Array(rebuilt));
        Ok(())
    }
}

/// Code form used in exported donors. Unknown names export as `0`.
fn export_code(value: Option<&Value>) -> Value {
    value.map_or_else(|| Value::from(0), |v| code_or(v, 0))
}

fn field_or_zero(building: &Value, name: &str) -> Value {
    building.get(name).cloned().unwrap_or_else(|| Value::from(0))
}

/// Writes every building of an RMB block out as a standalone donor file
/// `<block>-<Index>-building<i>.json`.
pub(crate) struct ExportBuildings;

impl Rewrite for ExportBuildings {
    fn name(&self) -> &'static str {
        "export-buildings"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.RMB.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let buildings = record::array(doc, BUILDING_DATA_LIST).map(Vec::as_slice).unwrap_or(&[]);
        let subs = record::array(doc, SUB_RECORDS).map(Vec::as_slice).unwrap_or(&[]);
        if buildings.is_empty() {
            debug!(path = %path.display(), "no buildings");
            return Ok(());
        }
        let index = match doc.get("Index") {
            Some(Value::String(s)) => s.clone(),
            Some(v) if !v.is_null() => v.to_string(),
            _ => "0".to_string(),
        };
        let stem = json_stem(path);
        let out_dir = path.parent().unwrap_or(cx.dir);

        for (i, (building, sub)) in buildings.iter().zip(subs).enumerate() {
            let export = json!({
                "FactionId": field_or_zero(building, "FactionId"),
                "BuildingType": export_code(building.get("BuildingType")),
                "Quality": field_or_zero(building, "Quality"),
                "NameSeed": field_or_zero(building, "NameSeed"),
                "RmbSubRecord": sub,
                "AutoMapData": null,
            });
            let dest = out_dir.join(format!("{stem}-{index}-building{i}.json"));
            cx.store.save(&dest, &export)?;
            debug!(to = %dest.display(), "exported building");
        }
        Ok(())
    }
}

const PAWN_SHOP: &str = "PAWNAL03.RMB";

fn is_pawn_shop(name: &str) -> bool {
    matches!(
        BlockKind::classify(name),
        BlockKind::Named(BlockRef { ref prefix, .. }) if prefix == "PAWNAL"
    )
}

/// Puts `PAWNAL03.RMB` back into locations that lost it, replacing one of
/// their other pawn shop blocks.
pub(crate) struct RestorePawnShop {
    vanilla_dir: PathBuf,
}

impl RestorePawnShop {
    pub(crate) fn new(vanilla_dir: PathBuf) -> Self {
        Self { vanilla_dir }
    }
}

impl Rewrite for RestorePawnShop {
    fn name(&self) -> &'static str {
        "restore-pawn-shop"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let vanilla_path = self.vanilla_dir.join(file_name(path));
        let Some(vanilla) = cx.load_optional(&vanilla_path) else {
            return Ok(());
        };
        let lists_shop = |d: &Value| {
            record::array(d, BLOCK_NAMES)
                .is_some_and(|names| names.iter().any(|n| n.as_str() == Some(PAWN_SHOP)))
        };
        if !lists_shop(&vanilla) || lists_shop(&*doc) {
            return Ok(());
        }

        let Some(names) = record::array_mut(doc, BLOCK_NAMES) else {
            return Ok(());
        };
        let candidates: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.as_str().is_some_and(is_pawn_shop))
            .map(|(i, _)| i)
            .collect();
        let Some(&chosen) = uniform_pick(cx.rng, &candidates) else {
            debug!(path = %path.display(), "no pawn shop block to replace");
            return Ok(());
        };
        debug!(path = %path.display(), replaced = %names[chosen], "restoring {PAWN_SHOP}");
        names[chosen] = Value::from(PAWN_SHOP);
        Ok(())
    }
}

/// Hands the buildings of one faction over to the town as plain houses.
pub(crate) struct ReassignFaction {
    faction_id: i64,
    building_type: BuildingType,
}

impl ReassignFaction {
    pub(crate) fn new(faction_id: i64, building_type: BuildingType) -> Self {
        Self {
            faction_id,
            building_type,
        }
    }

    fn reassign(&self, building: &mut Map<String, Value>) -> bool {
        if building.get("FactionId").and_then(as_int) != Some(self.faction_id) {
            return false;
        }
        building.insert("FactionId".into(), Value::from(0));
        building.insert("BuildingType".into(), Value::from(self.building_type.name()));
        true
    }
}

impl Rewrite for ReassignFaction {
    fn name(&self) -> &'static str {
        "reassign-faction"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.json")
    }

    fn rewrite(&mut self, _cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let Some(buildings) = record::array_mut(doc, BUILDINGS) else {
            return Ok(());
        };
        let changed = buildings
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .map(|b| self.reassign(b))
            .filter(|&changed| changed)
            .count();
        if changed > 0 {
            debug!(path = %path.display(), faction = self.faction_id, changed, "reassigned buildings");
        }
        Ok(())
    }
}
