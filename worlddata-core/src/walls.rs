use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::corpus::{self, file_name, json_stem, Pattern};
use crate::driver::{Context, Rewrite, Targets};
use crate::merge::{merge, MergeRules, Rule};
use crate::record::{self, as_int, BUILDING_DATA_LIST, SUB_RECORDS};
use crate::select::uniform_pick;
use crate::{Result, WorldDataError};

pub(crate) const WALL_MODELS: [i64; 3] = [444, 445, 446];

/// Building entry fields taken from a donor. A faction is only filled in
/// when the target has none.
pub(crate) fn building_rules() -> MergeRules {
    MergeRules::keep_unlisted()
        .field("FactionId", Rule::PreserveUnless(Value::from(0)))
        .field("BuildingType", Rule::Replace)
        .field("Quality", Rule::Replace)
        .field("NameSeed", Rule::Replace)
}

fn sub_record_rules(exterior: MergeRules) -> MergeRules {
    MergeRules::keep_unlisted()
        .field("Exterior", Rule::Deep(exterior))
        .field("Interior", Rule::Replace)
        .target_fields_only()
}

/// Donor exterior overlays the target but never moves it.
pub(crate) fn placed_exterior() -> MergeRules {
    MergeRules::overlay_unlisted().protect(&["XPos", "ZPos", "YRotation"])
}

/// Splices an exported building (`FactionId`, ..., `RmbSubRecord`) into
/// building `index` of an RMB block.
pub(crate) fn apply_donor(
    doc: &mut Value,
    index: usize,
    donor: &Value,
    exterior: MergeRules,
) -> Result<()> {
    let buildings = record::require_array_mut(doc, BUILDING_DATA_LIST)?;
    let len = buildings.len();
    let building = buildings.get_mut(index).ok_or(WorldDataError::IndexOutOfRange {
        what: "BuildingDataList",
        index,
        len,
    })?;
    let merged_building = merge(building, donor, &building_rules());

    let subs = record::require_array_mut(doc, SUB_RECORDS)?;
    let len = subs.len();
    let sub = subs.get_mut(index).ok_or(WorldDataError::IndexOutOfRange {
        what: "SubRecords",
        index,
        len,
    })?;
    let empty = Value::Null;
    *sub = merge(
        sub,
        donor.get("RmbSubRecord").unwrap_or(&empty),
        &sub_record_rules(exterior),
    );

    if let Some(building) = record::array_mut(doc, BUILDING_DATA_LIST).and_then(|b| b.get_mut(index)) {
        *building = merged_building;
    }
    Ok(())
}

/// Names of hand-made building exports that pin a sub-record in place.
pub(crate) struct SpecificBuildings {
    names: Vec<String>,
}

impl SpecificBuildings {
    pub(crate) fn scan(dir: &Path) -> Result<Self> {
        let names = corpus::scan(dir, "*-building*.json")?
            .iter()
            .map(|p| file_name(p).to_string())
            .collect();
        Ok(Self { names })
    }

    /// Whether `<block>-*-building<index>.json` exists.
    pub(crate) fn covers(&self, block: &str, index: usize) -> Result<bool> {
        if self.names.is_empty() {
            return Ok(false);
        }
        let pattern = Pattern::new(&format!("{block}-*-building{index}.json"))?;
        Ok(self.names.iter().any(|n| pattern.matches(n)))
    }
}

/// First model id from `models` among a sub-record's exterior objects,
/// together with that object's rotation.
pub(crate) fn first_model<'a>(sub: &'a Value, models: &impl Fn(i64) -> bool) -> Option<(i64, &'a Value)> {
    record::object_records(sub)
        .iter()
        .find_map(|obj| record::model_id(obj).filter(|m| models(*m)).map(|m| (m, obj)))
}

fn rotation(obj: &Value) -> i64 {
    obj.get("YRotation").and_then(as_int).unwrap_or(0)
}

type WallKey = (i64, Option<i64>);

/// Gives every wall sub-record without a hand-made export a random wall
/// exported under the same model and rotation.
pub(crate) struct RandomWalls {
    pool: BTreeMap<WallKey, Vec<PathBuf>>,
    specific: SpecificBuildings,
}

impl RandomWalls {
    pub(crate) fn new(walls_dir: &Path, buildings_dir: PathBuf) -> Result<Self> {
        // wall-<model>[-<rotation>]-<n>.json
        let name_re = Regex::new(r"^wall-(\d+)(?:-(-?\d+))?-\d+\.json$")?;
        let files = corpus::scan(walls_dir, "wall-*.json")?;
        let pool = corpus::group_by(&files, |path| {
            let caps = name_re.captures(file_name(path))?;
            let model = caps.get(1)?.as_str().parse::<i64>().ok()?;
            let rotation = caps.get(2).and_then(|r| r.as_str().parse::<i64>().ok());
            Some((model, rotation))
        });
        debug!(walls = files.len(), keys = pool.len(), "wall corpus");
        Ok(Self {
            pool,
            specific: SpecificBuildings::scan(&buildings_dir)?,
        })
    }

    fn candidates(&self, model: i64, rotation: i64) -> &[PathBuf] {
        self.pool
            .get(&(model, Some(rotation)))
            .or_else(|| self.pool.get(&(model, None)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Rewrite for RandomWalls {
    fn name(&self) -> &'static str {
        "random-walls"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.RMB.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        // `WALLAA06.FARMAA04.RMB.json` checks exports of `WALLAA06.RMB`
        let name = file_name(path);
        let block = format!("{}.RMB", name.split('.').next().unwrap_or(name));

        let count = record::array(doc, SUB_RECORDS).map_or(0, Vec::len);
        for i in 0..count {
            let Some((model, rot)) = record::array(doc, SUB_RECORDS)
                .and_then(|subs| first_model(&subs[i], &|m| WALL_MODELS.contains(&m)))
                .map(|(m, obj)| (m, rotation(obj)))
            else {
                continue;
            };
            if self.specific.covers(&block, i)? {
                debug!(path = %path.display(), sub_record = i, "hand-made wall kept");
                continue;
            }
            let Some(chosen) = uniform_pick(cx.rng, self.candidates(model, rot)).cloned() else {
                continue;
            };
            let Some(donor) = cx.load_optional(&chosen) else {
                continue;
            };
            debug!(path = %path.display(), sub_record = i, wall = %chosen.display(), "assigning wall");
            match apply_donor(doc, i, &donor, placed_exterior()) {
                Err(err @ WorldDataError::IndexOutOfRange { .. }) => {
                    warn!(path = %path.display(), error = %err, "wall not applied");
                }
                other => other?,
            }
        }
        Ok(())
    }
}

/// Files exported buildings that carry a wall model into the wall corpus.
pub(crate) struct SortWalls {
    output_dir: PathBuf,
    counts: HashMap<WallKey, u32>,
}

impl SortWalls {
    pub(crate) fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            counts: HashMap::new(),
        }
    }

    fn next_free(&mut self, cx: &Context<'_>, model: i64, rotation: i64) -> PathBuf {
        let n = self.counts.entry((model, Some(rotation))).or_insert(0);
        loop {
            let dest = self
                .output_dir
                .join(format!("wall-{model:03}-{rotation}-{n:02}.json"));
            *n += 1;
            if !cx.store.exists(&dest) {
                return dest;
            }
        }
    }
}

impl Rewrite for SortWalls {
    fn name(&self) -> &'static str {
        "sort-walls"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*building*.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let Some(sub) = doc.get("RmbSubRecord") else {
            return Ok(());
        };
        let Some((model, rot)) = first_model(sub, &|m| WALL_MODELS.contains(&m))
            .map(|(m, obj)| (m, rotation(obj)))
        else {
            return Ok(());
        };
        let dest = self.next_free(cx, model, rot);
        cx.store.rename(path, &dest)?;
        debug!(from = %path.display(), to = %dest.display(), "moved wall export");
        Ok(())
    }
}

/// Puts the wall sub-records of `WALLAA##.<combo>.RMB` blocks back into the
/// model order of the plain `WALLAA##.RMB` block.
pub(crate) struct FixWallOrder;

fn wall_models_of(sub: &Value) -> Vec<i64> {
    record::object_records(sub)
        .iter()
        .filter_map(record::model_id)
        .filter(|m| WALL_MODELS.contains(m))
        .collect()
}

/// New index order for `subs`: one entry per wall model of `reference`, in
/// its order, then every remaining sub-record in place.
fn wall_order(reference: &[Value], subs: &[Value]) -> Vec<usize> {
    let mut by_model: HashMap<i64, VecDeque<usize>> = HashMap::new();
    for (i, sub) in subs.iter().enumerate() {
        for model in wall_models_of(sub) {
            by_model.entry(model).or_default().push_back(i);
        }
    }

    let mut order = Vec::with_capacity(subs.len());
    let mut used = HashSet::new();
    for model in reference.iter().flat_map(wall_models_of) {
        let Some(queue) = by_model.get_mut(&model) else {
            continue;
        };
        while let Some(i) = queue.pop_front() {
            if used.insert(i) {
                order.push(i);
                break;
            }
        }
    }
    order.extend((0..subs.len()).filter(|i| !used.contains(i)));
    order
}

impl Rewrite for FixWallOrder {
    fn name(&self) -> &'static str {
        "fix-wall-order"
    }

    fn targets(&self) -> Targets {
        Targets::flat("WALLAA??.*.RMB.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let stem = json_stem(path);
        let prefix = stem.get(..8).unwrap_or(stem);
        let original_path = cx.dir.join(format!("{prefix}.RMB.json"));
        let original = cx
            .load_optional(&original_path)
            .ok_or_else(|| WorldDataError::MissingField {
                path: original_path.display().to_string(),
            })?;
        let reference = record::array(&original, SUB_RECORDS)
            .cloned()
            .unwrap_or_default();

        let subs = record::require(doc, SUB_RECORDS)?
            .as_array()
            .cloned()
            .ok_or_else(|| record::missing(SUB_RECORDS))?;
        let buildings = record::require(doc, BUILDING_DATA_LIST)?
            .as_array()
            .cloned()
            .ok_or_else(|| record::missing(BUILDING_DATA_LIST))?;
        if buildings.len() < subs.len() {
            return Err(WorldDataError::IndexOutOfRange {
                what: "BuildingDataList",
                index: subs.len() - 1,
                len: buildings.len(),
            });
        }

        let order = wall_order(&reference, &subs);
        let new_subs: Vec<Value> = order.iter().map(|&i| subs[i].clone()).collect();
        let mut new_buildings: Vec<Value> = order.iter().map(|&i| buildings[i].clone()).collect();
        new_buildings.extend(buildings[subs.len()..].iter().cloned());

        *record::require_mut(doc, SUB_RECORDS)? = Value::Array(new_subs);
        *record::require_mut(doc, BUILDING_DATA_LIST)? = Value::Array(new_buildings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::drive;
    use crate::store::FsStore;
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;
    use std::fs;

    fn sub(model: i64, rot: i64, x: i64) -> Value {
        json!({
            "Exterior": {
                "XPos": x, "ZPos": 7, "YRotation": rot,
                "Block3dObjectRecords": [{"ModelId": model.to_string(), "YRotation": rot}]
            },
            "Interior": {"Tag": "old"}
        })
    }

    fn rmb(subs: Vec<Value>, factions: &[i64]) -> Value {
        let buildings: Vec<Value> = factions
            .iter()
            .map(|f| json!({"FactionId": f, "BuildingType": "House1", "Quality": 1, "NameSeed": 5}))
            .collect();
        json!({"RmbBlock": {"FldHeader": {"BuildingDataList": buildings}, "SubRecords": subs}})
    }

    fn write(path: &Path, doc: &Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(doc).unwrap()).unwrap();
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn donor(tag: &str) -> Value {
        json!({
            "FactionId": 99, "BuildingType": 15, "Quality": 9, "NameSeed": 1234,
            "RmbSubRecord": {
                "Exterior": {"XPos": 0, "ZPos": 0, "YRotation": 0, "Block3dObjectRecords": [{"ModelId": "444"}], "Tag": tag},
                "Interior": {"Tag": tag}
            },
            "AutoMapData": null
        })
    }

    #[test]
    fn donor_merge_keeps_placement_and_existing_faction() {
        let mut doc = rmb(vec![sub(444, 512, 30)], &[0]);
        apply_donor(&mut doc, 0, &donor("new"), placed_exterior()).unwrap();
        let ext = &doc["RmbBlock"]["SubRecords"][0]["Exterior"];
        assert_eq!(ext["XPos"], json!(30));
        assert_eq!(ext["YRotation"], json!(512));
        assert_eq!(ext["Tag"], json!("new"));
        assert_eq!(doc["RmbBlock"]["SubRecords"][0]["Interior"], json!({"Tag": "new"}));
        let building = &doc["RmbBlock"]["FldHeader"]["BuildingDataList"][0];
        assert_eq!(building["FactionId"], json!(99));
        assert_eq!(building["BuildingType"], json!(15));

        let mut owned = rmb(vec![sub(444, 512, 30)], &[7]);
        apply_donor(&mut owned, 0, &donor("new"), placed_exterior()).unwrap();
        assert_eq!(owned["RmbBlock"]["FldHeader"]["BuildingDataList"][0]["FactionId"], json!(7));
    }

    #[test]
    fn donor_index_past_the_lists_is_out_of_range() {
        let mut doc = rmb(vec![sub(444, 0, 1)], &[0]);
        let err = apply_donor(&mut doc, 3, &donor("x"), placed_exterior()).unwrap_err();
        assert!(matches!(err, WorldDataError::IndexOutOfRange { index: 3, .. }));
    }

    #[test]
    fn random_walls_match_model_and_rotation_and_respect_exports() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(&dir.join("wall/wall-444-512-00.json"), &donor("rot512"));
        write(&dir.join("wall/wall-444-0-00.json"), &donor("rot0"));
        write(&dir.join("dcw/WALLAA06.RMB-3-building1.json"), &json!({}));
        write(
            &dir.join("WALLAA06.FARMAA04.RMB.json"),
            &rmb(vec![sub(444, 512, 1), sub(444, 0, 2), sub(901, 0, 3)], &[0, 0, 0]),
        );

        let mut job = RandomWalls::new(&dir.join("wall"), dir.join("dcw")).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let report = drive(&mut job, &mut FsStore, dir, &mut rng).unwrap();
        assert_eq!(report.updated, 1);

        let doc = read(&dir.join("WALLAA06.FARMAA04.RMB.json"));
        let subs = &doc["RmbBlock"]["SubRecords"];
        assert_eq!(subs[0]["Exterior"]["Tag"], json!("rot512"));
        assert_eq!(subs[0]["Exterior"]["XPos"], json!(1));
        // building1 has a hand-made export
        assert!(subs[1]["Exterior"].get("Tag").is_none());
        assert!(subs[2]["Exterior"].get("Tag").is_none());
    }

    #[test]
    fn sort_walls_files_exports_by_model_and_rotation() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let wall = json!({"RmbSubRecord": {"Exterior": {"Block3dObjectRecords": [{"ModelId": "445", "YRotation": 1024}]}}});
        let house = json!({"RmbSubRecord": {"Exterior": {"Block3dObjectRecords": [{"ModelId": "116"}]}}});
        write(&dir.join("A.RMB-1-building0.json"), &wall);
        write(&dir.join("A.RMB-1-building1.json"), &wall);
        write(&dir.join("A.RMB-1-building2.json"), &house);

        let mut job = SortWalls::new(dir.join("wall"));
        let mut rng = StdRng::seed_from_u64(0);
        drive(&mut job, &mut FsStore, dir, &mut rng).unwrap();

        assert!(dir.join("wall/wall-445-1024-00.json").is_file());
        assert!(dir.join("wall/wall-445-1024-01.json").is_file());
        assert!(dir.join("A.RMB-1-building2.json").is_file());
        assert!(!dir.join("A.RMB-1-building0.json").exists());
    }

    #[test]
    fn wall_order_follows_reference_and_keeps_the_rest() {
        let reference = vec![sub(446, 0, 0), sub(444, 0, 0)];
        let subs = vec![sub(901, 0, 0), sub(444, 0, 1), sub(446, 0, 2), sub(444, 0, 3)];
        assert_eq!(wall_order(&reference, &subs), vec![2, 1, 0, 3]);
    }

    #[test]
    fn fix_wall_order_moves_buildings_with_sub_records() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(&dir.join("WALLAA08.RMB.json"), &rmb(vec![sub(445, 0, 0), sub(444, 0, 0)], &[0, 0]));
        write(
            &dir.join("WALLAA08.TVRNAS00.RMB.json"),
            &rmb(vec![sub(444, 0, 1), sub(445, 0, 2)], &[10, 20]),
        );
        let mut rng = StdRng::seed_from_u64(0);
        let report = drive(&mut FixWallOrder, &mut FsStore, dir, &mut rng).unwrap();
        assert_eq!(report.updated, 1);

        let doc = read(&dir.join("WALLAA08.TVRNAS00.RMB.json"));
        assert_eq!(doc["RmbBlock"]["SubRecords"][0]["Exterior"]["XPos"], json!(2));
        assert_eq!(doc["RmbBlock"]["FldHeader"]["BuildingDataList"][0]["FactionId"], json!(20));
        // the plain block is not a target
        assert_eq!(read(&dir.join("WALLAA08.RMB.json"))["RmbBlock"]["SubRecords"][0]["Exterior"]["XPos"], json!(0));
    }
}
