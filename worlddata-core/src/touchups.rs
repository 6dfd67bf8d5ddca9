//! Small per-block fixes: travel markers, light flags, NPC heights, block
//! names and automap edges.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::block::BlockKind;
use crate::corpus::{file_name, json_stem, Pattern};
use crate::driver::{Context, Rewrite, Targets};
use crate::record::{self, AUTO_MAP_DATA};
use crate::{Result, WorldDataError};

const TRAVEL_SUFFIX: &str = "-travel.json";
const TRAVEL_LISTS: [&str; 2] = ["Misc3dObjectRecords", "MiscFlatObjectRecords"];

struct TravelDonor {
    prefix: String,
    doc: Value,
}

/// Appends the object lists of `<prefix>-travel.json` to every document
/// whose name starts with `<prefix>`. Running it twice appends twice.
#[derive(Default)]
pub(crate) struct AddTravel {
    donors: Option<Vec<TravelDonor>>,
}

impl AddTravel {
    fn donors(&mut self, cx: &mut Context<'_>) -> Result<&[TravelDonor]> {
        if self.donors.is_none() {
            let pattern = Pattern::new(&format!("*{TRAVEL_SUFFIX}"))?;
            let mut donors = Vec::new();
            for path in cx.store.scan(cx.dir, &pattern, false)? {
                let name = file_name(&path);
                let prefix = name.strip_suffix(TRAVEL_SUFFIX).unwrap_or(name).to_string();
                if let Some(doc) = cx.load_optional(&path) {
                    donors.push(TravelDonor { prefix, doc });
                }
            }
            debug!(count = donors.len(), "travel donors");
            self.donors = Some(donors);
        }
        Ok(self.donors.as_deref().unwrap_or(&[]))
    }
}

fn travel_list<'a>(donor: &'a Value, list: &str) -> &'a [Value] {
    donor
        .get(list)
        .or_else(|| donor.get("RmbBlock").and_then(|b| b.get(list)))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

impl Rewrite for AddTravel {
    fn name(&self) -> &'static str {
        "add-travel"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.json").excluding(&format!("*{TRAVEL_SUFFIX}"))
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let name = file_name(path).to_string();
        for donor in self.donors(cx)?.iter().filter(|d| name.starts_with(&d.prefix)) {
            for list in TRAVEL_LISTS {
                let records = travel_list(&donor.doc, list);
                let target = record::ensure_array(doc, &["RmbBlock", list])
                    .ok_or_else(|| record::missing(&["RmbBlock", list]))?;
                target.extend(records.iter().cloned());
            }
            debug!(path = %path.display(), prefix = %donor.prefix, "travel records appended");
        }
        Ok(())
    }
}

const LIGHT_FACTION: i64 = 8642;

fn light_flags(texture: (i64, i64)) -> Option<i64> {
    match texture {
        (184, 25) | (357, 3) | (182, 25) => Some(2),
        (184, 19) => Some(34),
        _ => None,
    }
}

fn flag_light(obj: &mut Map<String, Value>) {
    let int = |key: &str| obj.get(key).and_then(Value::as_i64);
    if int("FactionID") != Some(LIGHT_FACTION) || int("Flags") != Some(0) {
        return;
    }
    let (Some(archive), Some(record)) = (int("TextureArchive"), int("TextureRecord")) else {
        return;
    };
    if let Some(flags) = light_flags((archive, record)) {
        obj.insert("Flags".into(), Value::from(flags));
    }
}

/// Sets the flags of unflagged light flats by texture.
pub(crate) struct FlagLights;

impl Rewrite for FlagLights {
    fn name(&self) -> &'static str {
        "flag-lights"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.RMB.json")
    }

    fn rewrite(&mut self, _cx: &mut Context<'_>, _path: &Path, doc: &mut Value) -> Result<()> {
        record::walk_objects_mut(doc, &mut |obj: &mut Map<String, Value>| flag_light(obj));
        Ok(())
    }
}

/// Lowers NPC flats sitting at `YPos -2` to `-4`.
pub(crate) struct RaiseNpcs;

impl Rewrite for RaiseNpcs {
    fn name(&self) -> &'static str {
        "raise-npcs"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.RMB.json")
    }

    fn rewrite(&mut self, _cx: &mut Context<'_>, _path: &Path, doc: &mut Value) -> Result<()> {
        record::walk_objects_mut(doc, &mut |obj: &mut Map<String, Value>| {
            let Some(Value::Array(flats)) = obj.get_mut("MiscFlatObjectRecords") else {
                return;
            };
            for flat in flats.iter_mut().filter_map(Value::as_object_mut) {
                if flat.get("YPos").and_then(Value::as_f64) == Some(-2.0) {
                    flat.insert("YPos".into(), Value::from(-4));
                }
            }
        });
        Ok(())
    }
}

pub(crate) struct FixNames;

impl Rewrite for FixNames {
    fn name(&self) -> &'static str {
        "fix-names"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.RMB.json")
    }

    fn rewrite(&mut self, _cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        if let Some(name) = doc.get_mut("Name") {
            *name = Value::from(json_stem(path));
        }
        Ok(())
    }
}

const AUTOMAP_ROW: usize = 64;
const AUTOMAP_EDGE: usize = 12;
const AUTOMAP_ROWS_EDGE: usize = AUTOMAP_ROW * AUTOMAP_EDGE;

/// Copies the road edge of every 64-value automap row from `source` into
/// `target`. West walls (side 11) carry the road on the right.
fn copy_automap_edge(source: &[Value], target: &mut [Value], side: u8) {
    let offset = if side == 11 { AUTOMAP_ROW - AUTOMAP_EDGE } else { 0 };
    let rows = source.len().min(target.len()) / AUTOMAP_ROW;
    for row in 0..rows {
        let start = row * AUTOMAP_ROW + offset;
        let range = start..start + AUTOMAP_EDGE;
        target[range.clone()].clone_from_slice(&source[range]);
    }
}

/// Copies the 12 edge rows (768 values) instead: the last rows for north
/// walls (side 8), the first rows for south walls (side 10). Returns false
/// when either map is too short.
fn copy_automap_rows(source: &[Value], target: &mut [Value], side: u8) -> bool {
    if source.len() < AUTOMAP_ROWS_EDGE || target.len() < AUTOMAP_ROWS_EDGE {
        return false;
    }
    if side == 8 {
        let (from, to) = (source.len() - AUTOMAP_ROWS_EDGE, target.len() - AUTOMAP_ROWS_EDGE);
        target[to..].clone_from_slice(&source[from..]);
    } else {
        target[..AUTOMAP_ROWS_EDGE].clone_from_slice(&source[..AUTOMAP_ROWS_EDGE]);
    }
    true
}

/// Restores the automap road edge of `WALLAA{08..11}.<combo>.RMB` blocks
/// from the plain `WALLAA{side}.RMB`.
#[derive(Default)]
pub(crate) struct FixAutomap {
    whole_edge: bool,
    templates: HashMap<u8, Option<Vec<Value>>>,
}

impl FixAutomap {
    pub(crate) fn new(whole_edge: bool) -> Self {
        Self {
            whole_edge,
            ..Self::default()
        }
    }

    fn template(&mut self, cx: &mut Context<'_>, side: u8) -> Option<&[Value]> {
        self.templates
            .entry(side)
            .or_insert_with(|| {
                let road = cx.dir.join(format!("WALLAA{side:02}.RMB.json"));
                let doc = cx.load_optional(&road)?;
                record::array(&doc, AUTO_MAP_DATA).cloned()
            })
            .as_deref()
    }
}

impl Rewrite for FixAutomap {
    fn name(&self) -> &'static str {
        "fix-automap"
    }

    fn targets(&self) -> Targets {
        Targets::flat("WALLAA??.*.RMB.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let side = match BlockKind::classify(json_stem(path)) {
            BlockKind::WallCombo { side, .. } | BlockKind::WallRoad { side } if (8..=11).contains(&side) => side,
            _ => return Ok(()),
        };
        let whole_edge = self.whole_edge && (side == 8 || side == 10);
        let Some(source) = self.template(cx, side) else {
            return Err(WorldDataError::MissingField {
                path: format!("WALLAA{side:02}.RMB.json:{}", record::dotted(AUTO_MAP_DATA)),
            });
        };
        let target = record::array_mut(doc, AUTO_MAP_DATA).ok_or_else(|| record::missing(AUTO_MAP_DATA))?;
        if !whole_edge {
            copy_automap_edge(source, target, side);
        } else if !copy_automap_rows(source, target, side) {
            warn!(path = %path.display(), len = source.len(), "automap template too short for a whole edge");
        }
        Ok(())
    }
}
