//! Path accessors over parsed documents.
//!
//! Jobs never chain ad-hoc `get`s; they name a path once here and decide at
//! the call site whether an absent value is a no-op or a `MissingField`.

use serde_json::{Map, Value};

use crate::{Result, WorldDataError};

pub const BLOCK_NAMES: &[&str] = &["Exterior", "ExteriorData", "BlockNames"];
pub const MAP_ID: &[&str] = &["Exterior", "ExteriorData", "MapId"];
pub const EXTERIOR_WIDTH: &[&str] = &["Exterior", "ExteriorData", "Width"];
pub const EXTERIOR_HEIGHT: &[&str] = &["Exterior", "ExteriorData", "Height"];
pub const CLIMATE_TYPE: &[&str] = &["Climate", "ClimateType"];
pub const LOCATION_ID: &[&str] = &["Exterior", "RecordElement", "Header", "LocationId"];
pub const BUILDINGS: &[&str] = &["Exterior", "Buildings"];
pub const BUILDING_DATA_LIST: &[&str] = &["RmbBlock", "FldHeader", "BuildingDataList"];
pub const AUTO_MAP_DATA: &[&str] = &["RmbBlock", "FldHeader", "AutoMapData"];
pub const SUB_RECORDS: &[&str] = &["RmbBlock", "SubRecords"];

pub fn dotted(path: &[&str]) -> String {
    path.join(".")
}

pub fn get<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |node, key| node.get(*key))
}

pub fn get_mut<'a>(doc: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(doc, |node, key| node.get_mut(*key))
}

pub fn require<'a>(doc: &'a Value, path: &[&str]) -> Result<&'a Value> {
    get(doc, path).ok_or_else(|| missing(path))
}

pub fn require_mut<'a>(doc: &'a mut Value, path: &[&str]) -> Result<&'a mut Value> {
    get_mut(doc, path).ok_or_else(|| missing(path))
}

pub fn missing(path: &[&str]) -> WorldDataError {
    WorldDataError::MissingField {
        path: dotted(path),
    }
}

pub fn array<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Vec<Value>> {
    get(doc, path).and_then(Value::as_array)
}

pub fn array_mut<'a>(doc: &'a mut Value, path: &[&str]) -> Option<&'a mut Vec<Value>> {
    get_mut(doc, path).and_then(Value::as_array_mut)
}

pub fn require_array_mut<'a>(doc: &'a mut Value, path: &[&str]) -> Result<&'a mut Vec<Value>> {
    array_mut(doc, path).ok_or_else(|| missing(path))
}

pub fn str_at<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a str> {
    get(doc, path).and_then(Value::as_str)
}

pub fn int_at(doc: &Value, path: &[&str]) -> Option<i64> {
    get(doc, path).and_then(as_int)
}

/// Walks `path`, creating absent intermediate objects. Returns `None` when a
/// non-object value sits in the way; existing data is never replaced.
pub fn ensure_object<'a>(doc: &'a mut Value, path: &[&str]) -> Option<&'a mut Map<String, Value>> {
    let mut node = doc;
    for key in path {
        node = node
            .as_object_mut()?
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    node.as_object_mut()
}

/// Like [`ensure_object`] but the last segment is an array.
pub fn ensure_array<'a>(doc: &'a mut Value, path: &[&str]) -> Option<&'a mut Vec<Value>> {
    let (last, parents) = path.split_last()?;
    ensure_object(doc, parents)?
        .entry(last.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
}

/// Integer view of a value that may be stored as a number or as a numeric
/// string (`"ModelId": "444"` and `"ModelId": 444` both occur).
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn model_id(object_record: &Value) -> Option<i64> {
    object_record.get("ModelId").and_then(as_int)
}

/// `Exterior.Block3dObjectRecords` of an RMB sub-record.
pub fn object_records(sub_record: &Value) -> &[Value] {
    sub_record
        .get("Exterior")
        .and_then(|e| e.get("Block3dObjectRecords"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Applies `f` to every object in the tree, parents before children.
pub fn walk_objects_mut(value: &mut Value, f: &mut dyn FnMut(&mut Map<String, Value>)) {
    match value {
        Value::Object(map) => {
            f(map);
            for child in map.values_mut() {
                walk_objects_mut(child, f);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_objects_mut(item, f);
            }
        }
        _ => {}
    }
}

/// Applies `f` to every string value in the tree (object keys are left alone).
pub fn walk_strings_mut(value: &mut Value, f: &mut dyn FnMut(&mut String)) {
    match value {
        Value::String(s) => f(s),
        Value::Object(map) => {
            for child in map.values_mut() {
                walk_strings_mut(child, f);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_strings_mut(item, f);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_walks_nested_objects() {
        let doc = json!({"Exterior": {"ExteriorData": {"BlockNames": ["A.RMB"], "MapId": 12345}}});
        assert_eq!(array(&doc, BLOCK_NAMES).map(Vec::len), Some(1));
        assert_eq!(int_at(&doc, MAP_ID), Some(12345));
        assert!(get(&doc, CLIMATE_TYPE).is_none());
    }

    #[test]
    fn require_names_the_missing_path() {
        let doc = json!({"Exterior": {}});
        match require(&doc, MAP_ID) {
            Err(WorldDataError::MissingField { path }) => {
                assert_eq!(path, "Exterior.ExteriorData.MapId")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ensure_array_creates_missing_containers_only() {
        let mut doc = json!({"RmbBlock": {"Keep": 1}});
        ensure_array(&mut doc, &["RmbBlock", "Misc3dObjectRecords"])
            .unwrap()
            .push(json!({"ModelId": 1}));
        assert_eq!(doc["RmbBlock"]["Keep"], json!(1));
        assert_eq!(doc["RmbBlock"]["Misc3dObjectRecords"][0]["ModelId"], json!(1));

        let mut blocked = json!({"RmbBlock": 5});
        assert!(ensure_array(&mut blocked, &["RmbBlock", "X"]).is_none());
        assert_eq!(blocked, json!({"RmbBlock": 5}));
    }

    #[test]
    fn model_ids_accept_strings_and_numbers() {
        assert_eq!(model_id(&json!({"ModelId": "444"})), Some(444));
        assert_eq!(model_id(&json!({"ModelId": 445})), Some(445));
        assert_eq!(model_id(&json!({"ModelId": "wall"})), None);
        assert_eq!(model_id(&json!({})), None);
    }
}
