use serde_json::Value;

use crate::record::as_int;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BuildingType {
    None,
    Alchemist,
    HouseForSale,
    Armorer,
    Bank,
    Town4,
    Bookseller,
    ClothingStore,
    FurnitureStore,
    GemStore,
    GeneralStore,
    Library,
    GuildHall,
    PawnShop,
    WeaponSmith,
    Temple,
    Tavern,
    Palace,
    House1,
    House2,
    House3,
    House4,
    House5,
    House6,
    Town23,
    Ship,
    Special1,
    Special2,
    Special3,
    Special4,
    AnyShop,
    AnyHouse,
    AllValid,
}

#[derive(Copy, Clone, Debug)]
struct BuildingTypeEntry {
    kind: BuildingType,
    name: &'static str,
    code: i64,
}

const BUILDING_TYPES: &[BuildingTypeEntry] = &[
    BuildingTypeEntry { kind: BuildingType::None, name: "None", code: -1 },
    BuildingTypeEntry { kind: BuildingType::Alchemist, name: "Alchemist", code: 0 },
    BuildingTypeEntry { kind: BuildingType::HouseForSale, name: "HouseForSale", code: 1 },
    BuildingTypeEntry { kind: BuildingType::Armorer, name: "Armorer", code: 2 },
    BuildingTypeEntry { kind: BuildingType::Bank, name: "Bank", code: 3 },
    BuildingTypeEntry { kind: BuildingType::Town4, name: "Town4", code: 4 },
    BuildingTypeEntry { kind: BuildingType::Bookseller, name: "Bookseller", code: 5 },
    BuildingTypeEntry { kind: BuildingType::ClothingStore, name: "ClothingStore", code: 6 },
    BuildingTypeEntry { kind: BuildingType::FurnitureStore, name: "FurnitureStore", code: 7 },
    BuildingTypeEntry { kind: BuildingType::GemStore, name: "GemStore", code: 8 },
    BuildingTypeEntry { kind: BuildingType::GeneralStore, name: "GeneralStore", code: 9 },
    BuildingTypeEntry { kind: BuildingType::Library, name: "Library", code: 10 },
    BuildingTypeEntry { kind: BuildingType::GuildHall, name: "GuildHall", code: 11 },
    BuildingTypeEntry { kind: BuildingType::PawnShop, name: "PawnShop", code: 12 },
    BuildingTypeEntry { kind: BuildingType::WeaponSmith, name: "WeaponSmith", code: 13 },
    BuildingTypeEntry { kind: BuildingType::Temple, name: "Temple", code: 14 },
    BuildingTypeEntry { kind: BuildingType::Tavern, name: "Tavern", code: 15 },
    BuildingTypeEntry { kind: BuildingType::Palace, name: "Palace", code: 16 },
    BuildingTypeEntry { kind: BuildingType::House1, name: "House1", code: 17 },
    BuildingTypeEntry { kind: BuildingType::House2, name: "House2", code: 18 },
    BuildingTypeEntry { kind: BuildingType::House3, name: "House3", code: 19 },
    BuildingTypeEntry { kind: BuildingType::House4, name: "House4", code: 20 },
    BuildingTypeEntry { kind: BuildingType::House5, name: "House5", code: 21 },
    BuildingTypeEntry { kind: BuildingType::House6, name: "House6", code: 22 },
    BuildingTypeEntry { kind: BuildingType::Town23, name: "Town23", code: 23 },
    BuildingTypeEntry { kind: BuildingType::Ship, name: "Ship", code: 24 },
    BuildingTypeEntry { kind: BuildingType::Special1, name: "Special1", code: 0x74 },
    BuildingTypeEntry { kind: BuildingType::Special2, name: "Special2", code: 0xdf },
    BuildingTypeEntry { kind: BuildingType::Special3, name: "Special3", code: 0xf9 },
    BuildingTypeEntry { kind: BuildingType::Special4, name: "Special4", code: 0xfa },
    BuildingTypeEntry { kind: BuildingType::AnyShop, name: "AnyShop", code: 0xfffd },
    BuildingTypeEntry { kind: BuildingType::AnyHouse, name: "AnyHouse", code: 0xfffe },
    BuildingTypeEntry { kind: BuildingType::AllValid, name: "AllValid", code: 0xffff },
];

fn entry(kind: BuildingType) -> &'static BuildingTypeEntry {
    // every variant has a row
    BUILDING_TYPES
        .iter()
        .find(|e| e.kind == kind)
        .unwrap_or(&BUILDING_TYPES[0])
}

impl BuildingType {
    /// Case-insensitive, so both `GuildHall` and `Guildhall` parse.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        BUILDING_TYPES
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.kind)
    }

    pub fn from_code(code: i64) -> Option<Self> {
        BUILDING_TYPES.iter().find(|e| e.code == code).map(|e| e.kind)
    }

    /// Reads a `BuildingType` field stored either as a name or as a code.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::from_name(s).or_else(|| as_int(value).and_then(Self::from_code)),
            _ => as_int(value).and_then(Self::from_code),
        }
    }

    pub fn name(self) -> &'static str {
        entry(self).name
    }

    pub fn code(self) -> i64 {
        entry(self).code
    }
}

/// Name form of a building type field; unknown codes become `None`,
/// unknown names are kept as written.
pub fn normalize_to_name(value: &Value) -> Value {
    match (value, BuildingType::from_value(value)) {
        (_, Some(kind)) => Value::from(kind.name()),
        (Value::String(_), None) => value.clone(),
        _ => Value::from(BuildingType::None.name()),
    }
}

/// Code form of a building type field. Unknown numbers are kept; unknown
/// names become `unknown`.
pub(crate) fn code_or(value: &Value, unknown: i64) -> Value {
    match BuildingType::from_value(value) {
        Some(kind) => Value::from(kind.code()),
        None if value.is_number() => value.clone(),
        None => Value::from(unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_and_codes_agree() {
        for e in BUILDING_TYPES {
            assert_eq!(BuildingType::from_name(e.name), Some(e.kind));
            assert_eq!(BuildingType::from_code(e.code), Some(e.kind));
            assert_eq!(e.kind.name(), e.name);
            assert_eq!(e.kind.code(), e.code);
        }
    }

    #[test]
    fn special_and_sentinel_codes() {
        assert_eq!(BuildingType::from_code(0x74), Some(BuildingType::Special1));
        assert_eq!(BuildingType::Special4.code(), 0xfa);
        assert_eq!(BuildingType::from_code(0xfffd), Some(BuildingType::AnyShop));
        assert_eq!(BuildingType::AllValid.code(), 65535);
        assert_eq!(BuildingType::from_code(99), None);
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(BuildingType::from_name("Guildhall"), Some(BuildingType::GuildHall));
        assert_eq!(BuildingType::from_name("house2"), Some(BuildingType::House2));
        assert_eq!(BuildingType::from_name("Castle"), None);
    }

    #[test]
    fn normalization_handles_both_encodings() {
        assert_eq!(normalize_to_name(&json!(15)), json!("Tavern"));
        assert_eq!(normalize_to_name(&json!("Tavern")), json!("Tavern"));
        assert_eq!(normalize_to_name(&json!(1234)), json!("None"));
        assert_eq!(code_or(&json!("Ship"), -1), json!(24));
        assert_eq!(code_or(&json!(12), -1), json!(12));
        assert_eq!(code_or(&json!("12"), -1), json!(12));
        assert_eq!(code_or(&json!("Castle"), -1), json!(-1));
        assert_eq!(code_or(&json!("Castle"), 0), json!(0));
    }
}
