use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::corpus::{self, Pattern};
use crate::{Result, WorldDataError};

/// Load/save of whole JSON documents.
pub trait DocumentStore {
    fn load(&mut self, path: &Path) -> Result<Value>;
    fn save(&mut self, path: &Path, doc: &Value) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn rename(&mut self, from: &Path, to: &Path) -> Result<()>;

    /// Documents under `dir` whose file name matches, sorted by name.
    fn scan(&self, dir: &Path, pattern: &Pattern, recursive: bool) -> Result<Vec<PathBuf>> {
        let depth = if recursive { usize::MAX } else { 1 };
        corpus::scan_with_depth(dir, pattern, depth)
    }
}

/// The filesystem-backed store every job runs against.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl DocumentStore for FsStore {
    fn load(&mut self, path: &Path) -> Result<Value> {
        let raw = fs::read_to_string(path)?;
        parse_document(&raw).map_err(|source| WorldDataError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn save(&mut self, path: &Path, doc: &Value) -> Result<()> {
        let text = to_pretty_json(doc)?;
        // Write next to the target and rename over it so a crash never
        // leaves a truncated document behind.
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(from, to)?;
        Ok(())
    }
}

/// Strict parse first, then a single retry over escape-repaired text.
pub fn parse_document(raw: &str) -> serde_json::Result<Value> {
    match serde_json::from_str(raw) {
        Ok(doc) => Ok(doc),
        Err(first) => {
            let repaired = repair_escapes(raw);
            if repaired == raw {
                return Err(first);
            }
            serde_json::from_str(&repaired)
        }
    }
}

/// Doubles every backslash that does not start a legal JSON escape, so
/// Windows paths like `C:\Games` survive as literal text.
pub fn repair_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 16);
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

pub fn to_pretty_json(doc: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser).map_err(io::Error::from)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::BTreeMap;

    /// In-memory store that records every save.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub docs: BTreeMap<PathBuf, Value>,
        pub saves: usize,
    }

    impl MemoryStore {
        pub fn insert(&mut self, path: impl Into<PathBuf>, doc: Value) {
            self.docs.insert(path.into(), doc);
        }
    }

    impl DocumentStore for MemoryStore {
        fn load(&mut self, path: &Path) -> Result<Value> {
            self.docs.get(path).cloned().ok_or_else(|| {
                WorldDataError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    path.display().to_string(),
                ))
            })
        }

        fn save(&mut self, path: &Path, doc: &Value) -> Result<()> {
            self.saves += 1;
            self.docs.insert(path.to_path_buf(), doc.clone());
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            self.docs.contains_key(path)
        }

        fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
            let doc = self.load(from)?;
            self.docs.remove(from);
            self.docs.insert(to.to_path_buf(), doc);
            Ok(())
        }

        fn scan(&self, dir: &Path, pattern: &Pattern, recursive: bool) -> Result<Vec<PathBuf>> {
            Ok(self
                .docs
                .keys()
                .filter(|p| {
                    let inside = if recursive {
                        p.starts_with(dir)
                    } else {
                        p.parent() == Some(dir)
                    };
                    let name = corpus::file_name(p);
                    inside && !name.ends_with(".meta") && pattern.matches(name)
                })
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repair_leaves_valid_json_alone() {
        let valid = r#"{"Path": "C:\\Games\\DF", "Quote": "\"hi\"", "U": "\u00e9\n"}"#;
        assert_eq!(repair_escapes(valid), valid);
        assert_eq!(repair_escapes(&repair_escapes(valid)), valid);
    }

    #[test]
    fn repair_doubles_stray_backslashes() {
        let broken = r#"{"Path": "C:\Games\DF"}"#;
        assert!(serde_json::from_str::<Value>(broken).is_err());
        let doc = parse_document(broken).unwrap();
        assert_eq!(doc["Path"], json!("C:\\Games\\DF"));
    }

    #[test]
    fn repair_keeps_escaped_backslash_before_letter() {
        // `\\x` is an escaped backslash followed by a plain x.
        let valid = r#"{"A": "\\x"}"#;
        assert_eq!(repair_escapes(valid), valid);
    }

    #[test]
    fn unrecoverable_text_is_a_parse_error() {
        assert!(parse_document("{\"a\": ").is_err());
    }

    #[test]
    fn pretty_json_uses_four_spaces_and_keeps_order() {
        let doc: Value = serde_json::from_str(r#"{"Zeta": 1, "Alpha": [true]}"#).unwrap();
        let text = to_pretty_json(&doc).unwrap();
        assert_eq!(text, "{\n    \"Zeta\": 1,\n    \"Alpha\": [\n        true\n    ]\n}");
    }
}
