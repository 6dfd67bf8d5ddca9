use globset::{Glob, GlobMatcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::Result;

/// Candidate files bucketed by a derived key.
pub type VariantPool<K> = BTreeMap<K, Vec<PathBuf>>;

/// Glob over bare file names (`location*.json`, `WALLAA??.*.RMB.json`).
#[derive(Debug, Clone)]
pub struct Pattern {
    matcher: GlobMatcher,
}

impl Pattern {
    pub fn new(raw: &str) -> Result<Self> {
        let matcher = Glob::new(raw)?.compile_matcher();
        Ok(Self { matcher })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }
}

pub fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// File name of a `*.json` path without the extension (`WALLAA08.RMB.json` -> `WALLAA08.RMB`).
pub fn json_stem(path: &Path) -> &str {
    let name = file_name(path);
    name.strip_suffix(".json").unwrap_or(name)
}

/// Files directly inside `dir` whose name matches `pattern`, sorted by name.
/// A missing directory is an empty corpus.
pub fn scan(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    scan_with_depth(dir, &Pattern::new(pattern)?, 1)
}

pub(crate) fn scan_with_depth(dir: &Path, pattern: &Pattern, depth: usize) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(depth)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.ends_with(".meta") || !pattern.matches(&name) {
            continue;
        }
        out.push(entry.into_path());
    }
    Ok(out)
}

pub fn group_by<K, F>(paths: &[PathBuf], mut key_fn: F) -> VariantPool<K>
where
    K: Ord,
    F: FnMut(&Path) -> Option<K>,
{
    let mut pool: VariantPool<K> = BTreeMap::new();
    for path in paths {
        if let Some(key) = key_fn(path) {
            pool.entry(key).or_default().push(path.clone());
        }
    }
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "{}").unwrap();
    }

    #[test]
    fn scan_matches_names_sorted_and_skips_meta() {
        let tmp = tempfile::tempdir().unwrap();
        for name in [
            "location2.json",
            "location1.json",
            "location1.json.meta",
            "other.json",
        ] {
            touch(tmp.path(), name);
        }
        fs::create_dir(tmp.path().join("nested")).unwrap();
        touch(&tmp.path().join("nested"), "location3.json");

        let flat = scan(tmp.path(), "location*.json").unwrap();
        let names: Vec<_> = flat.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, ["location1.json", "location2.json"]);

        let pattern = Pattern::new("location*.json").unwrap();
        let deep = scan_with_depth(tmp.path(), &pattern, usize::MAX).unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let found = scan(&tmp.path().join("wall"), "wall-*.json").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn group_by_buckets_on_extracted_key() {
        let paths: Vec<PathBuf> = ["diep-116-00.json", "diep-116-01.json", "diep-200-00.json", "junk.json"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let pool = group_by(&paths, |p| {
            file_name(p)
                .strip_prefix("diep-")?
                .split('-')
                .next()?
                .parse::<u32>()
                .ok()
        });
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[&116].len(), 2);
        assert_eq!(pool[&200], vec![PathBuf::from("diep-200-00.json")]);
    }

    #[test]
    fn json_stem_drops_extension_only() {
        assert_eq!(json_stem(Path::new("x/WALLAA08.FARMAA04.RMB.json")), "WALLAA08.FARMAA04.RMB");
    }
}
