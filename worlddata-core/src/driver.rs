use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::corpus::{file_name, Pattern};
use crate::store::DocumentStore;
use crate::{Result, WorldDataError};

/// Which documents in the working directory a rewrite visits.
#[derive(Debug, Clone)]
pub struct Targets {
    pub pattern: String,
    pub recursive: bool,
    pub exclude: Vec<String>,
}

impl Targets {
    pub fn flat(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            recursive: false,
            exclude: Vec::new(),
        }
    }

    pub fn recursive(pattern: &str) -> Self {
        Self {
            recursive: true,
            ..Self::flat(pattern)
        }
    }

    pub fn excluding(mut self, pattern: &str) -> Self {
        self.exclude.push(pattern.to_string());
        self
    }
}

/// What a rewrite gets to work with besides the document itself.
pub struct Context<'a> {
    pub dir: &'a Path,
    pub store: &'a mut dyn DocumentStore,
    pub rng: &'a mut StdRng,
}

impl Context<'_> {
    /// Loads a side document, treating an unreadable one as absent.
    pub fn load_optional(&mut self, path: &Path) -> Option<Value> {
        if !self.store.exists(path) {
            return None;
        }
        match self.store.load(path) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not load side document");
                None
            }
        }
    }
}

pub trait Rewrite {
    fn name(&self) -> &'static str;

    fn targets(&self) -> Targets;

    /// Called before each target document; per-document state resets here.
    fn begin_document(&mut self) {}

    /// Mutates `doc` in place. The driver saves it only if it changed.
    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()>;

    fn finish(&mut self, _report: &RunReport) {}
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub scanned: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Skip,
    Fail,
    Abort,
}

fn outcome(err: &WorldDataError) -> Outcome {
    match err {
        WorldDataError::MissingField { .. } | WorldDataError::IndexOutOfRange { .. } => {
            Outcome::Skip
        }
        WorldDataError::Io(_) | WorldDataError::Parse { .. } | WorldDataError::Walk(_) => {
            Outcome::Fail
        }
        WorldDataError::Pattern(_) | WorldDataError::Regex(_) | WorldDataError::Config(_) => {
            Outcome::Abort
        }
    }
}

fn collect_targets(
    store: &dyn DocumentStore,
    dir: &Path,
    targets: &Targets,
) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(&targets.pattern)?;
    let exclude = targets
        .exclude
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<Result<Vec<_>>>()?;
    let mut found = store.scan(dir, &pattern, targets.recursive)?;
    found.retain(|path| {
        let name = file_name(path);
        !exclude.iter().any(|p| p.matches(name))
    });
    Ok(found)
}

/// Runs `rewrite` over every target in `dir`. Errors are contained per file:
/// missing fields and bad indices skip the file, unreadable files count as
/// failed. Only configuration errors end the run early.
pub fn drive(
    rewrite: &mut dyn Rewrite,
    store: &mut dyn DocumentStore,
    dir: &Path,
    rng: &mut StdRng,
) -> Result<RunReport> {
    let targets = rewrite.targets();
    let paths = collect_targets(store, dir, &targets)?;
    debug!(job = rewrite.name(), pattern = %targets.pattern, count = paths.len(), "collected targets");

    let mut report = RunReport::default();
    let mut cx = Context { dir, store, rng };

    for path in paths {
        report.scanned += 1;
        rewrite.begin_document();

        let mut doc = match cx.store.load(&path) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to load");
                report.failed += 1;
                continue;
            }
        };
        let before = doc.clone();

        if let Err(err) = rewrite.rewrite(&mut cx, &path, &mut doc) {
            match outcome(&err) {
                Outcome::Skip => {
                    warn!(path = %path.display(), reason = %err, "skipped");
                    report.skipped += 1;
                }
                Outcome::Fail => {
                    warn!(path = %path.display(), error = %err, "failed");
                    report.failed += 1;
                }
                Outcome::Abort => return Err(err),
            }
            continue;
        }

        if doc == before {
            debug!(path = %path.display(), "unchanged");
            report.unchanged += 1;
            continue;
        }

        match cx.store.save(&path, &doc) {
            Ok(()) => {
                info!(path = %path.display(), "updated");
                report.updated += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to save");
                report.failed += 1;
            }
        }
    }

    rewrite.finish(&report);
    info!(
        job = rewrite.name(),
        scanned = report.scanned,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        failed = report.failed,
        "run finished"
    );
    Ok(report)
}
