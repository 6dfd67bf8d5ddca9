use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::corpus::{self, file_name, json_stem};
use crate::driver::{Context, Rewrite, Targets};
use crate::merge::{MergeRules, Rule};
use crate::record::{self, SUB_RECORDS};
use crate::select::uniform_pick;
use crate::walls::{apply_donor, first_model, SpecificBuildings};
use crate::{Result, WorldDataError};

fn is_house_model(model: i64) -> bool {
    matches!(
        model,
        116 | 117
            | 124..=163
            | 200..=215
            | 320 | 321 | 324 | 326 | 327 | 328 | 330 | 332
            | 334..=340
            | 421 | 535 | 538 | 539 | 541 | 544 | 546..=549 | 552 | 562
            | 602 | 605 | 606 | 608 | 610 | 614
            | 658 | 659 | 663
            | 702 | 704 | 705 | 707 | 708 | 709
    )
}

/// The house keeps its own exterior and gains the donor's models.
fn house_exterior() -> MergeRules {
    MergeRules::keep_unlisted().field("Block3dObjectRecords", Rule::AppendUniqueBy("ModelId".into()))
}

/// Swaps house sub-records for random interior/exterior pairs exported
/// under the same model id.
pub(crate) struct RandomHouses {
    pool: BTreeMap<i64, Vec<PathBuf>>,
    specific: SpecificBuildings,
}

impl RandomHouses {
    pub(crate) fn new(dieps_dir: &Path, buildings_dir: PathBuf) -> Result<Self> {
        let name_re = Regex::new(r"^diep-(\d+)-\d+\.json$")?;
        let files = corpus::scan(dieps_dir, "diep-*.json")?;
        let pool = corpus::group_by(&files, |path| {
            name_re.captures(file_name(path))?.get(1)?.as_str().parse::<i64>().ok()
        });
        debug!(houses = files.len(), models = pool.len(), "house corpus");
        Ok(Self {
            pool,
            specific: SpecificBuildings::scan(&buildings_dir)?,
        })
    }
}

impl Rewrite for RandomHouses {
    fn name(&self) -> &'static str {
        "random-houses"
    }

    fn targets(&self) -> Targets {
        Targets::flat("*.RMB.json")
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let block = json_stem(path).to_string();
        let count = record::array(doc, SUB_RECORDS).map_or(0, Vec::len);

        for i in 0..count {
            let is_candidate = |m: i64| is_house_model(m) && self.pool.contains_key(&m);
            let Some(model) = record::array(doc, SUB_RECORDS)
                .and_then(|subs| first_model(&subs[i], &is_candidate))
                .map(|(m, _)| m)
            else {
                continue;
            };
            if self.specific.covers(&block, i)? {
                debug!(path = %path.display(), sub_record = i, "hand-made house kept");
                continue;
            }
            let candidates = self.pool.get(&model).map(Vec::as_slice).unwrap_or(&[]);
            let Some(chosen) = uniform_pick(cx.rng, candidates).cloned() else {
                continue;
            };
            let Some(donor) = cx.load_optional(&chosen) else {
                continue;
            };
            debug!(path = %path.display(), sub_record = i, model, house = %chosen.display(), "assigning house");
            match apply_donor(doc, i, &donor, house_exterior()) {
                Err(err @ WorldDataError::IndexOutOfRange { .. }) => {
                    warn!(path = %path.display(), error = %err, "house not applied");
                }
                other => other?,
            }
        }
        Ok(())
    }
}
