use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::block::{BlockKind, BlockRef};
use crate::driver::{Context, Rewrite, RunReport, Targets};
use crate::record::{self, BLOCK_NAMES, BUILDINGS};
use crate::select::{CategoryMap, LinearMap, Parity, UsageState, Window};
use crate::{Result, UsageScope};

const MARKET_WINDOW: Window = Window { delta: 5, step: 1 };

/// Bigger towns get lower-numbered market combos.
const EVEN_MARKETS: CategoryMap = CategoryMap {
    map: LinearMap {
        min_count: 35,
        max_count: 64,
        min_val: 0,
        max_val: 254,
    },
    parity: Parity::Even,
    window: MARKET_WINDOW,
};

const ODD_MARKETS: CategoryMap = CategoryMap {
    map: LinearMap {
        min_count: 35,
        max_count: 64,
        min_val: 1,
        max_val: 127,
    },
    parity: Parity::Odd,
    window: MARKET_WINDOW,
};

struct MarketPool {
    category: CategoryMap,
    allowed: Vec<i64>,
    usage: UsageState<i64>,
}

impl MarketPool {
    fn new(category: CategoryMap, allowed: Vec<i64>) -> Self {
        Self {
            category,
            allowed,
            usage: UsageState::new(),
        }
    }
}

/// Replaces `MARKAA00.RMB`/`MARKAA01.RMB` with a numbered combo chosen from
/// the size of the town.
pub(crate) struct MarketCombos {
    scope: UsageScope,
    even: MarketPool,
    odd: MarketPool,
}

impl MarketCombos {
    pub(crate) fn new(scope: UsageScope) -> Self {
        Self {
            scope,
            even: MarketPool::new(EVEN_MARKETS, (0..=254).step_by(2).collect()),
            odd: MarketPool::new(ODD_MARKETS, (1..=127).step_by(2).collect()),
        }
    }
}

impl Rewrite for MarketCombos {
    fn name(&self) -> &'static str {
        "market-combos"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn begin_document(&mut self) {
        if self.scope == UsageScope::PerDocument {
            self.even.usage.clear();
            self.odd.usage.clear();
        }
    }

    fn rewrite(&mut self, cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let names = record::require_array_mut(doc, BLOCK_NAMES)?;
        let count = names.len() as i64;

        for name in names.iter_mut() {
            let base = match name.as_str().map(BlockKind::classify) {
                Some(BlockKind::Market { number }) if number <= 1 => number,
                _ => continue,
            };
            let pool = if base == 0 { &mut self.even } else { &mut self.odd };
            let Some(candidate) = pool.category.pick(cx.rng, count, &pool.allowed, &mut pool.usage)
            else {
                continue;
            };
            let chosen = BlockKind::MarketVariant {
                base,
                candidate: candidate as u16,
            }
            .render();
            debug!(
                path = %path.display(),
                blocks = count,
                target = pool.category.target(count),
                %chosen,
                "market combo"
            );
            *name = Value::from(chosen);
        }
        Ok(())
    }
}

/// Folds numbered markets back to `MARKAA00.RMB` (even) or `MARKAA01.RMB` (odd).
pub(crate) struct CollapseMarkets {
    pub(crate) even_only: bool,
}

impl Rewrite for CollapseMarkets {
    fn name(&self) -> &'static str {
        "collapse-markets"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn rewrite(&mut self, _cx: &mut Context<'_>, _path: &Path, doc: &mut Value) -> Result<()> {
        let Some(names) = record::array_mut(doc, BLOCK_NAMES) else {
            return Ok(());
        };
        for name in names.iter_mut() {
            let Some(BlockKind::Market { number }) = name.as_str().map(BlockKind::classify) else {
                continue;
            };
            let folded = if number % 2 == 0 {
                0
            } else if self.even_only {
                continue;
            } else {
                1
            };
            *name = Value::from(BlockKind::Market { number: folded }.render());
        }
        Ok(())
    }
}

/// Tally of farm block variants used by locations.
#[derive(Default)]
pub(crate) struct CountFarms {
    pub(crate) counts: BTreeMap<String, usize>,
}

impl Rewrite for CountFarms {
    fn name(&self) -> &'static str {
        "count-farms"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn rewrite(&mut self, _cx: &mut Context<'_>, _path: &Path, doc: &mut Value) -> Result<()> {
        let names = record::array(doc, BLOCK_NAMES).into_iter().flatten();
        for name in names.filter_map(Value::as_str) {
            if let BlockKind::Named(BlockRef { prefix, .. }) = BlockKind::classify(name) {
                if prefix == "FARMAA" || prefix == "FARMBA" {
                    *self.counts.entry(name.to_string()).or_insert(0) += 1;
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, report: &RunReport) {
        info!(locations = report.scanned, variants = self.counts.len(), "farm blocks");
        for (variant, count) in &self.counts {
            info!(%variant, count, "farm variant");
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Summary {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: f64,
}

fn summarize(values: &[usize]) -> Option<Summary> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let (min, max) = (*sorted.first()?, *sorted.last()?);
    let mean = sorted.iter().sum::<usize>() as f64 / sorted.len() as f64;
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    };
    Some(Summary { min, max, mean, median })
}

/// Size statistics of the locations that still carry a plain market block,
/// used to tune the market combo mapping.
#[derive(Default)]
pub(crate) struct CountMarkets {
    pub(crate) buildings: Vec<usize>,
    pub(crate) block_names: Vec<usize>,
    pub(crate) dungeon_blocks: Vec<usize>,
}

impl CountMarkets {
    fn totals(&self) -> Vec<usize> {
        self.buildings
            .iter()
            .zip(&self.block_names)
            .zip(&self.dungeon_blocks)
            .map(|((b, n), d)| b + n + d)
            .collect()
    }
}

impl Rewrite for CountMarkets {
    fn name(&self) -> &'static str {
        "count-markets"
    }

    fn targets(&self) -> Targets {
        Targets::flat("location*.json")
    }

    fn rewrite(&mut self, _cx: &mut Context<'_>, path: &Path, doc: &mut Value) -> Result<()> {
        let Some(names) = record::array(doc, BLOCK_NAMES) else {
            return Ok(());
        };
        let has_market = names.iter().filter_map(Value::as_str).any(|n| {
            matches!(BlockKind::classify(n), BlockKind::Market { number: 0 | 1 })
        });
        if !has_market {
            return Ok(());
        }
        let len = |path: &[&str]| record::array(doc, path).map_or(0, Vec::len);
        let (b, n, d) = (len(BUILDINGS), names.len(), len(&["Dungeon", "Blocks"]));
        debug!(path = %path.display(), buildings = b, block_names = n, dungeon = d, "market town");
        self.buildings.push(b);
        self.block_names.push(n);
        self.dungeon_blocks.push(d);
        Ok(())
    }

    fn finish(&mut self, _report: &RunReport) {
        let totals = self.totals();
        if totals.is_empty() {
            info!("no location carries MARKAA00.RMB or MARKAA01.RMB");
            return;
        }
        info!(files = totals.len(), "market towns");
        for (label, values) in [
            ("Buildings", &self.buildings),
            ("BlockNames", &self.block_names),
            ("Dungeon Blocks", &self.dungeon_blocks),
            ("Combined Total", &totals),
        ] {
            if let Some(s) = summarize(values) {
                info!(
                    "{label}: min={}, max={}, mean={:.2}, median={}",
                    s.min, s.max, s.mean, s.median
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::drive;
    use crate::store::memory::MemoryStore;
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    fn location(names: Vec<&str>) -> Value {
        json!({"Exterior": {"ExteriorData": {"BlockNames": names}, "Buildings": [{}, {}]}})
    }

    fn padded(markets: &[&'static str], size: usize) -> Vec<&'static str> {
        let mut names = markets.to_vec();
        names.resize(size, "FARMAA00.RMB");
        names
    }

    fn block_names(store: &MemoryStore, path: &str) -> Vec<String> {
        store.docs[Path::new(path)]["Exterior"]["ExteriorData"]["BlockNames"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn market_combos_follow_town_size_and_parity() {
        let mut store = MemoryStore::default();
        store.insert("w/location1.json", location(padded(&["MARKAA00.RMB", "MARKAA01.RMB"], 64)));
        store.insert("w/location2.json", location(padded(&["MARKAA00.RMB"], 10)));
        let mut rng = StdRng::seed_from_u64(2);
        let report = drive(&mut MarketCombos::new(UsageScope::PerRun), &mut store, Path::new("w"), &mut rng)
            .unwrap();
        assert_eq!(report.updated, 2);

        let big = block_names(&store, "w/location1.json");
        let even: u16 = big[0].strip_prefix("MARKAA00-").unwrap()[..3].parse().unwrap();
        let odd: u16 = big[1].strip_prefix("MARKAA01-").unwrap()[..3].parse().unwrap();
        assert!(even % 2 == 0 && even <= 5, "{even}");
        assert!(odd % 2 == 1 && odd <= 6, "{odd}");

        let small = block_names(&store, "w/location2.json");
        let even: u16 = small[0].strip_prefix("MARKAA00-").unwrap()[..3].parse().unwrap();
        assert!(even >= 249, "{even}");
    }

    #[test]
    fn market_combos_leave_variants_alone() {
        let mut store = MemoryStore::default();
        store.insert("w/location1.json", location(vec!["MARKAA00-010.RMB", "MARKAA02.RMB"]));
        let mut rng = StdRng::seed_from_u64(2);
        drive(&mut MarketCombos::new(UsageScope::PerRun), &mut store, Path::new("w"), &mut rng).unwrap();
        assert_eq!(store.saves, 0);
    }

    #[test]
    fn collapse_folds_by_parity() {
        let mut store = MemoryStore::default();
        store.insert("w/location1.json", location(vec!["MARKAA04.RMB", "MARKAA03.RMB", "MARKAA00.RMB", "TVRNAS00.RMB"]));
        let mut rng = StdRng::seed_from_u64(0);
        drive(&mut CollapseMarkets { even_only: false }, &mut store, Path::new("w"), &mut rng).unwrap();
        assert_eq!(
            block_names(&store, "w/location1.json"),
            ["MARKAA00.RMB", "MARKAA01.RMB", "MARKAA00.RMB", "TVRNAS00.RMB"]
        );

        store.insert("w/location1.json", location(vec!["MARKAA04.RMB", "MARKAA03.RMB"]));
        drive(&mut CollapseMarkets { even_only: true }, &mut store, Path::new("w"), &mut rng).unwrap();
        assert_eq!(block_names(&store, "w/location1.json"), ["MARKAA00.RMB", "MARKAA03.RMB"]);
    }

    #[test]
    fn counters_never_save() {
        let mut store = MemoryStore::default();
        store.insert("w/location1.json", location(vec!["FARMBA01.RMB", "FARMBA01.RMB", "MARKAA00.RMB"]));
        store.insert("w/location2.json", location(vec!["FARMAA10.RMB"]));
        let mut rng = StdRng::seed_from_u64(0);

        let mut farms = CountFarms::default();
        drive(&mut farms, &mut store, Path::new("w"), &mut rng).unwrap();
        assert_eq!(farms.counts["FARMBA01.RMB"], 2);
        assert_eq!(farms.counts["FARMAA10.RMB"], 1);

        let mut markets = CountMarkets::default();
        drive(&mut markets, &mut store, Path::new("w"), &mut rng).unwrap();
        assert_eq!(markets.totals(), vec![5]);
        assert_eq!(store.saves, 0);
    }

    #[test]
    fn summary_median_averages_the_middle_pair() {
        let s = summarize(&[4, 1, 3, 2]).unwrap();
        assert_eq!((s.min, s.max), (1, 4));
        assert_eq!(s.median, 2.5);
        assert_eq!(s.mean, 2.5);
        assert!(summarize(&[]).is_none());
    }
}
