use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::hash::Hash;

/// Per-scope usage counters that steer picks away from repeats.
#[derive(Debug, Clone)]
pub struct UsageState<K> {
    counts: HashMap<K, u32>,
}

impl<K> Default for UsageState<K> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> UsageState<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, key: &K) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn is_used(&self, key: &K) -> bool {
        self.count(key) > 0
    }

    pub fn record(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn forget(&mut self, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            self.counts.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

pub fn uniform_pick<'a, T, R: Rng + ?Sized>(rng: &mut R, pool: &'a [T]) -> Option<&'a T> {
    pool.choose(rng)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Window {
    pub delta: i64,
    pub step: i64,
}

/// Draws a value near `target` from `allowed`.
///
/// The window `[target - delta, target + delta]` widens by `step` while it
/// holds no candidate. Inside the window, values not yet used this cycle are
/// drawn first; once all of them are used the draw is weighted by
/// `1 / (1 + uses)`. When every allowed value has been used the counters
/// start over.
pub fn windowed_pick<R: Rng + ?Sized>(
    rng: &mut R,
    allowed: &[i64],
    target: i64,
    window: Window,
    usage: &mut UsageState<i64>,
) -> Option<i64> {
    let span = allowed.iter().map(|c| (c - target).abs()).max()?;
    let step = window.step.max(1);
    let mut delta = window.delta.max(0);

    let in_window = loop {
        let found: Vec<i64> = allowed
            .iter()
            .copied()
            .filter(|c| (c - target).abs() <= delta)
            .collect();
        if !found.is_empty() || delta >= span {
            break found;
        }
        delta += step;
    };

    let fresh: Vec<i64> = in_window
        .iter()
        .copied()
        .filter(|c| !usage.is_used(c))
        .collect();
    let eligible = if fresh.is_empty() { in_window } else { fresh };

    let weights: Vec<f64> = eligible
        .iter()
        .map(|c| 1.0 / (1.0 + usage.count(c) as f64))
        .collect();
    let dist = WeightedIndex::new(&weights).ok()?;
    let chosen = eligible[dist.sample(rng)];

    usage.record(chosen);
    if allowed.iter().all(|c| usage.is_used(c)) {
        usage.clear();
    }
    Some(chosen)
}

/// Picks from `preferred` with probability `chance` (or whenever `rest` is
/// empty), otherwise from `rest`.
///
/// A preferred pick is a plain uniform draw and leaves `usage` alone. Rest
/// picks skip candidates whose key is already used; once every rest key is
/// used, only those keys are forgotten.
pub fn preferred_pick<'a, T, K, R, F>(
    rng: &mut R,
    preferred: &'a [T],
    rest: &'a [T],
    chance: f64,
    usage: &mut UsageState<K>,
    key: F,
) -> Option<&'a T>
where
    K: Eq + Hash,
    R: Rng + ?Sized,
    F: Fn(&T) -> K,
{
    let roll = rng.gen_bool(chance.clamp(0.0, 1.0));
    if !preferred.is_empty() && (roll || rest.is_empty()) {
        return uniform_pick(rng, preferred);
    }
    if rest.is_empty() {
        return None;
    }

    let mut unused: Vec<&T> = rest.iter().filter(|c| !usage.is_used(&key(c))).collect();
    if unused.is_empty() {
        usage.forget(rest.iter().map(&key));
        unused = rest.iter().collect();
    }

    let chosen = *unused.choose(rng)?;
    usage.record(key(chosen));
    Some(chosen)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LinearMap {
    pub min_count: i64,
    pub max_count: i64,
    pub min_val: i64,
    pub max_val: i64,
}

impl LinearMap {
    /// Maps `count` (clamped) onto `[max_val ..= min_val]`: the larger the
    /// count, the smaller the value. Ties round to even.
    pub fn target(&self, count: i64) -> i64 {
        if self.max_count <= self.min_count {
            return self.max_val;
        }
        let count = count.clamp(self.min_count, self.max_count);
        let frac = (count - self.min_count) as f64 / (self.max_count - self.min_count) as f64;
        let value = self.max_val as f64 - frac * (self.max_val - self.min_val) as f64;
        round_half_even(value) as i64
    }
}

fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of(value: i64) -> Self {
        if value.rem_euclid(2) == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

pub fn adjust_parity(value: i64, desired: Parity) -> i64 {
    if Parity::of(value) == desired {
        value
    } else {
        value + 1
    }
}

/// Linear target, parity forcing, then a windowed pick around the result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CategoryMap {
    pub map: LinearMap,
    pub parity: Parity,
    pub window: Window,
}

impl CategoryMap {
    pub fn target(&self, count: i64) -> i64 {
        adjust_parity(self.map.target(count), self.parity)
    }

    pub fn pick<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: i64,
        allowed: &[i64],
        usage: &mut UsageState<i64>,
    ) -> Option<i64> {
        windowed_pick(rng, allowed, self.target(count), self.window, usage)
    }
}
