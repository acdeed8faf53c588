// Incremental merge primitives: O(1) state per statistic, one call per
// observation. Derived fields (avg, rate) are refreshed on every merge;
// accumulation is associative and commutative, so merge order never changes
// the final derived value.

use serde::{Deserialize, Serialize};

/// Monotonic counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub count: u64,
}

/// Counter input: a flag contributes 1 when true, a number contributes itself.
#[derive(Debug, Clone, Copy)]
pub enum CounterDelta {
    Flag(bool),
    Amount(u64),
}

impl From<bool> for CounterDelta {
    fn from(v: bool) -> Self {
        CounterDelta::Flag(v)
    }
}

impl From<u64> for CounterDelta {
    fn from(v: u64) -> Self {
        CounterDelta::Amount(v)
    }
}

/// `true` contributes 1, `false` contributes 0, a number contributes that
/// amount. The count never decreases.
pub fn merge_counter(state: Option<CounterState>, delta: impl Into<CounterDelta>) -> CounterState {
    let mut s = state.unwrap_or_default();
    s.count += match delta.into() {
        CounterDelta::Flag(true) => 1,
        CounterDelta::Flag(false) => 0,
        CounterDelta::Amount(n) => n,
    };
    s
}

/// Running average over observed values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageState {
    pub sum: f64,
    pub count: u64,
    /// sum / count, rounded to 1 decimal place; 0 with no observations.
    pub avg: f64,
}

/// Absent values leave sum/count unchanged (but still refresh `avg`).
pub fn merge_average(state: Option<AverageState>, value: Option<f64>) -> AverageState {
    let mut s = state.unwrap_or_default();
    if let Some(v) = value {
        s.sum += v;
        s.count += 1;
    }
    s.avg = if s.count == 0 {
        0.0
    } else {
        round1(s.sum / s.count as f64)
    };
    s
}

/// Success rate over boolean outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateState {
    pub successes: u64,
    pub total: u64,
    /// 100 × successes / total, rounded to the nearest integer percent; 0 when total = 0.
    pub rate: u32,
}

/// Absent outcomes are a no-op.
pub fn merge_rate(state: Option<RateState>, outcome: Option<bool>) -> RateState {
    let mut s = state.unwrap_or_default();
    if let Some(ok) = outcome {
        s.total += 1;
        if ok {
            s.successes += 1;
        }
    }
    s.rate = if s.total == 0 {
        0
    } else {
        (100.0 * s.successes as f64 / s.total as f64).round() as u32
    };
    s
}

/// Running extrema. Seeded to the first observed value; both 0 with no observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxState {
    pub min: f64,
    pub max: f64,
}

/// Absent values are a no-op.
pub fn merge_min_max(state: Option<MinMaxState>, value: Option<f64>) -> MinMaxState {
    match (state, value) {
        (None, None) => MinMaxState::default(),
        (None, Some(v)) => MinMaxState { min: v, max: v },
        (Some(s), None) => s,
        (Some(s), Some(v)) => MinMaxState {
            min: s.min.min(v),
            max: s.max.max(v),
        },
    }
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
