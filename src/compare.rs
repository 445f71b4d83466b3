use serde::Serialize;

use crate::metrics::SolverStats;

/// Relative change of `new` against `old`, in percent. Absent when either
/// side is missing or `old` is zero.
pub fn pct(new: Option<f64>, old: Option<f64>) -> Option<f64> {
    let (new, old) = (new?, old?);
    if old == 0.0 {
        return None;
    }
    let change = (new - old) / old * 100.0;
    change.is_finite().then_some(change)
}

/// Percentage deltas of variant B against variant A.
///
/// Negative `cpu_time_pct` and `ns_per_prop_pct` mean B is faster. Positive
/// `props_per_sec_pct` and `decisions_per_sec_pct` mean B has higher
/// throughput.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CompareDelta {
    pub cpu_time_pct: Option<f64>,
    pub props_per_sec_pct: Option<f64>,
    pub decisions_per_sec_pct: Option<f64>,
    pub ns_per_prop_pct: Option<f64>,
}

impl CompareDelta {
    pub fn between(a: &SolverStats, b: &SolverStats) -> Self {
        Self {
            cpu_time_pct: pct(b.cpu_time_s, a.cpu_time_s),
            props_per_sec_pct: pct(b.props_per_sec, a.props_per_sec),
            decisions_per_sec_pct: pct(b.decisions_per_sec, a.decisions_per_sec),
            ns_per_prop_pct: pct(b.ns_per_prop, a.ns_per_prop),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantOutcome {
    pub key: String,
    pub label: String,
    pub exit_code: Option<i32>,
    pub stats: SolverStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareReport {
    pub a: VariantOutcome,
    pub b: VariantOutcome,
    pub delta: CompareDelta,
}

impl CompareReport {
    pub fn new(a: VariantOutcome, b: VariantOutcome) -> Self {
        let delta = CompareDelta::between(&a.stats, &b.stats);
        Self { a, b, delta }
    }
}
