//! Scraping of solver report text into numeric metrics.
//!
//! Parsing is total: anything that cannot be found is reported as absent,
//! never as zero and never as an error.

use std::fmt;

use serde::{Deserialize, Serialize};

const CPU_TIME_LABEL: &str = "CPU time";
const CONFLICTS_LABEL: &str = "conflicts";
const DECISIONS_LABEL: &str = "decisions";
const PROPAGATIONS_LABEL: &str = "propagations";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveOutcome {
    Satisfiable,
    Unsatisfiable,
    #[default]
    Unknown,
}

impl SolveOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SolveOutcome::Satisfiable => "SATISFIABLE",
            SolveOutcome::Unsatisfiable => "UNSATISFIABLE",
            SolveOutcome::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SolveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverStats {
    pub result: SolveOutcome,
    pub cpu_time_s: Option<f64>,
    pub conflicts: Option<u64>,
    pub decisions: Option<u64>,
    pub propagations: Option<u64>,
    pub decisions_per_sec: Option<f64>,
    pub props_per_sec: Option<f64>,
    pub conflicts_per_sec: Option<f64>,
    pub ns_per_prop: Option<f64>,
    pub ns_per_decision: Option<f64>,
}

pub fn parse_solver_output(text: &str) -> SolverStats {
    let mut stats = SolverStats {
        result: classify(text),
        cpu_time_s: find_seconds(text, CPU_TIME_LABEL),
        conflicts: find_counter(text, CONFLICTS_LABEL),
        decisions: find_counter(text, DECISIONS_LABEL),
        propagations: find_counter(text, PROPAGATIONS_LABEL),
        ..SolverStats::default()
    };
    derive_rates(&mut stats);
    stats
}

fn classify(text: &str) -> SolveOutcome {
    // "SATISFIABLE" is a substring of "UNSATISFIABLE", so check the longer one first
    if text.contains("UNSATISFIABLE") {
        SolveOutcome::Unsatisfiable
    } else if text.contains("SATISFIABLE") {
        SolveOutcome::Satisfiable
    } else {
        SolveOutcome::Unknown
    }
}

fn derive_rates(stats: &mut SolverStats) {
    let Some(cpu) = stats.cpu_time_s.filter(|t| *t > 0.0) else {
        return;
    };
    if let Some(decisions) = stats.decisions {
        stats.decisions_per_sec = Some(decisions as f64 / cpu);
        if decisions > 0 {
            stats.ns_per_decision = Some(cpu * 1e9 / decisions as f64);
        }
    }
    if let Some(props) = stats.propagations {
        stats.props_per_sec = Some(props as f64 / cpu);
        if props > 0 {
            stats.ns_per_prop = Some(cpu * 1e9 / props as f64);
        }
    }
    if let Some(conflicts) = stats.conflicts {
        stats.conflicts_per_sec = Some(conflicts as f64 / cpu);
    }
}

/// Yields the text following every `<label> : ` occurrence, in order.
fn values_after<'a>(text: &'a str, label: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    text.lines().flat_map(move |line| {
        line.match_indices(label).filter_map(move |(at, _)| {
            let rest = line[at + label.len()..].trim_start();
            rest.strip_prefix(':').map(str::trim_start)
        })
    })
}

fn find_counter(text: &str, label: &str) -> Option<u64> {
    values_after(text, label).find_map(parse_grouped_int)
}

fn find_seconds(text: &str, label: &str) -> Option<f64> {
    values_after(text, label).find_map(parse_seconds)
}

fn parse_grouped_int(s: &str) -> Option<u64> {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == ','))
        .unwrap_or(s.len());
    let digits = s[..end].replace(',', "");
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn parse_seconds(s: &str) -> Option<f64> {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let number = &s[..end];
    if !number.ends_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if !s[end..].trim_start().starts_with('s') {
        return None;
    }
    number.parse().ok()
}
