use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::dimacs::DimacsInfo;
use crate::metrics::SolverStats;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub timestamp: i64,
    pub benchmark: String,
    pub info: DimacsInfo,
    pub variant_key: String,
    pub variant_label: String,
    pub stats: SolverStats,
}

impl LedgerRow {
    pub fn now(
        benchmark: &str,
        info: DimacsInfo,
        variant_key: &str,
        variant_label: &str,
        stats: &SolverStats,
    ) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            benchmark: benchmark.to_string(),
            info,
            variant_key: variant_key.to_string(),
            variant_label: variant_label.to_string(),
            stats: stats.clone(),
        }
    }

    pub fn csv_header() -> &'static str {
        "timestamp,benchmark,vars,clauses,variant_key,variant_label,result,cpu_time_s,conflicts,decisions,propagations,decisions_per_sec,props_per_sec,conflicts_per_sec,ns_per_prop,ns_per_decision"
    }

    pub fn to_csv_line(&self) -> String {
        let s = &self.stats;
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.timestamp,
            esc_csv(&self.benchmark),
            opt(self.info.vars),
            opt(self.info.clauses),
            esc_csv(&self.variant_key),
            esc_csv(&self.variant_label),
            s.result,
            opt(s.cpu_time_s),
            opt(s.conflicts),
            opt(s.decisions),
            opt(s.propagations),
            opt(s.decisions_per_sec),
            opt(s.props_per_sec),
            opt(s.conflicts_per_sec),
            opt(s.ns_per_prop),
            opt(s.ns_per_decision),
        )
    }
}

/// Append-only CSV file of finished runs. The header is written when the
/// file does not exist yet.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, row: &LedgerRow) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let is_new = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if is_new {
            writeln!(file, "{}", LedgerRow::csv_header())?;
        }
        writeln!(file, "{}", row.to_csv_line())?;
        file.flush()
    }
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn esc_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
