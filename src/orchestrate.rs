//! Background drivers for run and compare jobs.
//!
//! Each driver owns its job record until it reaches a terminal state. Build
//! and execution failures end up in the job log; nothing is returned to the
//! caller that dispatched the job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::build::BuildManager;
use crate::compare::{CompareReport, VariantOutcome};
use crate::dimacs::DimacsInfo;
use crate::error::HarnessResult;
use crate::exec::run_solver;
use crate::jobs::{Job, JobStore};
use crate::ledger::{Ledger, LedgerRow};
use crate::metrics::{SolverStats, parse_solver_output};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMeta {
    pub benchmark: String,
    pub vars: Option<u64>,
    pub clauses: Option<u64>,
    pub variant_key: String,
    pub variant_label: String,
    pub started_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareMeta {
    pub benchmark: String,
    pub vars: Option<u64>,
    pub clauses: Option<u64>,
    pub a: String,
    pub b: String,
    pub started_at: DateTime<Utc>,
}

pub type RunJob = Job<RunMeta, SolverStats>;
pub type CompareJob = Job<CompareMeta, CompareReport>;
pub type RunStore = JobStore<RunMeta, SolverStats>;
pub type CompareStore = JobStore<CompareMeta, CompareReport>;

/// A benchmark that has already been checked to exist.
#[derive(Debug, Clone)]
pub(crate) struct BenchmarkRef {
    pub name: String,
    pub path: PathBuf,
    pub info: DimacsInfo,
}

/// What a background driver needs besides its own job store.
#[derive(Debug, Clone)]
pub(crate) struct Workers {
    pub builds: Arc<BuildManager>,
    pub ledger: Arc<Ledger>,
    pub timeout: Option<Duration>,
}

pub(crate) fn drive_run(
    workers: &Workers,
    store: &RunStore,
    id: &str,
    bench: &BenchmarkRef,
    variant: &str,
) {
    if let Err(e) = workers.builds.ensure_built(variant, false) {
        warn!("run {} failed to build {}: {}", id, variant, e);
        store.update(id, |job| job.fail(&format!("[build error] {e}")));
        return;
    }
    match run_and_record(workers, store, id, bench, variant) {
        Ok(()) => info!("run {} finished ({} on {})", id, variant, bench.name),
        Err(e) => {
            warn!("run {} failed: {:#}", id, e);
            store.update(id, |job| job.fail(&format!("\n[server error] {e:#}")));
        }
    }
}

fn run_and_record(
    workers: &Workers,
    store: &RunStore,
    id: &str,
    bench: &BenchmarkRef,
    variant: &str,
) -> Result<()> {
    let label = variant_label(workers, variant)?;
    let exe = workers.builds.executable_path(variant)?;
    let base_len = store
        .update(id, |job| job.log().len())
        .ok_or_else(|| anyhow!("run {id} disappeared from the store"))?;

    let out = run_solver(&exe, &bench.path, workers.timeout, |text| {
        store.update(id, |job| job.extend_log_from(base_len, text));
    })?;
    let stats = parse_solver_output(&out.output);
    store.update(id, |job| job.meta_mut().exit_code = out.exit_code);

    workers
        .ledger
        .append(&LedgerRow::now(&bench.name, bench.info, variant, &label, &stats))
        .context("failed to append to results ledger")?;
    store.update(id, |job| job.finish(stats));
    Ok(())
}

pub(crate) fn drive_compare(
    workers: &Workers,
    store: &CompareStore,
    id: &str,
    bench: &BenchmarkRef,
    a: &str,
    b: &str,
) {
    let built_a = workers.builds.ensure_built(a, false);
    let built_b = workers.builds.ensure_built(b, false);
    if built_a.is_err() || built_b.is_err() {
        let describe = |r: &HarnessResult<()>| match r {
            Ok(()) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        let message = format!(
            "[build error]\nA: {}\nB: {}\n",
            describe(&built_a),
            describe(&built_b)
        );
        warn!("compare {} failed to build {} / {}", id, a, b);
        store.update(id, |job| job.fail(&message));
        return;
    }

    store.update(id, |job| job.start());
    match compare_and_record(workers, store, id, bench, a, b) {
        Ok(()) => info!("compare {} finished ({} vs {} on {})", id, a, b, bench.name),
        Err(e) => {
            warn!("compare {} failed: {:#}", id, e);
            store.update(id, |job| job.fail(&format!("\n[server error] {e:#}")));
        }
    }
}

fn compare_and_record(
    workers: &Workers,
    store: &CompareStore,
    id: &str,
    bench: &BenchmarkRef,
    a: &str,
    b: &str,
) -> Result<()> {
    // A must be fully drained before B starts
    let outcome_a = run_side(workers, store, id, bench, a, "Running A...\n")?;
    let outcome_b = run_side(workers, store, id, bench, b, "\nRunning B...\n")?;

    for side in [&outcome_a, &outcome_b] {
        workers
            .ledger
            .append(&LedgerRow::now(
                &bench.name,
                bench.info,
                &side.key,
                &side.label,
                &side.stats,
            ))
            .context("failed to append to results ledger")?;
    }
    let report = CompareReport::new(outcome_a, outcome_b);
    store.update(id, |job| job.finish(report));
    Ok(())
}

fn run_side(
    workers: &Workers,
    store: &CompareStore,
    id: &str,
    bench: &BenchmarkRef,
    key: &str,
    banner: &str,
) -> Result<VariantOutcome> {
    let label = variant_label(workers, key)?;
    let exe = workers.builds.executable_path(key)?;
    let base_len = store
        .update(id, |job| {
            job.append_log(banner);
            job.log().len()
        })
        .ok_or_else(|| anyhow!("compare {id} disappeared from the store"))?;

    let out = run_solver(&exe, &bench.path, workers.timeout, |text| {
        store.update(id, |job| job.extend_log_from(base_len, text));
    })?;
    Ok(VariantOutcome {
        key: key.to_string(),
        label,
        exit_code: out.exit_code,
        stats: parse_solver_output(&out.output),
    })
}

fn variant_label(workers: &Workers, key: &str) -> Result<String> {
    workers
        .builds
        .registry()
        .get(key)
        .map(|v| v.label.clone())
        .ok_or_else(|| anyhow!("invalid variant '{key}'"))
}
