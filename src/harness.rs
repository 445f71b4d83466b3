use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use log::info;
use serde::Serialize;

use crate::build::BuildManager;
use crate::config::{HarnessConfig, VariantRegistry, VariantSummary};
use crate::dimacs::parse_dimacs_header;
use crate::error::{HarnessError, HarnessResult};
use crate::jobs::JobStatus;
use crate::ledger::Ledger;
use crate::orchestrate::{
    BenchmarkRef, CompareJob, CompareMeta, CompareStore, RunJob, RunMeta, RunStore, Workers,
    drive_compare, drive_run,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkInfo {
    pub name: String,
    pub vars: Option<u64>,
    pub clauses: Option<u64>,
    pub bytes: u64,
}

/// Entry point for a route layer: every call either answers immediately or
/// dispatches a background job and returns its id.
#[derive(Debug, Clone)]
pub struct Harness {
    config: Arc<HarnessConfig>,
    workers: Workers,
    runs: Arc<RunStore>,
    compares: Arc<CompareStore>,
}

impl Harness {
    pub fn new(config: HarnessConfig, registry: VariantRegistry) -> Self {
        let config = Arc::new(config);
        let builds = Arc::new(BuildManager::new(config.clone(), Arc::new(registry)));
        let workers = Workers {
            builds,
            ledger: Arc::new(Ledger::new(config.ledger_path.clone())),
            timeout: config.solver_timeout,
        };
        Self {
            runs: Arc::new(RunStore::new(config.job_retention)),
            compares: Arc::new(CompareStore::new(config.job_retention)),
            config,
            workers,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn variants(&self) -> Vec<VariantSummary> {
        self.workers.builds.registry().summaries()
    }

    pub fn benchmarks(&self) -> HarnessResult<Vec<BenchmarkInfo>> {
        let mut items = Vec::new();
        for entry in fs::read_dir(&self.config.benchmark_dir)? {
            let path = entry?.path();
            if !path.is_file() || !self.is_benchmark(&path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let info = parse_dimacs_header(&path);
            items.push(BenchmarkInfo {
                name: name.to_string(),
                vars: info.vars,
                clauses: info.clauses,
                bytes: fs::metadata(&path)?.len(),
            });
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    /// Builds a variant in the caller's thread and reports the outcome.
    pub fn build(&self, variant: &str, force: bool) -> HarnessResult<()> {
        self.workers.builds.ensure_built(variant, force)
    }

    pub fn start_run(&self, benchmark: &str, variant: &str) -> HarnessResult<String> {
        let bench = self.resolve_benchmark(benchmark)?;
        let label = self.variant_label(variant)?;

        let id = self.runs.create(
            JobStatus::Running,
            RunMeta {
                benchmark: bench.name.clone(),
                vars: bench.info.vars,
                clauses: bench.info.clauses,
                variant_key: variant.to_string(),
                variant_label: label,
                started_at: Utc::now(),
                exit_code: None,
            },
        );
        info!("run {} queued: {} on {}", id, variant, bench.name);

        let workers = self.workers.clone();
        let store = self.runs.clone();
        let job_id = id.clone();
        let variant = variant.to_string();
        let spawned = thread::Builder::new()
            .name(format!("run-{}", short_id(&id)))
            .spawn(move || drive_run(&workers, &store, &job_id, &bench, &variant));
        if let Err(e) = spawned {
            self.runs
                .update(&id, |job| job.fail(&format!("[server error] {e}")));
        }
        Ok(id)
    }

    pub fn run(&self, id: &str) -> HarnessResult<RunJob> {
        self.runs
            .snapshot(id)
            .ok_or_else(|| HarnessError::JobNotFound(id.to_string()))
    }

    pub fn start_compare(&self, benchmark: &str, a: &str, b: &str) -> HarnessResult<String> {
        let bench = self.resolve_benchmark(benchmark)?;
        self.variant_label(a)?;
        self.variant_label(b)?;

        let id = self.compares.create(
            JobStatus::Queued,
            CompareMeta {
                benchmark: bench.name.clone(),
                vars: bench.info.vars,
                clauses: bench.info.clauses,
                a: a.to_string(),
                b: b.to_string(),
                started_at: Utc::now(),
            },
        );
        info!("compare {} queued: {} vs {} on {}", id, a, b, bench.name);

        let workers = self.workers.clone();
        let store = self.compares.clone();
        let job_id = id.clone();
        let (a, b) = (a.to_string(), b.to_string());
        let spawned = thread::Builder::new()
            .name(format!("compare-{}", short_id(&id)))
            .spawn(move || drive_compare(&workers, &store, &job_id, &bench, &a, &b));
        if let Err(e) = spawned {
            self.compares
                .update(&id, |job| job.fail(&format!("[server error] {e}")));
        }
        Ok(id)
    }

    pub fn compare(&self, id: &str) -> HarnessResult<CompareJob> {
        self.compares
            .snapshot(id)
            .ok_or_else(|| HarnessError::JobNotFound(id.to_string()))
    }

    pub fn ledger_path(&self) -> &Path {
        &self.config.ledger_path
    }

    /// Returns the raw ledger CSV.
    pub fn ledger(&self) -> HarnessResult<String> {
        if !self.config.ledger_path.exists() {
            return Err(HarnessError::LedgerMissing);
        }
        Ok(fs::read_to_string(&self.config.ledger_path)?)
    }

    fn resolve_benchmark(&self, name: &str) -> HarnessResult<BenchmarkRef> {
        let unknown = || HarnessError::UnknownBenchmark(name.to_string());
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." || name == "." {
            return Err(unknown());
        }
        let path: PathBuf = self.config.benchmark_dir.join(name);
        if !path.is_file() || !self.is_benchmark(&path) {
            return Err(unknown());
        }
        let info = parse_dimacs_header(&path);
        Ok(BenchmarkRef {
            name: name.to_string(),
            path,
            info,
        })
    }

    fn is_benchmark(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|x| x.to_str());
        ext == Some(self.config.benchmark_extension.as_str())
    }

    fn variant_label(&self, key: &str) -> HarnessResult<String> {
        self.workers
            .builds
            .registry()
            .get(key)
            .map(|v| v.label.clone())
            .ok_or_else(|| HarnessError::UnknownVariant(key.to_string()))
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
