use thiserror::Error;

/// Failures surfaced to callers of the harness.
///
/// The first four are caller mistakes and are returned synchronously before
/// any state is touched. `Build` and `Execution` normally reach clients
/// through a job's log instead, but `Harness::build` returns them directly.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid variant '{0}'")]
    UnknownVariant(String),
    #[error("unknown benchmark '{0}'")]
    UnknownBenchmark(String),
    #[error("job '{0}' not found")]
    JobNotFound(String),
    #[error("no results recorded yet")]
    LedgerMissing,
    #[error("{0}")]
    Build(String),
    #[error("{0}")]
    Execution(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
