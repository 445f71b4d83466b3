pub mod build;
pub mod compare;
pub mod config;
pub mod dimacs;
pub mod error;
pub mod exec;
pub mod harness;
pub mod jobs;
pub mod ledger;
pub mod metrics;
pub mod orchestrate;

pub use error::{HarnessError, HarnessResult};
pub use harness::{BenchmarkInfo, Harness};
