use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use satbench::config::{HarnessConfig, VariantRegistry};
use satbench::jobs::{Job, JobStatus};
use satbench::metrics::SolverStats;
use satbench::{Harness, HarnessResult};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "satbench")]
#[command(about = "Build solver variants, run them on benchmarks and compare the results")]
struct Cli {
    /// Directory holding solver sources and .cnf benchmarks
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// JSON file describing the variants (defaults to baseline + variant2)
    #[arg(long)]
    variants: Option<PathBuf>,
    #[arg(long, default_value = "make")]
    build_program: String,
    /// Extra argument passed to the build program before the target
    #[arg(long = "build-arg", allow_hyphen_values = true)]
    build_args: Vec<String>,
    /// Kill the solver after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Keep at most this many finished jobs in memory
    #[arg(long)]
    retain_jobs: Option<usize>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    Variants,
    Benchmarks,
    Build {
        variant: String,
        #[arg(long)]
        force: bool,
    },
    Run {
        benchmark: String,
        #[arg(long, default_value = "baseline")]
        variant: String,
        #[arg(long)]
        json: bool,
    },
    Compare {
        benchmark: String,
        #[arg(long, default_value = "baseline")]
        a: String,
        #[arg(long, default_value = "variant2")]
        b: String,
        #[arg(long)]
        json: bool,
    },
    Ledger,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let harness = harness_from_args(&cli)?;
    match &cli.command {
        Cmd::Variants => {
            for v in harness.variants() {
                println!("{}\t{}", v.key, v.label);
            }
        }
        Cmd::Benchmarks => {
            for b in harness.benchmarks()? {
                println!(
                    "name={} vars={} clauses={} bytes={}",
                    b.name,
                    opt(b.vars),
                    opt(b.clauses),
                    b.bytes
                );
            }
        }
        Cmd::Build { variant, force } => {
            harness.build(variant, *force)?;
            println!("BUILD: {} ok", variant);
        }
        Cmd::Run {
            benchmark,
            variant,
            json,
        } => {
            let id = harness.start_run(benchmark, variant)?;
            let job = follow(|| harness.run(&id))?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else if let Some(stats) = job.result() {
                print_stats(variant, stats);
            }
            finish(&job)?;
        }
        Cmd::Compare {
            benchmark,
            a,
            b,
            json,
        } => {
            let id = harness.start_compare(benchmark, a, b)?;
            let job = follow(|| harness.compare(&id))?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else if let Some(report) = job.result() {
                print_stats(&report.a.key, &report.a.stats);
                print_stats(&report.b.key, &report.b.stats);
                let d = &report.delta;
                println!(
                    "DELTA B vs A: cpu_time={} props_per_sec={} decisions_per_sec={} ns_per_prop={}",
                    pct(d.cpu_time_pct),
                    pct(d.props_per_sec_pct),
                    pct(d.decisions_per_sec_pct),
                    pct(d.ns_per_prop_pct)
                );
            }
            finish(&job)?;
        }
        Cmd::Ledger => print!("{}", harness.ledger()?),
    }
    Ok(())
}

fn harness_from_args(cli: &Cli) -> Result<Harness> {
    let mut config = HarnessConfig::rooted_at(&cli.root);
    config.build_program = cli.build_program.clone();
    config.build_args = cli.build_args.clone();
    config.solver_timeout = cli.timeout_secs.map(Duration::from_secs);
    config.job_retention = cli.retain_jobs;
    let registry = match &cli.variants {
        Some(path) => VariantRegistry::from_json_file(path, &config.build_root)?,
        None => VariantRegistry::minisat_defaults(&config.build_root),
    };
    Ok(Harness::new(config, registry))
}

/// Polls until the job is terminal, echoing log text as it grows.
fn follow<M, R, F>(poll: F) -> Result<Job<M, R>>
where
    F: Fn() -> HarnessResult<Job<M, R>>,
{
    let mut shown = 0usize;
    let mut stdout = std::io::stdout();
    loop {
        let job = poll()?;
        if let Some(fresh) = job.log().get(shown..) {
            stdout.write_all(fresh.as_bytes())?;
            stdout.flush()?;
            shown = job.log().len();
        }
        if job.status().is_terminal() {
            return Ok(job);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn finish<M, R>(job: &Job<M, R>) -> Result<()> {
    println!("STATUS: {}", job.status());
    if job.status() == JobStatus::Error {
        bail!("job {} failed", job.id());
    }
    Ok(())
}

fn print_stats(key: &str, s: &SolverStats) {
    println!(
        "{}: result={} cpu_time_s={} conflicts={} decisions={} propagations={}",
        key,
        s.result,
        opt(s.cpu_time_s),
        opt(s.conflicts),
        opt(s.decisions),
        opt(s.propagations)
    );
    println!(
        "{}: decisions_per_sec={} props_per_sec={} conflicts_per_sec={} ns_per_prop={} ns_per_decision={}",
        key,
        opt(s.decisions_per_sec.map(|v| format!("{v:.0}"))),
        opt(s.props_per_sec.map(|v| format!("{v:.0}"))),
        opt(s.conflicts_per_sec.map(|v| format!("{v:.0}"))),
        opt(s.ns_per_prop.map(|v| format!("{v:.1}"))),
        opt(s.ns_per_decision.map(|v| format!("{v:.1}")))
    );
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string())
}

fn pct(v: Option<f64>) -> String {
    v.map(|x| format!("{x:+.2}%"))
        .unwrap_or_else(|| "-".to_string())
}
