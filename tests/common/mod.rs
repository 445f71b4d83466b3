#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use satbench::config::{HarnessConfig, VariantRegistry, VariantSpec};
use satbench::jobs::{Job, JobStatus};
use satbench::{Harness, HarnessResult};

pub const BENCH: &str = "uf3.cnf";

const FAKE_MAKE: &str = r#"set -e
case "$1" in
  clean)
    rm -f minisat
    ;;
  s)
    echo "cc -O3 -DNDEBUG -o minisat main.c solver.c"
    basename "$PWD" >> "BUILD_LOG"
    cp solver.c minisat
    chmod +x minisat
    ;;
  noexe)
    echo "nothing to do"
    ;;
  *)
    echo "make: *** No rule to make target '$1'."
    echo "boom" >&2
    exit 2
    ;;
esac
"#;

pub fn fake_solver(cpu: &str) -> String {
    format!(
        "#!/bin/sh
echo \"c solving $1\"
echo \"warning: fake solver\" >&2
echo \"conflicts             : 100\"
echo \"decisions             : 200\"
echo \"propagations          : 4,000,000\"
echo \"CPU time              : {cpu} s\"
echo \"\"
echo \"SATISFIABLE\"
exit 10
"
    )
}

/// Prints its report in steps with pauses in between. The pauses run in
/// child `sleep` processes that keep the output pipes open.
pub const SLOW_SOLVER: &str = "#!/bin/sh
echo \"c solving $1\"
sleep 1
echo \"conflicts             : 7\"
sleep 1
echo \"CPU time              : 2.0 s\"
echo \"SATISFIABLE\"
exit 10
";

pub struct Fixture {
    pub root: PathBuf,
    pub build_log: PathBuf,
}

impl Fixture {
    pub fn new(tag: &str) -> Self {
        let root = temp_dir(tag);
        fs::create_dir_all(root.join("tools")).expect("mkdir");
        let build_log = root.join("tools").join("builds.log");
        let make = FAKE_MAKE.replace("BUILD_LOG", &build_log.to_string_lossy());
        fs::write(root.join("tools").join("fakemake.sh"), make).expect("write make");

        fs::write(root.join("main.c"), "int main(void) { return 0; }\n").expect("write main");
        fs::write(root.join("solver.h"), "void solve(void);\n").expect("write header");
        fs::write(root.join("Makefile"), "s:\n\tcc -O3 -o minisat *.c\n").expect("write makefile");
        fs::write(root.join("solver.c"), fake_solver("0.5")).expect("write solver");
        fs::write(root.join("solver2.c"), fake_solver("0.25")).expect("write solver2");
        fs::write(root.join("solver_slow.c"), SLOW_SOLVER).expect("write slow solver");
        fs::write(root.join(BENCH), "c tiny\np cnf 3 2\n1 -2 0\n2 3 0\n").expect("write cnf");
        fs::write(root.join("headerless.cnf"), "1 2 0\n").expect("write cnf");
        fs::write(root.join("notes.txt"), "not a benchmark\n").expect("write txt");
        Self { root, build_log }
    }

    pub fn config(&self) -> HarnessConfig {
        let mut cfg = HarnessConfig::rooted_at(&self.root);
        cfg.build_program = "sh".to_string();
        cfg.build_args = vec![self
            .root
            .join("tools")
            .join("fakemake.sh")
            .to_string_lossy()
            .into_owned()];
        cfg
    }

    pub fn registry(&self, cfg: &HarnessConfig) -> VariantRegistry {
        let defaults = VariantRegistry::minisat_defaults(&cfg.build_root);
        let mut specs = defaults.iter().cloned().collect::<Vec<_>>();
        specs.push(extra(cfg, "broken", "solver.c", "fail"));
        specs.push(extra(cfg, "noexe", "solver.c", "noexe"));
        specs.push(extra(cfg, "ghost", "solver_missing.c", "s"));
        specs.push(extra(cfg, "slow", "solver_slow.c", "s"));
        VariantRegistry::new(specs).expect("registry")
    }

    pub fn harness(&self) -> Harness {
        self.harness_with(|_| {})
    }

    pub fn harness_with(&self, tweak: impl FnOnce(&mut HarnessConfig)) -> Harness {
        let mut cfg = self.config();
        tweak(&mut cfg);
        let registry = self.registry(&cfg);
        Harness::new(cfg, registry)
    }

    pub fn builds(&self) -> usize {
        fs::read_to_string(&self.build_log)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

fn extra(cfg: &HarnessConfig, key: &str, source: &str, target: &str) -> VariantSpec {
    VariantSpec {
        key: key.to_string(),
        label: format!("{key} ({source})"),
        solver_source: source.to_string(),
        build_dir: cfg.build_root.join(key),
        executable: "minisat".to_string(),
        build_target: target.to_string(),
    }
}

/// Polls until terminal, checking on every snapshot that finished jobs are
/// never missing their payload or diagnostic.
pub fn wait_terminal<M, R>(poll: impl Fn() -> HarnessResult<Job<M, R>>) -> Job<M, R> {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let job = poll().expect("poll");
        match job.status() {
            JobStatus::Done => {
                assert!(job.result().is_some(), "DONE without result");
                return job;
            }
            JobStatus::Error => {
                assert!(!job.log().is_empty(), "ERROR with empty log");
                return job;
            }
            JobStatus::Queued | JobStatus::Running => {
                assert!(job.result().is_none(), "result before DONE");
            }
        }
        assert!(Instant::now() < deadline, "job did not finish in time");
        sleep(Duration::from_millis(20));
    }
}

pub fn temp_dir(tag: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    p.push(format!("satbench_{}_{}", tag, t));
    p
}

pub fn approx(actual: Option<f64>, expected: f64) {
    let v = actual.expect("value present");
    assert!((v - expected).abs() <= 1e-9 * expected.abs().max(1.0), "{v} != {expected}");
}
