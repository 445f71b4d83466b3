#![cfg(unix)]

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use common::temp_dir;
use satbench::HarnessError;
use satbench::exec::run_solver;

fn script(tag: &str, body: &str) -> PathBuf {
    let dir = temp_dir(tag);
    fs::create_dir_all(&dir).expect("mkdir");
    let path = dir.join("solver.sh");
    fs::write(&path, body).expect("write script");
    path
}

#[test]
fn progress_is_cumulative_and_merges_stderr() {
    let path = script(
        "exec_progress",
        "echo one\necho two >&2\necho three\necho 'CPU time : 0.1 s'\n",
    );
    let mut seen = Vec::<String>::new();
    let out = run_solver(Path::new("/bin/sh"), &path, None, |text| {
        seen.push(text.to_string())
    })
    .expect("run");

    assert_eq!(out.exit_code, Some(0));
    assert_eq!(seen.len(), 4, "one progress call per line");
    for pair in seen.windows(2) {
        assert!(pair[1].starts_with(&pair[0]), "progress must only grow");
        assert!(pair[1].len() > pair[0].len());
    }
    assert_eq!(seen.last(), Some(&out.output));
    for line in ["one\n", "two\n", "three\n", "CPU time : 0.1 s\n"] {
        assert!(out.output.contains(line), "missing {line:?}");
    }
}

#[test]
fn benchmark_path_is_the_only_argument() {
    let path = script("exec_args", "echo \"argc=$# arg=$0\"\n");
    let out = run_solver(Path::new("/bin/sh"), &path, None, |_| {}).expect("run");
    assert!(out.output.contains("argc=0"));
    assert!(out.output.contains(&path.to_string_lossy().to_string()));
}

#[test]
fn nonzero_exit_is_reported_not_raised() {
    let path = script("exec_exit", "echo UNSATISFIABLE\nexit 20\n");
    let out = run_solver(Path::new("/bin/sh"), &path, None, |_| {}).expect("run");
    assert_eq!(out.exit_code, Some(20));
    assert_eq!(out.output, "UNSATISFIABLE\n");
}

#[test]
fn missing_executable_is_an_execution_error() {
    let err = run_solver(
        Path::new("/nonexistent/satbench/minisat"),
        Path::new("x.cnf"),
        None,
        |_| {},
    );
    assert!(matches!(err, Err(HarnessError::Execution(_))));
}

#[test]
fn timeout_kills_a_hung_solver() {
    let path = script("exec_timeout", "echo started\nexec sleep 30\n");
    let mut last = String::new();
    let start = Instant::now();
    let err = run_solver(
        Path::new("/bin/sh"),
        &path,
        Some(Duration::from_millis(300)),
        |text| last = text.to_string(),
    );
    assert!(start.elapsed() < Duration::from_secs(20));
    match err {
        Err(HarnessError::Execution(msg)) => assert!(msg.contains("timed out")),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(last, "started\n");
}

#[test]
fn timeout_does_not_wait_for_children_holding_the_pipes() {
    // no exec: the shell is killed but its sleeping child keeps stdout open
    let path = script("exec_timeout_child", "echo started\nsleep 8\necho done\n");
    let mut last = String::new();
    let start = Instant::now();
    let err = run_solver(
        Path::new("/bin/sh"),
        &path,
        Some(Duration::from_millis(300)),
        |text| last = text.to_string(),
    );
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    match err {
        Err(HarnessError::Execution(msg)) => assert!(msg.contains("timed out")),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(last, "started\n");
}
