use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{HarnessError, HarnessResult};

/// How long the readers may keep delivering output after the solver is killed.
/// Descendants of the solver can hold its pipes open indefinitely.
const KILL_GRACE: Duration = Duration::from_millis(500);

type Chunk = io::Result<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub output: String,
}

#[derive(Debug)]
enum Pumped {
    Closed,
    TimedOut,
    Failed(io::Error),
}

/// Runs `exe <benchmark>` to completion.
///
/// stdout and stderr are merged line by line into one text. After every line
/// `on_progress` receives the whole text accumulated so far, so each call
/// extends the previous one.
pub fn run_solver<F>(
    exe: &Path,
    benchmark: &Path,
    timeout: Option<Duration>,
    mut on_progress: F,
) -> HarnessResult<RunOutput>
where
    F: FnMut(&str),
{
    debug!("launching {} {}", exe.display(), benchmark.display());
    let mut child = Command::new(exe)
        .arg(benchmark)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            HarnessError::Execution(format!("failed to launch {}: {}", exe.display(), e))
        })?;

    let (tx, rx) = mpsc::channel::<Chunk>();
    let mut readers = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        readers.push(spawn_reader(out, tx.clone()));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(spawn_reader(err, tx.clone()));
    }
    drop(tx);

    let mut output = String::new();
    let deadline = timeout.map(|t| Instant::now() + t);
    let failure = match pump(&rx, deadline, &mut output, &mut on_progress) {
        Pumped::Closed => None,
        Pumped::TimedOut => Some(format!(
            "solver timed out after {:.1} s",
            timeout.unwrap_or_default().as_secs_f64()
        )),
        Pumped::Failed(e) => Some(format!("failed to read output of {}: {}", exe.display(), e)),
    };

    if let Some(reason) = &failure {
        warn!("{}: {}, killing it", exe.display(), reason);
        if let Err(e) = child.kill() {
            warn!("failed to kill {}: {}", exe.display(), e);
        }
        let grace = Some(Instant::now() + KILL_GRACE);
        if let Pumped::Failed(e) = pump(&rx, grace, &mut output, &mut on_progress) {
            debug!("dropping rest of {} output: {}", exe.display(), e);
        }
    }

    let status = child.wait().map_err(|e| {
        HarnessError::Execution(format!("failed to wait for {}: {}", exe.display(), e))
    })?;
    for reader in readers {
        // after a kill, a reader still blocked on an inherited pipe is left behind
        if failure.is_some() && !reader.is_finished() {
            continue;
        }
        if reader.join().is_err() {
            return Err(HarnessError::Execution(format!(
                "output reader for {} panicked",
                exe.display()
            )));
        }
    }

    if let Some(reason) = failure {
        return Err(HarnessError::Execution(reason));
    }
    debug!("{} exited with {}", exe.display(), status);
    Ok(RunOutput {
        exit_code: status.code(),
        output,
    })
}

/// Moves lines from the readers into `output` until both streams close, the
/// deadline passes, or a read fails.
fn pump<F>(
    rx: &Receiver<Chunk>,
    deadline: Option<Instant>,
    output: &mut String,
    on_progress: &mut F,
) -> Pumped
where
    F: FnMut(&str),
{
    loop {
        let next = match deadline {
            Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match next {
            Ok(Ok(line)) => {
                output.push_str(&line);
                on_progress(output);
            }
            Ok(Err(e)) => return Pumped::Failed(e),
            Err(RecvTimeoutError::Timeout) => return Pumped::TimedOut,
            Err(RecvTimeoutError::Disconnected) => return Pumped::Closed,
        }
    }
}

fn spawn_reader<R>(stream: R, tx: Sender<Chunk>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(Ok(String::from_utf8_lossy(&buf).into_owned())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    })
}
