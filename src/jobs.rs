//! Job records and the shared store pollers read them from.
//!
//! A job moves `QUEUED -> RUNNING -> {DONE | ERROR}` and never backwards.
//! Its log only grows, and its result is set in the same step that marks it
//! `DONE`. The store hands out clones taken under its lock, so a poller never
//! sees a half-applied update.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::debug;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job<M, R> {
    id: String,
    status: JobStatus,
    log: String,
    result: Option<R>,
    meta: M,
}

impl<M, R> Job<M, R> {
    fn new(id: String, status: JobStatus, meta: M) -> Self {
        Self {
            id,
            status,
            log: String::new(),
            result: None,
            meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    pub fn meta(&self) -> &M {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut M {
        &mut self.meta
    }

    /// Moves from `QUEUED` to `RUNNING`. Any other transition is ignored.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Running;
        true
    }

    pub fn append_log(&mut self, text: &str) {
        if !self.status.is_terminal() {
            self.log.push_str(text);
        }
    }

    /// Replaces the part of the log after `base_len` with `tail`, as long as
    /// the log only grows. Used for progress updates that resend the whole
    /// accumulated output each time.
    pub fn extend_log_from(&mut self, base_len: usize, tail: &str) {
        if self.status.is_terminal() || base_len > self.log.len() {
            return;
        }
        let current = &self.log[base_len..];
        if let Some(extra) = tail.strip_prefix(current) {
            self.log.push_str(extra);
        }
    }

    pub fn finish(&mut self, result: R) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.result = Some(result);
        self.status = JobStatus::Done;
        true
    }

    /// Marks the job `ERROR`, recording `message` in the log. An empty
    /// message still leaves a marker so failed jobs never show a blank log.
    pub fn fail(&mut self, message: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if message.trim().is_empty() {
            self.log.push_str("[error] job failed\n");
        } else {
            self.log.push_str(message);
            if !message.ends_with('\n') {
                self.log.push('\n');
            }
        }
        self.status = JobStatus::Error;
        true
    }
}

/// Shared map of job id to job record, oldest first.
#[derive(Debug)]
pub struct JobStore<M, R> {
    jobs: Mutex<IndexMap<String, Job<M, R>>>,
    retention: Option<usize>,
}

impl<M: Clone, R: Clone> JobStore<M, R> {
    pub fn new(retention: Option<usize>) -> Self {
        Self {
            jobs: Mutex::new(IndexMap::new()),
            retention,
        }
    }

    /// Inserts a fresh job and returns its id.
    pub fn create(&self, status: JobStatus, meta: M) -> String {
        let id = Uuid::new_v4().to_string();
        let mut jobs = self.lock();
        jobs.insert(id.clone(), Job::new(id.clone(), status, meta));
        if let Some(limit) = self.retention {
            evict_terminal(&mut jobs, limit);
        }
        id
    }

    pub fn snapshot(&self, id: &str) -> Option<Job<M, R>> {
        self.lock().get(id).cloned()
    }

    /// Applies `f` to the job under the store lock. Returns `None` if the id
    /// is unknown.
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut Job<M, R>) -> T) -> Option<T> {
        self.lock().get_mut(id).map(f)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Job<M, R>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn evict_terminal<M, R>(jobs: &mut IndexMap<String, Job<M, R>>, limit: usize) {
    let mut terminal = jobs.values().filter(|j| j.status.is_terminal()).count();
    while terminal > limit {
        let Some(idx) = jobs.values().position(|j| j.status.is_terminal()) else {
            break;
        };
        if let Some((id, _)) = jobs.shift_remove_index(idx) {
            debug!("evicted finished job {}", id);
        }
        terminal -= 1;
    }
}
