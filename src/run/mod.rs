//! Run domain -- identifiers, statuses, and the per-run record.

pub mod command;
pub mod output;
pub mod registry;
pub mod supervisor;
pub mod watchdog;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide sequence appended to run ids so two runs started within the
/// same second still get distinct, creation-ordered ids.
static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique, time-derived run identifier (`YYYYMMDD_HHMMSS_NNNN`).
///
/// Lexicographic order matches creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Allocate the next run id.
    pub fn next() -> Self {
        let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}_{:04}", Utc::now().format("%Y%m%d_%H%M%S"), seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a run. `Running` is the only non-terminal state; no
/// run ever leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    /// Child exited with code 0.
    Completed,
    /// Child exited with a nonzero code.
    Failed,
    /// Spawn failure, supervision failure, or watchdog termination.
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One run attempt. Created by the supervisor, mutated only by the
/// supervisor and the run's watchdog, read by everyone else via snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Exact external invocation, for audit and display.
    pub command: String,
    /// Append-only output lines, stdout and stderr merged.
    pub output: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Artifact path announced by the child's marker line, if any.
    pub results_file: Option<String>,
    pub duration_seconds: Option<f64>,
    /// Watchdog-only hang signal; bumped on every appended line.
    #[serde(skip)]
    pub last_activity: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(run_id: RunId, command: String) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            status: RunStatus::Running,
            command,
            output: Vec::new(),
            start_time: now,
            end_time: None,
            results_file: None,
            duration_seconds: None,
            last_activity: now,
        }
    }

    /// Append one output line and bump the activity timestamp.
    pub fn append_line(&mut self, line: String) {
        self.output.push(line);
        self.last_activity = Utc::now();
    }

    /// Move the run into a terminal state, setting `end_time` and
    /// `duration_seconds` exactly once. First caller wins: returns false
    /// and changes nothing if the run is already terminal, so the
    /// supervisor and the watchdog cannot race each other into a second
    /// transition.
    pub fn finish(&mut self, status: RunStatus) -> bool {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            return false;
        }
        let end = Utc::now();
        self.status = status;
        self.end_time = Some(end);
        self.duration_seconds = Some((end - self.start_time).num_milliseconds() as f64 / 1000.0);
        true
    }
}
