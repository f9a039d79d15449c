//! Error taxonomy for the orchestrator surfaces.
//!
//! Failures inside a running supervision task are never surfaced here; they
//! are converted into RunRecord state so a bad run can never take down the
//! scheduler or the API. These variants cover the synchronous request
//! surfaces only.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Status query for a run id the registry has never seen.
    #[error("run '{0}' not found")]
    RunNotFound(String),

    /// Operation on a scheduled-request id that does not exist.
    #[error("scheduled request {0} not found")]
    ScheduleNotFound(u64),

    /// Cancellation of a request that has already fired or finished.
    #[error("cannot cancel scheduled request {id}: already {status}")]
    CancelRejected { id: u64, status: String },

    /// Schedule request whose fire time is not strictly in the future.
    #[error("fire time {fire_at} is not in the future")]
    FireTimeNotFuture { fire_at: DateTime<Utc> },

    /// Run request that cannot be turned into an external invocation.
    #[error("invalid run request: {0}")]
    InvalidSpec(String),

    /// Duration lookup for a results file nobody has recorded.
    #[error("no recorded duration for '{0}'")]
    DurationNotFound(String),
}
