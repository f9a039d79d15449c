//! Deferred run scheduling -- the request list and its background engine.
//!
//! Callers register a run for a future wall-clock instant; the engine loop
//! fires it through the Process Supervisor when the time arrives and then
//! mirrors the run's terminal outcome back onto the request.

pub mod engine;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::SchedulerConfig;
use crate::error::Error;
use crate::run::command::CommandSpec;
use crate::run::supervisor::Supervisor;
use crate::run::{RunId, RunStatus};

/// Lifecycle of a deferred request. `Scheduled` is the only state a request
/// can be canceled in; once fired, the linked run drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
    Error,
    Canceled,
}

impl ScheduleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScheduleStatus::Completed
                | ScheduleStatus::Failed
                | ScheduleStatus::Error
                | ScheduleStatus::Canceled
        )
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Running => "running",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Error => "error",
            ScheduleStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

impl From<RunStatus> for ScheduleStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Running => ScheduleStatus::Running,
            RunStatus::Completed => ScheduleStatus::Completed,
            RunStatus::Failed => ScheduleStatus::Failed,
            RunStatus::Error => ScheduleStatus::Error,
        }
    }
}

/// One deferred run request.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRequest {
    pub id: u64,
    pub fire_at: DateTime<Utc>,
    pub spec: CommandSpec,
    pub status: ScheduleStatus,
    /// Set once the engine fires the request and a run record exists.
    pub linked_run_id: Option<RunId>,
    /// Copied from the linked run on terminal propagation.
    pub results_file: Option<String>,
}

/// Cloneable handle to the scheduler. The daemon starts the engine loop at
/// startup via `start_engine`; a handle that never saw that call starts it
/// lazily on the first scheduling request. Either way the loop runs for
/// the life of the process and is only ever spawned once.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    requests: Mutex<Vec<ScheduledRequest>>,
    next_id: AtomicU64,
    engine_started: AtomicBool,
    supervisor: Supervisor,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(supervisor: Supervisor, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                requests: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                engine_started: AtomicBool::new(false),
                supervisor,
                config,
            }),
        }
    }

    /// Register a deferred run. Rejected synchronously when `fire_at` is
    /// not strictly in the future or the spec cannot build an invocation;
    /// no background state is created for a rejected request.
    pub async fn schedule(&self, spec: CommandSpec, fire_at: DateTime<Utc>) -> Result<u64, Error> {
        if fire_at <= Utc::now() {
            return Err(Error::FireTimeNotFuture { fire_at });
        }
        self.inner.supervisor.validate(&spec)?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = ScheduledRequest {
            id,
            fire_at,
            spec,
            status: ScheduleStatus::Scheduled,
            linked_run_id: None,
            results_file: None,
        };
        self.inner.requests.lock().await.push(request);
        info!(request_id = id, fire_at = %fire_at, "run scheduled");

        self.ensure_engine_started();
        Ok(id)
    }

    /// Snapshot of every pending and fired request.
    pub async fn list(&self) -> Vec<ScheduledRequest> {
        self.inner.requests.lock().await.clone()
    }

    /// Cancel a not-yet-fired request, removing it outright.
    ///
    /// Only legal while the request is still `scheduled`; anything else is
    /// rejected and the entry is left unchanged. Cancellation never stops
    /// an already-fired process.
    pub async fn cancel(&self, id: u64) -> Result<(), Error> {
        let mut requests = self.inner.requests.lock().await;
        let Some(pos) = requests.iter().position(|r| r.id == id) else {
            return Err(Error::ScheduleNotFound(id));
        };
        if requests[pos].status != ScheduleStatus::Scheduled {
            return Err(Error::CancelRejected {
                id,
                status: requests[pos].status.to_string(),
            });
        }
        requests.remove(pos);
        info!(request_id = id, "scheduled run canceled");
        Ok(())
    }

    /// Spawn the engine loop now. The daemon calls this at startup;
    /// embedders that skip it still get the loop on the first `schedule`.
    pub fn start_engine(&self) {
        self.ensure_engine_started();
    }

    fn ensure_engine_started(&self) {
        if self.inner.engine_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduler = self.clone();
        tokio::spawn(async move {
            engine::run_scheduler_loop(scheduler).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::durations::DurationStore;
    use crate::run::command::Platform;
    use crate::run::registry::Registry;

    fn scheduler() -> Scheduler {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let durations = DurationStore::load(dir.path().join("durations.json"));
        let supervisor = Supervisor::new(Registry::new(), durations, &config);
        Scheduler::new(supervisor, config.scheduler)
    }

    fn spec() -> CommandSpec {
        CommandSpec {
            platform: Platform::Web,
            test_set: "tests/parts.csv".into(),
            url: None,
            username: None,
            password: None,
            headless: true,
            save_all_screenshots: false,
            wait_time: None,
        }
    }

    #[tokio::test]
    async fn rejects_fire_time_in_the_past() {
        let scheduler = scheduler();
        let past = Utc::now() - chrono::Duration::seconds(1);
        let err = scheduler.schedule(spec(), past).await.unwrap_err();
        assert!(matches!(err, Error::FireTimeNotFuture { .. }));
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_spec_before_storing() {
        let scheduler = scheduler();
        let mut bad = spec();
        bad.platform = Platform::Custom; // custom without a url
        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(matches!(
            scheduler.schedule(bad, future).await,
            Err(Error::InvalidSpec(_))
        ));
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_removes_scheduled_request() {
        let scheduler = scheduler();
        let future = Utc::now() + chrono::Duration::hours(1);
        let id = scheduler.schedule(spec(), future).await.unwrap();
        assert_eq!(scheduler.list().await.len(), 1);

        scheduler.cancel(id).await.unwrap();
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_not_found() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.cancel(99).await,
            Err(Error::ScheduleNotFound(99))
        ));
    }

    #[tokio::test]
    async fn cancel_fired_request_is_rejected_and_left_unchanged() {
        let scheduler = scheduler();
        let future = Utc::now() + chrono::Duration::hours(1);
        let id = scheduler.schedule(spec(), future).await.unwrap();

        // Simulate the engine having fired the request.
        scheduler
            .inner
            .requests
            .lock()
            .await
            .iter_mut()
            .find(|r| r.id == id)
            .unwrap()
            .status = ScheduleStatus::Running;

        let err = scheduler.cancel(id).await.unwrap_err();
        assert!(matches!(err, Error::CancelRejected { .. }));

        let listed = scheduler.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ScheduleStatus::Running);
    }

    #[tokio::test]
    async fn start_engine_is_idempotent() {
        let scheduler = scheduler();
        assert!(!scheduler.inner.engine_started.load(Ordering::SeqCst));

        scheduler.start_engine();
        assert!(scheduler.inner.engine_started.load(Ordering::SeqCst));

        // A second call must not flip anything back or spawn again.
        scheduler.start_engine();
        assert!(scheduler.inner.engine_started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let scheduler = scheduler();
        let future = Utc::now() + chrono::Duration::hours(1);
        let a = scheduler.schedule(spec(), future).await.unwrap();
        let b = scheduler.schedule(spec(), future).await.unwrap();
        assert!(b > a);
    }
}
