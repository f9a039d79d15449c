//! Inactivity watchdog -- one monitor per active run.
//!
//! A run that produces no output for longer than the configured threshold
//! is assumed to be stuck in an unrecoverable wait (a modal dialog the
//! script cannot dismiss, a dead browser session). The watchdog marks the
//! record and asks the supervisor to terminate the child. The ordering is a
//! contract: the registry reflects the termination before the kill is
//! requested, so a concurrent reader never sees a dead process still
//! reported as running.

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::WatchdogConfig;
use crate::run::registry::RecordHandle;
use crate::run::{RunId, RunStatus};

/// Warning appended to the run's output when the watchdog fires.
pub const HUNG_WARNING: &str = "WARNING: process appears to be hung, terminated by watchdog";

/// Monitor one run until it reaches a terminal state or hangs.
///
/// Polls on a fixed interval. A hang marks the record `error` and then
/// fires `kill_tx`; the supervisor owns the child and performs the actual
/// termination.
pub(crate) async fn watch(
    run_id: RunId,
    record: RecordHandle,
    kill_tx: oneshot::Sender<()>,
    config: WatchdogConfig,
) {
    let mut ticker = tokio::time::interval(config.poll());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let idle = {
            let rec = record.read().await;
            if rec.status.is_terminal() {
                debug!(run_id = %run_id, "run finished, watchdog stopping");
                return;
            }
            (chrono::Utc::now() - rec.last_activity).to_std().ok()
        };

        match idle {
            Some(idle) if idle > config.inactivity() => break,
            _ => {}
        }
    }

    warn!(
        run_id = %run_id,
        threshold_secs = config.inactivity_secs,
        "no output within threshold, terminating hung run"
    );

    {
        let mut rec = record.write().await;
        // The supervisor may have finished the run between our read and
        // this write; in that race the watchdog stands down.
        if rec.status.is_terminal() {
            return;
        }
        rec.append_line(HUNG_WARNING.to_string());
        rec.finish(RunStatus::Error);
    }

    // Mark-then-kill: the record above is already terminal when the
    // supervisor receives this.
    let _ = kill_tx.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::registry::Registry;
    use crate::run::RunRecord;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_config() -> WatchdogConfig {
        WatchdogConfig {
            poll_secs: 1,
            inactivity_secs: 1,
            grace_secs: 1,
        }
    }

    #[tokio::test]
    async fn stops_silently_when_run_is_already_terminal() {
        let registry = Registry::new();
        let mut rec = RunRecord::new(RunId::next(), "stub".into());
        rec.finish(RunStatus::Completed);
        let id = rec.run_id.clone();
        let handle = registry.insert(rec).await;

        let (kill_tx, kill_rx) = oneshot::channel();
        watch(id.clone(), handle, kill_tx, fast_config()).await;

        // No kill requested, record untouched.
        assert!(kill_rx.await.is_err());
        let snap = registry.snapshot(&id).await.unwrap();
        assert_eq!(snap.status, RunStatus::Completed);
        assert!(snap.output.is_empty());
    }

    #[tokio::test]
    async fn marks_record_before_requesting_kill() {
        let registry = Registry::new();
        let rec = RunRecord::new(RunId::next(), "stub".into());
        let id = rec.run_id.clone();
        let handle = registry.insert(rec).await;

        let (kill_tx, kill_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch(
            id.clone(),
            Arc::clone(&handle),
            kill_tx,
            fast_config(),
        ));

        // The kill request only arrives after the record is terminal.
        kill_rx.await.expect("watchdog should request a kill");
        let snap = registry.snapshot(&id).await.unwrap();
        assert_eq!(snap.status, RunStatus::Error);
        assert!(snap.output.iter().any(|l| l == HUNG_WARNING));
        assert!(snap.end_time.is_some());
        assert!(snap.duration_seconds.is_some());

        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn fresh_output_defers_the_watchdog() {
        let registry = Registry::new();
        let rec = RunRecord::new(RunId::next(), "stub".into());
        let id = rec.run_id.clone();
        let handle = registry.insert(rec).await;

        let (kill_tx, mut kill_rx) = oneshot::channel();
        let feeder = Arc::clone(&handle);
        let watcher = tokio::spawn(watch(
            id.clone(),
            Arc::clone(&handle),
            kill_tx,
            WatchdogConfig {
                poll_secs: 1,
                inactivity_secs: 2,
                grace_secs: 1,
            },
        ));

        // Feed a line every 500ms for 4s; the 2s threshold never trips.
        for i in 0..8 {
            feeder.write().await.append_line(format!("tick {i}"));
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert!(kill_rx.try_recv().is_err(), "watchdog fired despite activity");
        }

        // Let the run finish normally; the watchdog stands down.
        handle.write().await.finish(RunStatus::Completed);
        watcher.await.unwrap();
        assert_eq!(
            registry.snapshot(&id).await.unwrap().status,
            RunStatus::Completed
        );
    }
}
