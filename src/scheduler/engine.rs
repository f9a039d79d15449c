//! Scheduler engine -- fires due requests and propagates run outcomes.
//!
//! A single background loop scans the request list: due requests are handed
//! to the Process Supervisor (fire-and-continue, never fire-and-block), and
//! requests whose linked run has reached a terminal state get that outcome
//! mirrored back. One bad request never stops the loop.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::run::RunId;
use crate::scheduler::{ScheduleStatus, Scheduler};

/// Main scheduler loop. Sleeps a longer idle interval while the list is
/// empty, a short poll interval otherwise.
pub async fn run_scheduler_loop(scheduler: Scheduler) {
    info!("scheduler engine started");

    loop {
        let empty = scheduler.inner.requests.lock().await.is_empty();
        if empty {
            tokio::time::sleep(scheduler.inner.config.idle()).await;
            continue;
        }

        fire_due_requests(&scheduler).await;
        propagate_outcomes(&scheduler).await;

        tokio::time::sleep(scheduler.inner.config.poll()).await;
    }
}

/// Start every `scheduled` request whose fire time has arrived.
async fn fire_due_requests(scheduler: &Scheduler) {
    let now = Utc::now();
    let mut requests = scheduler.inner.requests.lock().await;

    for req in requests.iter_mut() {
        if req.status != ScheduleStatus::Scheduled || req.fire_at > now {
            continue;
        }

        // Mark as running before the handoff so a slow spawn cannot
        // double-fire the request on the next scan.
        req.status = ScheduleStatus::Running;
        info!(request_id = req.id, fire_at = %req.fire_at, "firing scheduled run");

        if !Path::new(&req.spec.test_set).exists() {
            warn!(
                request_id = req.id,
                test_set = %req.spec.test_set,
                "test set missing at fire time"
            );
            req.status = ScheduleStatus::Error;
            continue;
        }

        // start_run returns as soon as the run task is spawned, so holding
        // the list lock here never blocks on the child process.
        match scheduler.inner.supervisor.start_run(&req.spec).await {
            Ok(run_id) => {
                debug!(request_id = req.id, run_id = %run_id, "scheduled run started");
                req.linked_run_id = Some(run_id);
            }
            Err(err) => {
                error!(request_id = req.id, error = %err, "failed to start scheduled run");
                req.status = ScheduleStatus::Error;
            }
        }
    }
}

/// Copy terminal status and results file from linked runs back onto their
/// requests. Propagation is one-shot: a request leaves `running` exactly
/// when its outcome lands, so terminal requests are never re-scanned.
async fn propagate_outcomes(scheduler: &Scheduler) {
    let pending: Vec<(u64, RunId)> = {
        let requests = scheduler.inner.requests.lock().await;
        requests
            .iter()
            .filter(|r| r.status == ScheduleStatus::Running)
            .filter_map(|r| Some((r.id, r.linked_run_id.clone()?)))
            .collect()
    };

    for (request_id, run_id) in pending {
        let Some(record) = scheduler.inner.supervisor.registry().snapshot(&run_id).await else {
            continue;
        };
        if !record.status.is_terminal() {
            continue;
        }

        let mut requests = scheduler.inner.requests.lock().await;
        if let Some(req) = requests.iter_mut().find(|r| r.id == request_id) {
            if req.status == ScheduleStatus::Running {
                req.status = record.status.into();
                req.results_file = record.results_file.clone();
                debug!(
                    request_id,
                    run_id = %run_id,
                    status = %req.status,
                    "scheduled run outcome propagated"
                );
            }
        }
    }
}
