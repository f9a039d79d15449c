//! Process Supervisor -- spawns external test runs and records their
//! lifecycle.
//!
//! `start_run` returns as soon as the record exists; the run itself
//! executes on its own task. The child's stdout and stderr are merged into
//! one ordered line stream, every line feeds the record, and the exit code
//! decides the terminal state. All failures inside a supervision task
//! become record state; nothing propagates out.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{Config, RunnerConfig, WatchdogConfig};
use crate::durations::DurationStore;
use crate::error::Error;
use crate::run::command::{CommandSpec, Invocation};
use crate::run::output;
use crate::run::registry::{RecordHandle, Registry};
use crate::run::watchdog;
use crate::run::{RunId, RunRecord, RunStatus};

#[derive(Clone)]
pub struct Supervisor {
    registry: Registry,
    durations: DurationStore,
    watchdog: WatchdogConfig,
    runner: RunnerConfig,
}

impl Supervisor {
    pub fn new(registry: Registry, durations: DurationStore, config: &Config) -> Self {
        Self {
            registry,
            durations,
            watchdog: config.watchdog.clone(),
            runner: config.runner.clone(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Check that a spec can be turned into an invocation without starting
    /// anything. Used by the scheduler to reject bad requests up front.
    pub fn validate(&self, spec: &CommandSpec) -> Result<(), Error> {
        spec.build(&self.runner).map(|_| ())
    }

    /// Start one run. Non-blocking: allocates a run id, inserts a `running`
    /// record, and hands the rest to a background task.
    ///
    /// Only an invalid spec is rejected here; spawn failures and everything
    /// after are recorded on the RunRecord.
    pub async fn start_run(&self, spec: &CommandSpec) -> Result<RunId, Error> {
        let invocation = spec.build(&self.runner)?;
        let run_id = RunId::next();
        let record = RunRecord::new(run_id.clone(), invocation.display());
        let handle = self.registry.insert(record).await;

        info!(run_id = %run_id, command = %invocation.display(), "starting test run");

        let supervisor = self.clone();
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            supervisor.supervise(task_run_id, handle, invocation).await;
        });

        Ok(run_id)
    }

    async fn supervise(self, run_id: RunId, record: RecordHandle, invocation: Invocation) {
        if let Err(err) = self.supervise_inner(&run_id, &record, invocation).await {
            error!(run_id = %run_id, error = %err, "run supervision failed");
            let mut rec = record.write().await;
            rec.append_line(format!("Error: {err:#}"));
            rec.finish(RunStatus::Error);
        }
    }

    async fn supervise_inner(
        &self,
        run_id: &RunId,
        record: &RecordHandle,
        invocation: Invocation,
    ) -> Result<()> {
        let mut cmd = invocation.command();
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", invocation.program))?;

        // Attach the watchdog before consuming any output, so a child that
        // never writes a line is still covered.
        let (kill_tx, mut kill_rx) = oneshot::channel();
        tokio::spawn(watchdog::watch(
            run_id.clone(),
            Arc::clone(record),
            kill_tx,
            self.watchdog.clone(),
        ));

        // Merge stdout and stderr into one ordered line stream.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(BufReader::new(stdout), line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(BufReader::new(stderr), line_tx.clone());
        }
        drop(line_tx);

        let mut killed = false;
        let mut kill_rx_spent = false;
        loop {
            tokio::select! {
                maybe_line = line_rx.recv() => match maybe_line {
                    Some(line) => {
                        let mut rec = record.write().await;
                        if rec.results_file.is_none() {
                            if let Some(path) = output::parse_results_marker(&line) {
                                rec.results_file = Some(path.to_string());
                            }
                        }
                        rec.append_line(line);
                    }
                    // Both pipes closed: the child is exiting.
                    None => break,
                },
                fired = &mut kill_rx, if !kill_rx_spent => {
                    kill_rx_spent = true;
                    if fired.is_ok() {
                        killed = true;
                        terminate_child(&mut child, self.watchdog.grace()).await;
                        // Keep draining: the readers flush whatever the
                        // child wrote before it died.
                    }
                }
            }
        }

        if killed {
            // The watchdog already marked the record; the exit code of a
            // process we shot down means nothing.
            return Ok(());
        }

        // The pipes can close while the process lives on (a child that
        // redirects its output away and then hangs). Keep servicing the
        // watchdog channel while waiting so that child still gets killed.
        let status = loop {
            tokio::select! {
                res = child.wait() => {
                    break res.context("failed to wait for test process")?;
                }
                fired = &mut kill_rx, if !kill_rx_spent => {
                    kill_rx_spent = true;
                    if fired.is_ok() {
                        killed = true;
                        terminate_child(&mut child, self.watchdog.grace()).await;
                    }
                }
            }
        };

        if killed {
            return Ok(());
        }
        let outcome = if status.success() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        info!(
            run_id = %run_id,
            exit_code = ?status.code(),
            status = %outcome,
            "test process exited"
        );

        let finished = record.write().await.finish(outcome);
        if !finished {
            // Lost the terminal race to the watchdog; its state stands.
            return Ok(());
        }

        let snapshot = record.read().await.clone();
        if let (Some(file), Some(secs)) = (&snapshot.results_file, snapshot.duration_seconds) {
            debug!(run_id = %run_id, results_file = %file, duration_secs = secs, "recording run duration");
            if let Err(err) = self.durations.put(file, secs).await {
                warn!(run_id = %run_id, error = %err, "failed to persist run duration");
            }
        }

        Ok(())
    }
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Gracefully terminate a child process.
///
/// Sends SIGTERM first, waits out the grace period, then sends SIGKILL if
/// the process is still running.
async fn terminate_child(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(exit_code = ?status.code(), "child exited after SIGTERM");
        }
        Ok(Err(e)) => {
            warn!(error = %e, "error waiting for child after SIGTERM");
        }
        Err(_) => {
            warn!("child did not exit after SIGTERM, sending SIGKILL");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to SIGKILL child");
            }
        }
    }
}
