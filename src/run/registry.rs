//! Shared run table with per-record locking.
//!
//! The registry is process-wide shared state: supervisors and watchdogs
//! write, the API and the scheduler read. Each record sits behind its own
//! lock so concurrent runs never contend with each other, and readers get
//! cloned snapshots rather than lock guards.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::run::{RunId, RunRecord};

/// Shared handle to one run's record.
pub type RecordHandle = Arc<RwLock<RunRecord>>;

#[derive(Clone, Default)]
pub struct Registry {
    runs: Arc<RwLock<HashMap<RunId, RecordHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record and return its handle.
    pub async fn insert(&self, record: RunRecord) -> RecordHandle {
        let run_id = record.run_id.clone();
        let handle = Arc::new(RwLock::new(record));
        self.runs.write().await.insert(run_id, Arc::clone(&handle));
        handle
    }

    pub async fn handle(&self, run_id: &RunId) -> Option<RecordHandle> {
        self.runs.read().await.get(run_id).cloned()
    }

    /// Point-in-time copy of one record.
    pub async fn snapshot(&self, run_id: &RunId) -> Option<RunRecord> {
        let handle = self.handle(run_id).await?;
        let record = handle.read().await;
        Some(record.clone())
    }

    /// Snapshots of every record, newest first.
    pub async fn list(&self) -> Vec<RunRecord> {
        let handles: Vec<RecordHandle> = self.runs.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            records.push(handle.read().await.clone());
        }
        // Run ids sort by creation order.
        records.sort_by(|a, b| b.run_id.cmp(&a.run_id));
        records
    }

    /// Duration of any run in this process that produced `results_file`.
    /// Covers recent runs before the persisted store is consulted.
    pub async fn duration_for(&self, results_file: &str) -> Option<f64> {
        let handles: Vec<RecordHandle> = self.runs.read().await.values().cloned().collect();
        for handle in handles {
            let record = handle.read().await;
            if record.results_file.as_deref() == Some(results_file) {
                if let Some(secs) = record.duration_seconds {
                    return Some(secs);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunStatus;

    fn record() -> RunRecord {
        RunRecord::new(RunId::next(), "autotest-web --test-set t.csv".into())
    }

    #[tokio::test]
    async fn snapshot_returns_copy_not_live_view() {
        let registry = Registry::new();
        let rec = record();
        let id = rec.run_id.clone();
        let handle = registry.insert(rec).await;

        let snap = registry.snapshot(&id).await.unwrap();
        handle.write().await.append_line("later".into());
        assert!(snap.output.is_empty());
        assert_eq!(registry.snapshot(&id).await.unwrap().output.len(), 1);
    }

    #[tokio::test]
    async fn unknown_run_id_is_none() {
        let registry = Registry::new();
        assert!(registry.snapshot(&RunId::next()).await.is_none());
        assert!(registry.handle(&RunId::next()).await.is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let registry = Registry::new();
        let a = record();
        let b = record();
        let (ida, idb) = (a.run_id.clone(), b.run_id.clone());
        registry.insert(a).await;
        registry.insert(b).await;

        let listed = registry.list().await;
        assert_eq!(listed[0].run_id, idb);
        assert_eq!(listed[1].run_id, ida);
    }

    #[tokio::test]
    async fn duration_for_matches_results_file() {
        let registry = Registry::new();
        let mut rec = record();
        rec.results_file = Some("out.csv".into());
        let id = rec.run_id.clone();
        let handle = registry.insert(rec).await;

        // No duration until the run is terminal.
        assert_eq!(registry.duration_for("out.csv").await, None);

        handle.write().await.finish(RunStatus::Completed);
        let snap = registry.snapshot(&id).await.unwrap();
        assert_eq!(registry.duration_for("out.csv").await, snap.duration_seconds);
        assert_eq!(registry.duration_for("other.csv").await, None);
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing() {
        let registry = Registry::new();
        let handle = registry.insert(record()).await;

        let mut tasks = Vec::new();
        for t in 0..4 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move {
                for i in 0..100 {
                    handle.write().await.append_line(format!("{t}:{i}"));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(handle.read().await.output.len(), 400);
    }
}
