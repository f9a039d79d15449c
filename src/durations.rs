//! Persisted run durations keyed by results-artifact name.
//!
//! A single flat JSON file mapping results-file name to elapsed seconds,
//! rewritten in full and flushed on every update so a crash loses at most
//! the most recent entry. Absent or malformed files never fail startup.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Clone)]
pub struct DurationStore {
    path: PathBuf,
    map: Arc<RwLock<HashMap<String, f64>>>,
}

impl DurationStore {
    /// Load the store from `path`, starting empty when the file is missing
    /// or unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<HashMap<String, f64>>(&text) {
                Ok(map) => {
                    info!(path = %path.display(), entries = map.len(), "loaded duration store");
                    map
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "durations file is malformed, starting empty"
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "could not read durations file, starting empty"
                );
                HashMap::new()
            }
        };

        Self {
            path,
            map: Arc::new(RwLock::new(map)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, name: &str) -> Option<f64> {
        self.map.read().await.get(name).copied()
    }

    /// Record one duration and durably rewrite the whole file before
    /// returning. The write lock is held across the rewrite so concurrent
    /// puts cannot interleave and drop each other's entries.
    pub async fn put(&self, name: &str, seconds: f64) -> Result<()> {
        let mut map = self.map.write().await;
        map.insert(name.to_string(), seconds);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create durations directory: {}", parent.display())
                })?;
            }
        }

        let file = File::create(&self.path)
            .with_context(|| format!("failed to rewrite durations file: {}", self.path.display()))?;
        serde_json::to_writer(&file, &*map).context("failed to serialize durations")?;
        file.sync_all()
            .with_context(|| format!("failed to flush durations file: {}", self.path.display()))?;

        Ok(())
    }
}
