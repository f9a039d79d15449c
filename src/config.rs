//! TOML configuration for the testdeck daemon.
//!
//! Layered lookup with sensible defaults: an explicit path wins, then the
//! `TESTDECK_CONFIG` environment variable, then `testdeck.toml` in the
//! working directory, then compiled-in defaults. Timing constants here are
//! configuration, not contract; tests shorten them freely.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::run::command::Platform;

/// Root configuration for the daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub watchdog: WatchdogConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub runner: RunnerConfig,
}

/// Hung-run detection constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Seconds between inactivity checks.
    pub poll_secs: u64,
    /// Seconds without a new output line before a run is treated as hung.
    /// Must be larger than `poll_secs` to avoid false positives.
    pub inactivity_secs: u64,
    /// Seconds to wait for graceful exit before force-killing.
    pub grace_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_secs: 15,
            inactivity_secs: 120,
            grace_secs: 5,
        }
    }
}

impl WatchdogConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn inactivity(&self) -> Duration {
        Duration::from_secs(self.inactivity_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Deferred-run polling constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between scans while the request list is empty.
    pub idle_secs: u64,
    /// Sleep between scans while requests are pending.
    pub poll_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_secs: 30,
            poll_secs: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

/// Persistence locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Flat JSON map of results-file name to elapsed seconds.
    pub durations_file: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durations_file: PathBuf::from("data/test_durations.json"),
        }
    }
}

/// External test-executable selection per platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub app: String,
    pub web: String,
    pub pro: String,
    pub custom: String,
    /// Wait time the executables assume when `--wait-time` is absent.
    pub default_wait_time: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            app: "autotest-app".into(),
            web: "autotest-web".into(),
            pro: "autotest-pro".into(),
            custom: "autotest-custom".into(),
            default_wait_time: 2.0,
        }
    }
}

impl RunnerConfig {
    pub fn program_for(&self, platform: Platform) -> &str {
        match platform {
            Platform::App => &self.app,
            Platform::Web => &self.web,
            Platform::Pro => &self.pro,
            Platform::Custom => &self.custom,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path in the `TESTDECK_CONFIG` environment variable.
    /// 2. `testdeck.toml` in the working directory.
    /// 3. Compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("TESTDECK_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "TESTDECK_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new("testdeck.toml");
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(error = %e, "testdeck.toml present but unusable, using defaults");
                }
            }
        }

        debug!("no configuration file found, using defaults");
        Self::default()
    }
}
