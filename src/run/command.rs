//! Building the external test-executable invocation.
//!
//! The executables accept a fixed flag contract: `--test-set`, `--url`,
//! `--username`, `--password`, `--headless`, `--save-all-screenshots` and
//! `--wait-time`. Which program runs is decided by the platform and the
//! `[runner]` configuration.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::RunnerConfig;
use crate::error::Error;

/// Target site flavor. Selects the external executable and decides whether
/// a URL is mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    App,
    Web,
    Pro,
    /// Arbitrary site; requires an explicit URL.
    Custom,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::App => "app",
            Platform::Web => "web",
            Platform::Pro => "pro",
            Platform::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// Everything a caller provides to describe one run, immediate or deferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub platform: Platform,
    pub test_set: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub save_all_screenshots: bool,
    #[serde(default)]
    pub wait_time: Option<f64>,
}

/// A fully built external invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Display string of the exact invocation, for audit and the dashboard.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl CommandSpec {
    /// Build the external invocation, validating the spec.
    ///
    /// Rejection here is synchronous; no background state exists yet.
    pub fn build(&self, runner: &RunnerConfig) -> Result<Invocation, Error> {
        if self.test_set.trim().is_empty() {
            return Err(Error::InvalidSpec("test-set path is required".into()));
        }

        let mut args = vec!["--test-set".to_string(), self.test_set.clone()];
        let url = self.url.as_deref().filter(|u| !u.trim().is_empty());

        match self.platform {
            Platform::Custom => {
                let url = url.ok_or_else(|| {
                    Error::InvalidSpec("url is required for the custom platform".into())
                })?;
                args.push("--url".into());
                args.push(url.to_string());
            }
            _ => {
                if let Some(url) = url {
                    args.push("--url".into());
                    args.push(url.to_string());
                }
            }
        }

        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            args.push("--username".into());
            args.push(username.to_string());
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            args.push("--password".into());
            args.push(password.to_string());
        }
        if self.headless {
            args.push("--headless".into());
        }
        if self.save_all_screenshots {
            args.push("--save-all-screenshots".into());
        }
        // The executables assume the default wait time; only pass the flag
        // when the caller asked for something else.
        if let Some(wait) = self.wait_time {
            if (wait - runner.default_wait_time).abs() > f64::EPSILON {
                args.push("--wait-time".into());
                args.push(wait.to_string());
            }
        }

        Ok(Invocation {
            program: runner.program_for(self.platform).to_string(),
            args,
        })
    }
}
