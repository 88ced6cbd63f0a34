use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Global configuration loaded from `~/.config/jfetch/config.toml`.
///
/// Every field has a default so a partial (or missing) file works; CLI flags
/// override on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JfetchConfig {
    /// Maximum number of jobs with an in-flight fetch attempt.
    pub max_concurrent: usize,
    /// Maximum attempts per job, including the first.
    pub max_attempts: u32,
    /// Base retry delay in seconds (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Upper bound on any backoff delay, in seconds.
    pub max_delay_secs: u64,
    /// Connect timeout per attempt, in seconds.
    pub connect_timeout_secs: u64,
    /// Overall request timeout per attempt, in seconds.
    pub request_timeout_secs: u64,
    /// Progress monitor polling interval, in seconds.
    pub poll_interval_secs: u64,
    /// How long an interrupted run waits for in-flight jobs before forcing
    /// termination, in seconds.
    pub grace_period_secs: u64,
}

impl Default for JfetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_attempts: 3,
            base_delay_secs: 0.5,
            max_delay_secs: 30,
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
            poll_interval_secs: 1,
            grace_period_secs: 5,
        }
    }
}

impl JfetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("jfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<JfetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = JfetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: JfetchConfig = toml::from_str(&data)?;
    Ok(cfg)
}
