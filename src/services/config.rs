//! Dashboard configuration stored at `~/.salesboard/config.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::types::{Result, SalesboardError, TimeFrame};

/// Default store poll interval in milliseconds
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Settings file contents; every field is optional on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Directory of exported order documents
    pub store_dir: PathBuf,
    pub poll_interval_ms: u64,
    pub default_timeframe: TimeFrame,
    /// Session file written by the sign-in flow
    pub session_file: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let base = base_dir().unwrap_or_else(|_| PathBuf::from(".salesboard"));
        Self::rooted_at(&base)
    }
}

impl DashboardConfig {
    /// Defaults with every path under `base`
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            store_dir: base.join("orders"),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_timeframe: TimeFrame::default(),
            session_file: base.join("session.json"),
        }
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&base_dir()?.join("config.json"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            SalesboardError::Config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(SalesboardError::Config(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// `~/.salesboard`
pub fn base_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new()
        .ok_or_else(|| SalesboardError::Config("Cannot determine home directory".into()))?;
    Ok(base_dirs.home_dir().join(".salesboard"))
}
