//! Daemon settings from `WAKEHUB_*` environment variables

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use wakehub_core::config::OtaConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/wakehub/config.json";
pub const DEFAULT_FIRMWARE_PATH: &str = "/var/lib/wakehub/firmware.bin";
pub const DEFAULT_TICK_MS: u64 = 100;

/// Snapshot file refresh period
pub const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum auto-check interval (one week)
const MAX_OTA_CHECK_MINUTES: u32 = 10_080;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub status_path: Option<PathBuf>,
    pub firmware_path: PathBuf,
    pub log_level: String,
    pub tick_ms: u64,
    pub ota_url: String,
    pub ota_check_minutes: u32,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let tick_ms = match var("WAKEHUB_TICK_MS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("WAKEHUB_TICK_MS must be a number of milliseconds. Got: {}", v))?,
            None => DEFAULT_TICK_MS,
        };
        let ota_check_minutes = match var("WAKEHUB_OTA_CHECK_MINUTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("WAKEHUB_OTA_CHECK_MINUTES must be a number of minutes. Got: {}", v))?,
            None => 0,
        };

        Ok(Self {
            config_path: var("WAKEHUB_CONFIG_PATH")
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            status_path: var("WAKEHUB_STATUS_PATH").map(PathBuf::from),
            firmware_path: var("WAKEHUB_FIRMWARE_PATH")
                .unwrap_or_else(|| DEFAULT_FIRMWARE_PATH.to_string())
                .into(),
            log_level: var("WAKEHUB_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            tick_ms,
            ota_url: var("WAKEHUB_OTA_URL").unwrap_or_default(),
            ota_check_minutes,
        })
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(50..=1000).contains(&self.tick_ms) {
            anyhow::bail!(
                "WAKEHUB_TICK_MS must be between 50 and 1000. Got: {}",
                self.tick_ms
            );
        }

        if self.ota_check_minutes > MAX_OTA_CHECK_MINUTES {
            anyhow::bail!(
                "WAKEHUB_OTA_CHECK_MINUTES must be between 0 and {}. Got: {}",
                MAX_OTA_CHECK_MINUTES,
                self.ota_check_minutes
            );
        }

        if !self.ota_url.is_empty()
            && !self.ota_url.starts_with("https://")
            && !self.ota_url.starts_with("http://")
        {
            anyhow::bail!(
                "WAKEHUB_OTA_URL must use HTTP or HTTPS scheme. Got: {}",
                self.ota_url
            );
        }

        if self.log_level().is_none() {
            anyhow::bail!(
                "WAKEHUB_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        for (name, path) in [
            ("WAKEHUB_CONFIG_PATH", Some(&self.config_path)),
            ("WAKEHUB_STATUS_PATH", self.status_path.as_ref()),
            ("WAKEHUB_FIRMWARE_PATH", Some(&self.firmware_path)),
        ] {
            if let Some(parent) = path.and_then(|p| p.parent())
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "{} parent directory does not exist: {}. \
                    Create it first: sudo mkdir -p {}",
                    name,
                    parent.display(),
                    parent.display()
                );
            }
        }

        Ok(())
    }

    pub fn log_level(&self) -> Option<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn ota_config(&self) -> OtaConfig {
        OtaConfig::new(self.ota_url.clone(), self.ota_check_minutes)
    }
}
