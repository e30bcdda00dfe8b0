//! Monitor configuration
//!
//! Loaded from an optional TOML file; every field has a default and single
//! fields can be overridden with `MONITOR_*` environment variables.

pub mod alert;
pub mod monitor;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use alert::{AlertConfig, MailConfig};
pub use monitor::{ChainConfig, PollConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8888".to_string(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    pub monitor: PollConfig,
    pub alert: AlertConfig,
    pub mail: MailConfig,
}

impl MonitorConfig {
    /// Read the config file (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config {}", p.display()))?;
                toml::from_str::<MonitorConfig>(&content)
                    .with_context(|| format!("failed to parse config {}", p.display()))?
            }
            None => MonitorConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `MONITOR_*` overrides. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v.trim().eq_ignore_ascii_case("true"));
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(val) = lookup("MONITOR_LISTEN") {
            self.server.listen = val.trim().to_string();
        }
        if let Some(val) = lookup("MONITOR_DATA_DIR") {
            self.server.data_dir = PathBuf::from(val.trim());
        }
        if let Some(val) = lookup("MONITOR_GENESIS") {
            if let Ok(ts) = val.trim().parse() {
                self.chain.genesis = ts;
            }
        }
        if let Some(n) = num("MONITOR_REQUEST_TIMEOUT_MS") {
            self.chain.request_timeout_ms = n;
        }
        if let Some(n) = num("MONITOR_BATCH_TIMEOUT_MS") {
            self.chain.batch_timeout_ms = n;
        }
        if let Some(n) = num("MONITOR_HEIGHT_WINDOW_MS") {
            self.monitor.height_window_ms = n;
        }
        if let Some(n) = num("MONITOR_STATUS_WINDOW_MS") {
            self.monitor.status_window_ms = n;
        }
        if let Some(n) = num("MONITOR_UPDATE_WINDOW_MS") {
            self.monitor.update_window_ms = n;
        }
        if let Some(n) = num("MONITOR_BATCH_LIMIT") {
            self.monitor.batch_limit = n.max(1);
        }
        if let Some(b) = flag("MONITOR_ALERT_ENABLED") {
            self.alert.enabled = b;
        }
        if let Some(b) = flag("MONITOR_MAIL_ENABLED") {
            self.alert.mail_enabled = b;
        }
        if let Some(n) = num("MONITOR_ALERT_TICK_SECS") {
            self.alert.tick_secs = n;
        }
        if let Some(val) = lookup("MONITOR_MAIL_RELAY_URL") {
            let val = val.trim();
            self.mail.relay_url = (!val.is_empty()).then(|| val.to_string());
        }
        if let Some(val) = lookup("MONITOR_MAIL_FROM") {
            self.mail.from = val.trim().to_string();
        }
    }
}
