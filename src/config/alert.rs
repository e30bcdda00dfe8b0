use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stall escalation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Start the stall watcher at boot.
    pub enabled: bool,
    /// When false the watcher still escalates but sends no mail.
    pub mail_enabled: bool,
    pub tick_secs: u64,
    /// Silence durations that raise an alert, one per escalation level.
    pub thresholds_secs: Vec<u64>,
    pub subject: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mail_enabled: true,
            tick_secs: 20,
            // 5min, 30min, 2h, 4h
            thresholds_secs: vec![300, 1_800, 7_200, 14_400],
            subject: "Block production monitor alert".to_string(),
        }
    }
}

impl AlertConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn thresholds(&self) -> Vec<Duration> {
        self.thresholds_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }
}

/// Outbound mail relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// HTTP endpoint accepting `{from, to, subject, html}`. Without one, mail
    /// is only logged.
    pub relay_url: Option<String>,
    pub from: String,
    pub timeout_ms: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            from: "\"Chain Monitor\" <monitor@localhost>".to_string(),
            timeout_ms: 10_000,
        }
    }
}
