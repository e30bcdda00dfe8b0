use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How and how often the remote nodes are polled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub height_tick_ms: u64,
    /// Minimum time between two height queries against the same node.
    pub height_window_ms: u64,

    pub status_tick_ms: u64,
    pub status_window_ms: u64,

    pub update_tick_ms: u64,
    pub update_window_ms: u64,

    pub bootstrap_tick_ms: u64,

    /// Upper bound on the `limit` of one block range request.
    pub batch_limit: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            height_tick_ms: 200,
            height_window_ms: 1_000,
            status_tick_ms: 200,
            status_window_ms: 10_000,
            update_tick_ms: 200,
            update_window_ms: 2_000,
            bootstrap_tick_ms: 1_000,
            batch_limit: 100,
        }
    }
}

impl PollConfig {
    pub fn height_tick(&self) -> Duration {
        Duration::from_millis(self.height_tick_ms)
    }

    pub fn status_tick(&self) -> Duration {
        Duration::from_millis(self.status_tick_ms)
    }

    pub fn update_tick(&self) -> Duration {
        Duration::from_millis(self.update_tick_ms)
    }

    pub fn bootstrap_tick(&self) -> Duration {
        Duration::from_millis(self.bootstrap_tick_ms)
    }
}

/// Facts about the observed chain and its HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Instant block timestamps count from.
    pub genesis: DateTime<Utc>,
    pub request_timeout_ms: u64,
    /// Timeout for block range requests, which can be large.
    pub batch_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            genesis: default_genesis(),
            request_timeout_ms: 4_000,
            batch_timeout_ms: 30_000,
        }
    }
}

impl ChainConfig {
    pub fn genesis_ms(&self) -> i64 {
        self.genesis.timestamp_millis()
    }
}

pub fn default_genesis() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 10, 12, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_genesis_matches_chain_epoch() {
        assert_eq!(ChainConfig::default().genesis_ms(), 1_539_345_600_000);
    }

    #[test]
    fn partial_poll_section_keeps_other_defaults() {
        let cfg: PollConfig = toml::from_str("height_window_ms = 500").unwrap();
        assert_eq!(cfg.height_window_ms, 500);
        assert_eq!(cfg.status_window_ms, 10_000);
        assert_eq!(cfg.batch_limit, 100);
    }
}
