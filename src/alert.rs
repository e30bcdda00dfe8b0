//! Stall watcher: raises escalating alerts when the seed node's height
//! stops moving.
//!
//! Each tick samples the walked height of the first seed node. A new height
//! resets the silence timer and the escalation level. An unchanged height
//! fires one alert per configured threshold, each only once, so a network
//! that never recovers produces exactly as many alerts as there are
//! thresholds.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::AlertConfig;
use crate::events::{Broadcaster, MonitorEvent};
use crate::mail::{stall_message, stall_report, Mailer};
use crate::roster::Roster;
use crate::store::RecordStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct StallState {
    last_height: Option<u64>,
    silence_start_ms: u64,
    /// Alerts already sent for the current silence.
    level: usize,
}

/// One alert that was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallAlert {
    pub height: u64,
    pub silent_for: Duration,
    /// 1-based escalation level.
    pub level: usize,
}

pub struct StallWatcher {
    roster: Arc<Roster>,
    store: Arc<dyn RecordStore>,
    events: Arc<dyn Broadcaster>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    cfg: AlertConfig,
    thresholds: Vec<Duration>,
    state: Mutex<StallState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StallWatcher {
    pub fn new(
        roster: Arc<Roster>,
        store: Arc<dyn RecordStore>,
        events: Arc<dyn Broadcaster>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        cfg: AlertConfig,
    ) -> Self {
        Self {
            roster,
            store,
            events,
            mailer,
            clock,
            thresholds: cfg.thresholds(),
            cfg,
            state: Mutex::new(StallState::default()),
            task: Mutex::new(None),
        }
    }

    /// Start the periodic watch. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *self.state.lock() = StallState {
            silence_start_ms: self.clock.now_ms(),
            ..StallState::default()
        };

        let watcher = Arc::clone(self);
        let period = self.cfg.tick();
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                watcher.tick().await;
            }
        }));
        info!("[ALERT] Stall watcher started ({:?} tick)", period);
        true
    }

    /// Stop the periodic watch. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        match self.task.lock().take() {
            Some(handle) => {
                handle.abort();
                info!("[ALERT] Stall watcher stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Sample the seed node once, alerting if a threshold was crossed.
    pub async fn tick(&self) -> Option<StallAlert> {
        let seed = self.roster.seed_node()?;
        let height = seed.lastest_height?;
        let alert = self.observe(height, self.clock.now_ms())?;
        self.raise(&alert).await;
        Some(alert)
    }

    fn observe(&self, height: u64, now_ms: u64) -> Option<StallAlert> {
        let mut st = self.state.lock();
        if st.last_height != Some(height) {
            *st = StallState {
                last_height: Some(height),
                silence_start_ms: now_ms,
                level: 0,
            };
            return None;
        }

        let silent_for = Duration::from_millis(now_ms.saturating_sub(st.silence_start_ms));
        let threshold = self.thresholds.get(st.level)?;
        if silent_for <= *threshold {
            return None;
        }
        st.level += 1;
        Some(StallAlert {
            height,
            silent_for,
            level: st.level,
        })
    }

    async fn raise(&self, alert: &StallAlert) {
        let minutes = (alert.silent_for.as_millis() as u64 + 30_000) / 60_000;
        let message = stall_message(minutes, alert.height);
        warn!("[ALERT] Level {}: {}", alert.level, message);
        self.events.emit(MonitorEvent::MailNotify(message));

        if !self.cfg.mail_enabled {
            return;
        }
        let recipients: Vec<String> = match self.store.all_mails() {
            Ok(mails) => mails.into_iter().map(|m| m.address).collect(),
            Err(e) => {
                warn!("[ALERT] Could not load mail recipients: {}", e);
                return;
            }
        };
        let body = stall_report(minutes, alert.height, &self.roster.nodes());
        if let Err(e) = self.mailer.send(&recipients, &self.cfg.subject, &body).await {
            warn!("[ALERT] Mail delivery failed: {:#}", e);
        }
    }
}
