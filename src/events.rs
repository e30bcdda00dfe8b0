//! Change notifications pushed to subscribers.
//!
//! Every event carries the public projection of the entity it concerns and
//! serializes as `{"event": "<name>", "data": ...}`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{DelegateDetail, NodeDetail};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum MonitorEvent {
    #[serde(rename = "height/update")]
    HeightUpdate(NodeDetail),
    #[serde(rename = "node/update")]
    NodeUpdate(NodeDetail),
    #[serde(rename = "delegate/update")]
    DelegateUpdate(DelegateDetail),
    #[serde(rename = "status/update")]
    StatusUpdate(NodeDetail),
    /// Node id.
    #[serde(rename = "node/add")]
    NodeAdded(String),
    #[serde(rename = "node/remove")]
    NodeRemoved(String),
    /// Delegate public key.
    #[serde(rename = "delegate/add")]
    DelegateAdded(String),
    #[serde(rename = "delegate/remove")]
    DelegateRemoved(String),
    /// Short stall alert text.
    #[serde(rename = "mail/notify")]
    MailNotify(String),
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::HeightUpdate(_) => "height/update",
            MonitorEvent::NodeUpdate(_) => "node/update",
            MonitorEvent::DelegateUpdate(_) => "delegate/update",
            MonitorEvent::StatusUpdate(_) => "status/update",
            MonitorEvent::NodeAdded(_) => "node/add",
            MonitorEvent::NodeRemoved(_) => "node/remove",
            MonitorEvent::DelegateAdded(_) => "delegate/add",
            MonitorEvent::DelegateRemoved(_) => "delegate/remove",
            MonitorEvent::MailNotify(_) => "mail/notify",
        }
    }
}

/// Fire-and-forget notification sink.
pub trait Broadcaster: Send + Sync {
    fn emit(&self, event: MonitorEvent);
}

/// Fan-out hub over a tokio broadcast channel. Each WebSocket connection
/// holds one receiver.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcaster for EventHub {
    fn emit(&self, event: MonitorEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(count) => debug!("Sent {} to {} subscribers", name, count),
            Err(_) => debug!("No active subscribers for {}", name),
        }
    }
}
