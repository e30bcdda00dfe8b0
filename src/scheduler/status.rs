use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{PollContext, Poller};
use crate::events::MonitorEvent;
use crate::roster::{PollKind, RoundRobin};
use crate::types::NodeStatus;

/// Polls each node's syncing flag in turn.
pub struct StatusPoller {
    ctx: PollContext,
    cursor: RoundRobin,
}

impl StatusPoller {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx,
            cursor: RoundRobin::new(),
        }
    }
}

#[async_trait]
impl Poller for StatusPoller {
    fn name(&self) -> &'static str {
        "status"
    }

    fn interval(&self) -> Duration {
        self.ctx.poll.status_tick()
    }

    async fn tick(&mut self) {
        let roster = self.ctx.roster().clone();
        let Some(idx) = self.cursor.next_index(roster.node_count()) else {
            return;
        };
        let Some(node) = roster.node_at(idx) else {
            return;
        };
        if !roster.claim(
            &node.id,
            PollKind::Status,
            self.ctx.now_ms(),
            self.ctx.poll.status_window_ms,
        ) {
            return;
        }

        let Some(syncing) = self.ctx.client.get_sync_status(&node.endpoint()).await else {
            debug!("[STATUS] No sync status from {}:{}", node.ip, node.port);
            return;
        };

        let status = NodeStatus::from_syncing(syncing);
        let changed = roster.update_node(&node.id, |n| {
            if n.status == status {
                false
            } else {
                n.status = status;
                true
            }
        });

        if let Some((true, node)) = changed {
            info!("[STATUS] Node {} ({}:{}) now {:?}", node.id, node.ip, node.port, status);
            self.ctx.reconciler.persist_node(&node);
            self.ctx
                .reconciler
                .events()
                .emit(MonitorEvent::StatusUpdate(node.detail(None)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::testing::{context_with_hub, ScriptedChain};
    use crate::types::Node;
    use std::sync::Arc;

    #[tokio::test]
    async fn broadcasts_only_on_change() {
        let chain = Arc::new(ScriptedChain::default());
        chain.set_syncing(4096, true);
        let (ctx, clock, hub) = context_with_hub(chain.clone());
        let mut rx = hub.subscribe();
        ctx.roster().add_node(Node::new("n1", "10.0.0.1", 4096));
        let mut poller = StatusPoller::new(ctx.clone());

        poller.tick().await;
        assert_eq!(ctx.roster().node("n1").unwrap().status, NodeStatus::Syncing);
        assert_eq!(rx.try_recv().unwrap().name(), "status/update");

        clock.advance(Duration::from_secs(11));
        poller.tick().await;
        assert!(rx.try_recv().is_err());

        chain.set_syncing(4096, false);
        clock.advance(Duration::from_secs(11));
        poller.tick().await;
        assert_eq!(ctx.roster().node("n1").unwrap().status, NodeStatus::Synced);
        assert_eq!(rx.try_recv().unwrap().name(), "status/update");
    }

    #[tokio::test]
    async fn respects_status_window() {
        let chain = Arc::new(ScriptedChain::default());
        let (ctx, clock) = crate::scheduler::testing::context(chain.clone());
        ctx.roster().add_node(Node::new("n1", "10.0.0.1", 4096));
        let mut poller = StatusPoller::new(ctx);

        poller.tick().await;
        clock.advance(Duration::from_secs(5));
        poller.tick().await;
        assert_eq!(chain.calls(), vec!["sync:4096".to_string()]);
    }
}
