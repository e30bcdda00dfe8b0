use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{PollContext, Poller};
use crate::events::MonitorEvent;
use crate::roster::RoundRobin;

/// Looks up the most recent block of delegates that have none attributed
/// yet, one delegate per tick.
pub struct BootstrapPoller {
    ctx: PollContext,
    cursor: RoundRobin,
}

impl BootstrapPoller {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx,
            cursor: RoundRobin::new(),
        }
    }
}

#[async_trait]
impl Poller for BootstrapPoller {
    fn name(&self) -> &'static str {
        "bootstrap"
    }

    fn interval(&self) -> Duration {
        self.ctx.poll.bootstrap_tick()
    }

    async fn tick(&mut self) {
        let roster = self.ctx.roster().clone();
        let pending = roster.uninitialized_delegates();
        let Some(idx) = self.cursor.next_index(pending.len()) else {
            return;
        };
        let delegate = &pending[idx];
        let Some(node) = roster.node(&delegate.node_id) else {
            return;
        };
        let Some(epoch) = roster.epoch(&node.id) else {
            return;
        };

        let Some(block) = self
            .ctx
            .client
            .get_last_generated_block(&node.endpoint(), &delegate.public_key)
            .await
        else {
            debug!(
                "[BOOTSTRAP] No produced block for delegate {} on {}:{}",
                delegate.public_key, node.ip, node.port
            );
            return;
        };

        if block.generator_public_key != delegate.public_key {
            debug!(
                "[BOOTSTRAP] Node {} answered with a block by {}, expected {}",
                node.id, block.generator_public_key, delegate.public_key
            );
            return;
        }

        let Some(applied) = self
            .ctx
            .reconciler
            .apply_produced_since(&node.id, epoch, &block)
        else {
            debug!(
                "[BOOTSTRAP] Node {} rolled back during lookup, dropping block {}",
                node.id, block.height
            );
            return;
        };
        let events = self.ctx.reconciler.events();
        if let Some(d) = applied.delegate {
            info!(
                "[BOOTSTRAP] Delegate {} last produced block {}",
                d.public_key, block.height
            );
            events.emit(MonitorEvent::DelegateUpdate(d.detail()));
        }
        if let Some(n) = applied.node {
            events.emit(MonitorEvent::NodeUpdate(n.detail(None)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::testing::{context_with_client, context_with_hub, RollbackOnFetch, ScriptedChain};
    use crate::types::{Delegate, Node};
    use std::sync::Arc;

    #[tokio::test]
    async fn initializes_delegates_then_leaves_them_alone() {
        let chain = Arc::new(ScriptedChain::default());
        chain.push_block(4096, 30, "pkA");
        chain.push_block(4096, 31, "pkB");
        chain.push_block(4096, 33, "pkA");
        let (ctx, _clock, hub) = context_with_hub(chain.clone());
        let mut rx = hub.subscribe();
        ctx.roster().add_node(Node::new("n1", "10.0.0.1", 4096));
        ctx.roster().add_delegate(Delegate::new("n1", "pkA", "A"));
        ctx.roster().add_delegate(Delegate::new("n1", "pkB", "B"));
        let mut poller = BootstrapPoller::new(ctx.clone());

        poller.tick().await;
        assert_eq!(ctx.roster().delegate("pkA").unwrap().block_height(), Some(33));
        assert_eq!(ctx.roster().node("n1").unwrap().block_height(), Some(33));
        assert_eq!(rx.try_recv().unwrap().name(), "delegate/update");
        assert_eq!(rx.try_recv().unwrap().name(), "node/update");

        poller.tick().await;
        assert_eq!(ctx.roster().delegate("pkB").unwrap().block_height(), Some(31));
        // node keeps the higher block
        assert_eq!(ctx.roster().node("n1").unwrap().block_height(), Some(33));
        assert_eq!(rx.try_recv().unwrap().name(), "delegate/update");
        assert!(rx.try_recv().is_err());

        poller.tick().await;
        assert_eq!(chain.calls().len(), 2);
    }

    #[tokio::test]
    async fn delegate_without_blocks_is_retried() {
        let chain = Arc::new(ScriptedChain::default());
        let (ctx, _clock) = crate::scheduler::testing::context(chain.clone());
        ctx.roster().add_node(Node::new("n1", "10.0.0.1", 4096));
        ctx.roster().add_delegate(Delegate::new("n1", "pkA", "A"));
        let mut poller = BootstrapPoller::new(ctx.clone());

        poller.tick().await;
        poller.tick().await;
        assert_eq!(chain.calls(), vec!["last:pkA".to_string(), "last:pkA".to_string()]);
        assert!(ctx.roster().delegate("pkA").unwrap().block.is_none());
    }

    #[tokio::test]
    async fn rollback_during_lookup_keeps_delegate_uninitialized() {
        let chain = Arc::new(ScriptedChain::default());
        chain.push_block(4096, 100, "pkA");
        let client = Arc::new(RollbackOnFetch::new(chain.clone(), "n1", 40));
        let (ctx, _clock, _hub) = context_with_client(client.clone());
        client.attach(ctx.reconciler.clone());
        ctx.roster().add_node(Node::new("n1", "10.0.0.1", 4096));
        ctx.roster().add_delegate(Delegate::new("n1", "pkA", "A"));
        ctx.reconciler.observe_height("n1", 100);
        let mut poller = BootstrapPoller::new(ctx.clone());

        poller.tick().await;
        assert!(ctx.roster().delegate("pkA").unwrap().block.is_none());
        assert!(ctx.roster().node("n1").unwrap().block.is_none());
        assert_eq!(ctx.roster().node("n1").unwrap().lastest_height, Some(39));

        // Same tip again is not a rollback, so the retry is applied.
        poller.tick().await;
        assert_eq!(ctx.roster().delegate("pkA").unwrap().block_height(), Some(100));
    }
}
