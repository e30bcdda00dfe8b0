use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PollContext, Poller};
use crate::events::MonitorEvent;
use crate::roster::{PollKind, RoundRobin};
use crate::types::{Block, Delegate, Node};

/// Walks each node forward from its last walked height to its tip,
/// attributing every block to the delegate that produced it.
pub struct UpdatePoller {
    ctx: PollContext,
    cursor: RoundRobin,
}

/// Catch-up work for one node: blocks `(from, to]`, valid while the node's
/// rollback epoch is still `epoch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gap {
    from: u64,
    to: u64,
    epoch: u64,
}

impl UpdatePoller {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx,
            cursor: RoundRobin::new(),
        }
    }

    fn next_target(&mut self) -> Option<(Node, Gap)> {
        let roster = self.ctx.roster();
        let idx = self.cursor.next_index(roster.node_count())?;
        let node = roster.node_at(idx)?;
        let from = node.lastest_height?;
        let cache = roster.cache(&node.id)?;
        let to = cache.height?;
        if from >= to {
            return None;
        }
        if !roster.claim(
            &node.id,
            PollKind::Update,
            self.ctx.now_ms(),
            self.ctx.poll.update_window_ms,
        ) {
            return None;
        }
        Some((
            node,
            Gap {
                from,
                to,
                epoch: cache.epoch,
            },
        ))
    }

    async fn fetch(&self, node: &Node, gap: Gap) -> Option<Vec<Block>> {
        let endpoint = node.endpoint();
        let missing = gap.to - gap.from;
        if missing == 1 {
            let block = self.ctx.client.get_block(&endpoint, gap.to).await?;
            return Some(vec![block]);
        }
        let limit = missing.min(self.ctx.poll.batch_limit.max(1));
        self.ctx.client.get_blocks(&endpoint, gap.from, limit).await
    }
}

#[async_trait]
impl Poller for UpdatePoller {
    fn name(&self) -> &'static str {
        "update"
    }

    fn interval(&self) -> Duration {
        self.ctx.poll.update_tick()
    }

    async fn tick(&mut self) {
        let Some((node, gap)) = self.next_target() else {
            return;
        };

        let Some(mut blocks) = self.fetch(&node, gap).await else {
            debug!(
                "[UPDATE] No blocks above {} from {}:{}",
                gap.from, node.ip, node.port
            );
            return;
        };
        blocks.sort_by_key(|b| b.height);

        let rec = &self.ctx.reconciler;
        let mut walked: Option<Node> = None;
        let mut node_moved = false;
        let mut last_delegate: Option<Delegate> = None;

        for block in blocks.iter().filter(|b| b.height > gap.from) {
            let Some((moved, applied)) = rec.walk_block(&node.id, gap.epoch, block) else {
                warn!(
                    "[UPDATE] Node {} rolled back while fetching ({}, {}], dropping stale batch",
                    node.id, gap.from, gap.to
                );
                break;
            };
            if let Some(n) = moved {
                walked = Some(n);
            }
            node_moved |= applied.node.is_some();
            if applied.delegate.is_some() {
                last_delegate = applied.delegate;
            }
        }

        if walked.is_none() && !node_moved && last_delegate.is_none() {
            return;
        }

        // Broadcast the final state once per tick.
        let Some(current) = self.ctx.roster().node(&node.id) else {
            return;
        };
        if let Some(n) = &walked {
            info!(
                "[UPDATE] Node {} walked {} -> {:?} (tip {})",
                n.id, gap.from, n.lastest_height, gap.to
            );
            rec.events().emit(MonitorEvent::HeightUpdate(current.detail(None)));
        }
        if node_moved {
            rec.events().emit(MonitorEvent::NodeUpdate(current.detail(None)));
        }
        if let Some(d) = last_delegate {
            let d = self.ctx.roster().delegate(&d.public_key).unwrap_or(d);
            rec.events().emit(MonitorEvent::DelegateUpdate(d.detail()));
        }
    }
}
