use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PollContext, Poller};
use crate::reconcile::HeightObservation;
use crate::roster::{PollKind, RoundRobin};
use crate::types::Node;

/// Polls each node's tip height in turn.
pub struct HeightPoller {
    ctx: PollContext,
    cursor: RoundRobin,
}

impl HeightPoller {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx,
            cursor: RoundRobin::new(),
        }
    }

    /// Pick this tick's node and take its height slot.
    fn next_target(&mut self) -> Option<Node> {
        let roster = self.ctx.roster();
        let idx = self.cursor.next_index(roster.node_count())?;
        let node = roster.node_at(idx)?;
        let now = self.ctx.now_ms();
        if !roster.claim(&node.id, PollKind::Height, now, self.ctx.poll.height_window_ms) {
            return None;
        }
        Some(node)
    }
}

#[async_trait]
impl Poller for HeightPoller {
    fn name(&self) -> &'static str {
        "height"
    }

    fn interval(&self) -> Duration {
        self.ctx.poll.height_tick()
    }

    async fn tick(&mut self) {
        let Some(node) = self.next_target() else {
            return;
        };

        let Some(observed) = self.ctx.client.get_height(&node.endpoint()).await else {
            debug!("[HEIGHT] No height from {}:{}", node.ip, node.port);
            return;
        };

        match self.ctx.reconciler.observe_height(&node.id, observed) {
            HeightObservation::Seeded => info!(
                "[HEIGHT] Node {} ({}:{}) first seen at height {}",
                node.id, node.ip, node.port, observed
            ),
            HeightObservation::Rollback => warn!(
                "[HEIGHT] Node {} ({}:{}) rolled back to {}",
                node.id, node.ip, node.port, observed
            ),
            HeightObservation::Advanced => {
                debug!("[HEIGHT] Node {} tip now {}", node.id, observed)
            }
            HeightObservation::Unchanged | HeightObservation::Unknown => {}
        }
    }
}
