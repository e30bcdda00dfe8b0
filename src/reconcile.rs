//! Reconciliation of remote observations into the roster.
//!
//! All block writes go through [`apply_block`], which only ever moves an
//! entity forward, so late or duplicated deliveries are harmless. The one
//! exception is a detected rollback, which clears a node's attribution and
//! that of all its delegates.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::events::{Broadcaster, MonitorEvent};
use crate::roster::Roster;
use crate::store::RecordStore;
use crate::types::{Block, Delegate, Node, ProducedBlock};

/// Advance `slot` to `block` iff the block is strictly higher.
pub fn apply_block(slot: &mut Option<ProducedBlock>, block: &ProducedBlock) -> bool {
    match slot {
        Some(current) if current.height >= block.height => false,
        _ => {
            *slot = Some(block.clone());
            true
        }
    }
}

/// Highest block among a freshly observed one and the delegates' own.
///
/// The pending block is considered first, then delegates in roster order;
/// on equal heights the first one seen wins.
pub fn select_best<'a>(
    pending: Option<&'a ProducedBlock>,
    delegates: &'a [Delegate],
) -> Option<&'a ProducedBlock> {
    pending
        .into_iter()
        .chain(delegates.iter().filter_map(|d| d.block.as_ref()))
        .fold(None, |best: Option<&ProducedBlock>, cand| match best {
            Some(b) if b.height >= cand.height => Some(b),
            _ => Some(cand),
        })
}

/// What a height observation did to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightObservation {
    /// Same tip as last time.
    Unchanged,
    /// First observation; catch-up starts at the observed tip.
    Seeded,
    /// Tip moved forward; catch-up has a gap to fill.
    Advanced,
    /// Tip moved backwards; node and delegates were reset.
    Rollback,
    /// The node is no longer in the roster.
    Unknown,
}

/// Entities advanced by one block application.
#[derive(Debug, Default, Clone)]
pub struct Applied {
    pub node: Option<Node>,
    pub delegate: Option<Delegate>,
}

#[derive(Clone)]
pub struct Reconciler {
    roster: Arc<Roster>,
    store: Arc<dyn RecordStore>,
    events: Arc<dyn Broadcaster>,
    genesis_ms: i64,
    /// Held by height observations and by epoch-checked block writes, so a
    /// rollback never interleaves with a block walk.
    walk: Arc<Mutex<()>>,
}

impl Reconciler {
    pub fn new(
        roster: Arc<Roster>,
        store: Arc<dyn RecordStore>,
        events: Arc<dyn Broadcaster>,
        genesis_ms: i64,
    ) -> Self {
        Self {
            roster,
            store,
            events,
            genesis_ms,
            walk: Arc::new(Mutex::new(())),
        }
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<dyn Broadcaster> {
        &self.events
    }

    pub fn produced(&self, block: &Block) -> ProducedBlock {
        ProducedBlock::from_block(block, self.genesis_ms)
    }

    /// Fold a freshly observed tip height into the cache and the node.
    pub fn observe_height(&self, node_id: &str, observed: u64) -> HeightObservation {
        let _walk = self.walk.lock();
        let Some(cache) = self.roster.cache(node_id) else {
            return HeightObservation::Unknown;
        };
        if cache.height == Some(observed) {
            return HeightObservation::Unchanged;
        }

        let outcome = match cache.height {
            Some(cached) if observed < cached => {
                self.rollback(node_id, observed);
                HeightObservation::Rollback
            }
            _ => {
                let seeded = self.roster.update_node(node_id, |n| {
                    if n.lastest_height.is_none() {
                        n.lastest_height = observed.checked_sub(1);
                        true
                    } else {
                        false
                    }
                });
                match seeded {
                    Some((true, node)) => {
                        self.persist_node(&node);
                        HeightObservation::Seeded
                    }
                    Some((false, _)) => HeightObservation::Advanced,
                    None => return HeightObservation::Unknown,
                }
            }
        };

        self.roster.set_cache_height(node_id, observed);
        outcome
    }

    fn rollback(&self, node_id: &str, observed: u64) {
        let Some((previous, node)) = self.roster.update_node(node_id, |n| {
            let previous = n.lastest_height;
            n.lastest_height = observed.checked_sub(1);
            n.block = None;
            previous
        }) else {
            return;
        };
        self.roster.bump_epoch(node_id);

        warn!(
            "[HEIGHT] Rollback on node {} ({}:{}): tip fell to {}, walked height {:?} -> {:?}",
            node.id, node.ip, node.port, observed, previous, node.lastest_height
        );

        let mut reset = Vec::new();
        let delegates = self.roster.update_delegates_of(node_id, |d| {
            if d.block.take().is_some() {
                reset.push(d.public_key.clone());
            }
        });

        self.persist_node(&node);
        self.events.emit(MonitorEvent::HeightUpdate(node.detail(None)));
        self.events.emit(MonitorEvent::NodeUpdate(node.detail(None)));

        for delegate in delegates {
            self.persist_delegate(&delegate);
            if reset.contains(&delegate.public_key) {
                self.events.emit(MonitorEvent::DelegateUpdate(delegate.detail()));
            }
        }
    }

    /// Move a node's walked height forward. Returns the node if it moved.
    pub fn advance_latest(&self, node_id: &str, height: u64) -> Option<Node> {
        let (moved, node) = self.roster.update_node(node_id, |n| {
            if n.lastest_height.map_or(true, |h| h < height) {
                n.lastest_height = Some(height);
                true
            } else {
                false
            }
        })?;
        if !moved {
            return None;
        }
        self.persist_node(&node);
        Some(node)
    }

    /// Attribute `block` to the delegate that produced it (if it belongs to
    /// this node) and to the node's current best. Each side is written and
    /// persisted only if it advances. Nothing is broadcast here.
    pub fn apply_produced(&self, node_id: &str, block: &Block) -> Applied {
        let mut applied = Applied::default();
        let owned = self
            .roster
            .delegate(&block.generator_public_key)
            .is_some_and(|d| d.node_id == node_id);
        if !owned {
            return applied;
        }

        let produced = self.produced(block);

        if let Some((true, delegate)) =
            self.roster
                .update_delegate(&block.generator_public_key, |d| {
                    let moved = apply_block(&mut d.block, &produced);
                    if moved {
                        d.address = Some(produced.generator_address.clone());
                    }
                    moved
                })
        {
            self.persist_delegate(&delegate);
            applied.delegate = Some(delegate);
        }

        let delegates = self.roster.delegates_of(node_id);
        if let Some(best) = select_best(Some(&produced), &delegates).cloned() {
            if let Some((true, node)) = self
                .roster
                .update_node(node_id, |n| apply_block(&mut n.block, &best))
            {
                self.persist_node(&node);
                applied.node = Some(node);
            }
        }

        applied
    }

    /// Walk one fetched block: move the walked height to it and attribute
    /// it. Returns `None`, writing nothing, if the node rolled back since
    /// `epoch` was read.
    pub fn walk_block(&self, node_id: &str, epoch: u64, block: &Block) -> Option<(Option<Node>, Applied)> {
        let _walk = self.walk.lock();
        if self.roster.epoch(node_id) != Some(epoch) {
            debug!("[RECONCILE] Dropping block {} for node {}: epoch moved", block.height, node_id);
            return None;
        }
        let walked = self.advance_latest(node_id, block.height);
        Some((walked, self.apply_produced(node_id, block)))
    }

    /// [`Self::apply_produced`], unless the node rolled back since `epoch`.
    pub fn apply_produced_since(&self, node_id: &str, epoch: u64, block: &Block) -> Option<Applied> {
        let _walk = self.walk.lock();
        if self.roster.epoch(node_id) != Some(epoch) {
            debug!("[RECONCILE] Dropping block {} for node {}: epoch moved", block.height, node_id);
            return None;
        }
        Some(self.apply_produced(node_id, block))
    }

    /// Recompute a node's best block from its remaining delegates. When none
    /// of them holds a block, the node's attribution is cleared.
    pub fn refresh_node_best(&self, node_id: &str) {
        let delegates = self.roster.delegates_of(node_id);
        let best = select_best(None, &delegates).cloned();

        let changed = self.roster.update_node(node_id, |n| match &best {
            Some(b) => apply_block(&mut n.block, b),
            None => n.block.take().is_some(),
        });

        if let Some((true, node)) = changed {
            info!(
                "[RECONCILE] Node {} best block now {:?}",
                node.id,
                node.block_height()
            );
            self.persist_node(&node);
            self.events.emit(MonitorEvent::NodeUpdate(node.detail(None)));
        }
    }

    pub fn persist_node(&self, node: &Node) {
        if let Err(e) = self.store.save_node(node) {
            warn!("[STORE] Failed to persist node {}: {}", node.id, e);
        }
    }

    pub fn persist_delegate(&self, delegate: &Delegate) {
        if let Err(e) = self.store.save_delegate(delegate) {
            warn!(
                "[STORE] Failed to persist delegate {}: {}",
                delegate.public_key, e
            );
        }
    }
}
