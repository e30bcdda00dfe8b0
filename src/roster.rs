//! In-memory roster of monitored nodes and delegates, plus the per-node
//! staleness cache the pollers use to throttle remote calls.
//!
//! The roster is the authoritative runtime view. Readers are scheduler
//! ticks; writers are the administrative add/remove paths and the
//! reconciliation writes. No lock is ever held across an await: callers
//! take snapshots or run short closures under the lock.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::{Delegate, Node};

/// Which throttle clock a poll uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Height,
    Status,
    Update,
}

/// Per-node transient state. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    /// Last tip height the node reported.
    pub height: Option<u64>,
    pub height_timestamp: u64,
    pub status_timestamp: u64,
    pub update_timestamp: u64,
    /// Bumped on every detected rollback. Work started under an older epoch
    /// must not be applied.
    pub epoch: u64,
}

impl CacheEntry {
    fn stamp_mut(&mut self, kind: PollKind) -> &mut u64 {
        match kind {
            PollKind::Height => &mut self.height_timestamp,
            PollKind::Status => &mut self.status_timestamp,
            PollKind::Update => &mut self.update_timestamp,
        }
    }
}

#[derive(Debug, Default)]
struct RosterInner {
    nodes: Vec<Node>,
    delegates: Vec<Delegate>,
    cache: HashMap<String, CacheEntry>,
}

#[derive(Debug, Default)]
pub struct Roster {
    inner: RwLock<RosterInner>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Returns false if one with the same id exists.
    pub fn add_node(&self, node: Node) -> bool {
        let mut g = self.inner.write();
        if g.nodes.iter().any(|n| n.id == node.id) {
            return false;
        }
        g.cache.insert(node.id.clone(), CacheEntry::default());
        g.nodes.push(node);
        true
    }

    /// Unregister a node, its cache entry and all of its delegates.
    pub fn del_node(&self, node_id: &str) -> Option<(Node, Vec<Delegate>)> {
        let mut g = self.inner.write();
        let idx = g.nodes.iter().position(|n| n.id == node_id)?;
        let node = g.nodes.remove(idx);
        g.cache.remove(node_id);
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut g.delegates)
            .into_iter()
            .partition(|d| d.node_id == node_id);
        g.delegates = kept;
        Some((node, removed))
    }

    /// Register a delegate. Returns false if its public key is already known.
    pub fn add_delegate(&self, delegate: Delegate) -> bool {
        let mut g = self.inner.write();
        if g.delegates.iter().any(|d| d.public_key == delegate.public_key) {
            return false;
        }
        g.delegates.push(delegate);
        true
    }

    pub fn del_delegate(&self, public_key: &str) -> Option<Delegate> {
        let mut g = self.inner.write();
        let idx = g.delegates.iter().position(|d| d.public_key == public_key)?;
        Some(g.delegates.remove(idx))
    }

    pub fn has_node(&self, node_id: &str) -> bool {
        self.inner.read().nodes.iter().any(|n| n.id == node_id)
    }

    pub fn has_delegate(&self, public_key: &str) -> bool {
        self.inner
            .read()
            .delegates
            .iter()
            .any(|d| d.public_key == public_key)
    }

    pub fn has_endpoint(&self, ip: &str, port: u16) -> bool {
        self.inner
            .read()
            .nodes
            .iter()
            .any(|n| n.ip == ip && n.port == port)
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn node(&self, node_id: &str) -> Option<Node> {
        self.inner.read().nodes.iter().find(|n| n.id == node_id).cloned()
    }

    pub fn node_at(&self, idx: usize) -> Option<Node> {
        self.inner.read().nodes.get(idx).cloned()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.inner.read().nodes.clone()
    }

    pub fn delegate(&self, public_key: &str) -> Option<Delegate> {
        self.inner
            .read()
            .delegates
            .iter()
            .find(|d| d.public_key == public_key)
            .cloned()
    }

    pub fn delegates(&self) -> Vec<Delegate> {
        self.inner.read().delegates.clone()
    }

    /// Delegates of one node, in registration order.
    pub fn delegates_of(&self, node_id: &str) -> Vec<Delegate> {
        self.inner
            .read()
            .delegates
            .iter()
            .filter(|d| d.node_id == node_id)
            .cloned()
            .collect()
    }

    /// Delegates still waiting for their first attributed block.
    pub fn uninitialized_delegates(&self) -> Vec<Delegate> {
        self.inner
            .read()
            .delegates
            .iter()
            .filter(|d| d.block.is_none())
            .cloned()
            .collect()
    }

    /// First seed-type node in roster order.
    pub fn seed_node(&self) -> Option<Node> {
        self.inner
            .read()
            .nodes
            .iter()
            .find(|n| n.node_type == crate::types::NodeType::Seed)
            .cloned()
    }

    /// Mutate a node in place; returns the closure's result and a copy of the
    /// node after mutation.
    pub fn update_node<R>(&self, node_id: &str, f: impl FnOnce(&mut Node) -> R) -> Option<(R, Node)> {
        let mut g = self.inner.write();
        let node = g.nodes.iter_mut().find(|n| n.id == node_id)?;
        let r = f(node);
        Some((r, node.clone()))
    }

    pub fn update_delegate<R>(
        &self,
        public_key: &str,
        f: impl FnOnce(&mut Delegate) -> R,
    ) -> Option<(R, Delegate)> {
        let mut g = self.inner.write();
        let delegate = g.delegates.iter_mut().find(|d| d.public_key == public_key)?;
        let r = f(delegate);
        Some((r, delegate.clone()))
    }

    /// Run `f` over every delegate of a node; returns the delegates after.
    pub fn update_delegates_of(&self, node_id: &str, mut f: impl FnMut(&mut Delegate)) -> Vec<Delegate> {
        let mut g = self.inner.write();
        g.delegates
            .iter_mut()
            .filter(|d| d.node_id == node_id)
            .map(|d| {
                f(d);
                d.clone()
            })
            .collect()
    }

    pub fn cache(&self, node_id: &str) -> Option<CacheEntry> {
        self.inner.read().cache.get(node_id).cloned()
    }

    pub fn set_cache_height(&self, node_id: &str, height: u64) -> Option<Option<u64>> {
        let mut g = self.inner.write();
        let entry = g.cache.get_mut(node_id)?;
        Some(entry.height.replace(height))
    }

    pub fn epoch(&self, node_id: &str) -> Option<u64> {
        self.inner.read().cache.get(node_id).map(|c| c.epoch)
    }

    pub fn bump_epoch(&self, node_id: &str) -> Option<u64> {
        let mut g = self.inner.write();
        let entry = g.cache.get_mut(node_id)?;
        entry.epoch += 1;
        Some(entry.epoch)
    }

    /// Take the `kind` poll slot for a node if its window has elapsed.
    ///
    /// Check and stamp happen under one write lock, so two concurrent callers
    /// cannot both win the same slot.
    pub fn claim(&self, node_id: &str, kind: PollKind, now_ms: u64, window_ms: u64) -> bool {
        let mut g = self.inner.write();
        let Some(entry) = g.cache.get_mut(node_id) else {
            return false;
        };
        let stamp = entry.stamp_mut(kind);
        if now_ms.saturating_sub(*stamp) <= window_ms && *stamp != 0 {
            return false;
        }
        *stamp = now_ms;
        true
    }
}

/// Round-robin position over a list whose length may change between ticks.
#[derive(Debug, Default, Clone)]
pub struct RoundRobin {
    counter: u64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index to visit this tick, or `None` when the list is empty.
    pub fn next_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let idx = (self.counter % len as u64) as usize;
        self.counter = self.counter.wrapping_add(1);
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;

    fn node(id: &str) -> Node {
        Node::new(id, "10.0.0.1", 4096)
    }

    #[test]
    fn add_node_is_idempotent_and_seeds_cache() {
        let roster = Roster::new();
        assert!(roster.add_node(node("a")));
        assert!(!roster.add_node(node("a")));
        assert_eq!(roster.node_count(), 1);
        assert_eq!(roster.cache("a"), Some(CacheEntry::default()));
    }

    #[test]
    fn del_node_cascades_to_delegates_and_cache() {
        let roster = Roster::new();
        roster.add_node(node("a"));
        roster.add_node(node("b"));
        roster.add_delegate(Delegate::new("a", "pk1", "d1"));
        roster.add_delegate(Delegate::new("b", "pk2", "d2"));
        roster.add_delegate(Delegate::new("a", "pk3", "d3"));

        let (removed, delegates) = roster.del_node("a").unwrap();
        assert_eq!(removed.id, "a");
        assert_eq!(delegates.len(), 2);
        assert!(roster.cache("a").is_none());
        assert!(!roster.has_delegate("pk1"));
        assert!(roster.has_delegate("pk2"));
        assert!(roster.del_node("a").is_none());
    }

    #[test]
    fn delegates_unique_by_public_key() {
        let roster = Roster::new();
        roster.add_node(node("a"));
        assert!(roster.add_delegate(Delegate::new("a", "pk", "one")));
        assert!(!roster.add_delegate(Delegate::new("a", "pk", "two")));
        assert!(roster.del_delegate("pk").is_some());
        assert!(roster.del_delegate("pk").is_none());
    }

    #[test]
    fn claim_respects_window_per_kind() {
        let roster = Roster::new();
        roster.add_node(node("a"));

        assert!(roster.claim("a", PollKind::Height, 10_000, 1_000));
        assert!(!roster.claim("a", PollKind::Height, 10_500, 1_000));
        assert!(!roster.claim("a", PollKind::Height, 11_000, 1_000));
        assert!(roster.claim("a", PollKind::Height, 11_001, 1_000));
        // independent clocks
        assert!(roster.claim("a", PollKind::Status, 10_500, 1_000));
        assert!(!roster.claim("missing", PollKind::Height, 10_000, 1_000));
    }

    #[test]
    fn epoch_only_moves_on_bump() {
        let roster = Roster::new();
        roster.add_node(node("a"));
        assert_eq!(roster.epoch("a"), Some(0));
        roster.set_cache_height("a", 10);
        assert_eq!(roster.epoch("a"), Some(0));
        assert_eq!(roster.bump_epoch("a"), Some(1));
        assert_eq!(roster.epoch("a"), Some(1));
        assert_eq!(roster.bump_epoch("missing"), None);
    }

    #[test]
    fn round_robin_is_fair_and_stable() {
        let mut rr = RoundRobin::new();
        let visits: Vec<usize> = (0..9).filter_map(|_| rr.next_index(3)).collect();
        assert_eq!(visits, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
        assert_eq!(rr.next_index(0), None);
    }

    #[test]
    fn seed_node_is_first_seed_in_order() {
        let roster = Roster::new();
        let mut a = node("a");
        a.node_type = NodeType::Gpu;
        let mut b = node("b");
        b.node_type = NodeType::Seed;
        let mut c = node("c");
        c.node_type = NodeType::Seed;
        roster.add_node(a);
        roster.add_node(b);
        roster.add_node(c);
        assert_eq!(roster.seed_node().map(|n| n.id), Some("b".to_string()));
    }
}
