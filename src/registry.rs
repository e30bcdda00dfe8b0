//! Administrative operations on the monitored set: nodes, delegates, alert
//! recipients and the stall watcher switch.
//!
//! Additions are persisted first, then applied to the roster. Removals leave
//! the roster first, so no poller can write a record back after it has been
//! deleted from the store. Both are announced to subscribers last.

use std::sync::Arc;
use tracing::info;

use crate::alert::StallWatcher;
use crate::error::{MonitorError, Result};
use crate::events::MonitorEvent;
use crate::reconcile::Reconciler;
use crate::types::{
    CreateDelegate, CreateMail, CreateNode, Delegate, DelegateDetail, MailRecipient, Node,
    NodeDetail, NodeStatus,
};

#[derive(Clone)]
pub struct Registry {
    reconciler: Reconciler,
    watcher: Arc<StallWatcher>,
}

impl Registry {
    pub fn new(reconciler: Reconciler, watcher: Arc<StallWatcher>) -> Self {
        Self {
            reconciler,
            watcher,
        }
    }

    /// Register every persisted node and delegate, in store order.
    pub fn load(&self) -> Result<(usize, usize)> {
        let store = self.reconciler.store();
        let roster = self.reconciler.roster();
        let nodes = store.all_nodes()?;
        let delegates = store.all_delegates()?;

        let node_count = nodes.into_iter().filter(|n| roster.add_node(n.clone())).count();
        let mut delegate_count = 0;
        for delegate in delegates {
            if !roster.has_node(&delegate.node_id) {
                tracing::warn!(
                    "[REGISTRY] Skipping delegate {} of unknown node {}",
                    delegate.public_key,
                    delegate.node_id
                );
                continue;
            }
            if roster.add_delegate(delegate) {
                delegate_count += 1;
            }
        }
        info!(
            "[REGISTRY] Loaded {} nodes and {} delegates",
            node_count, delegate_count
        );
        Ok((node_count, delegate_count))
    }

    pub fn add_node(&self, req: CreateNode) -> Result<String> {
        let ip = req.ip.trim();
        if ip.is_empty() {
            return Err(MonitorError::InvalidRequest("ip must not be empty".into()));
        }
        let roster = self.reconciler.roster();
        if roster.has_endpoint(ip, req.port) {
            return Err(MonitorError::DuplicateNode(format!("{}:{}", ip, req.port)));
        }

        let mut node = Node::new(uuid::Uuid::new_v4().to_string(), ip, req.port);
        node.name = req.name;
        node.node_type = req.node_type.into();
        node.status = NodeStatus::Unknown;

        self.reconciler.store().save_node(&node)?;
        roster.add_node(node.clone());
        info!("[REGISTRY] Added node {} at {}:{}", node.id, node.ip, node.port);
        self.reconciler
            .events()
            .emit(MonitorEvent::NodeAdded(node.id.clone()));
        Ok(node.id)
    }

    pub fn get_node(&self, id: &str, with_delegates: bool) -> Result<NodeDetail> {
        let roster = self.reconciler.roster();
        let node = roster
            .node(id)
            .ok_or_else(|| MonitorError::NodeNotFound(id.to_string()))?;
        Ok(if with_delegates {
            node.detail(Some(&roster.delegates_of(id)))
        } else {
            node.detail(None)
        })
    }

    pub fn all_nodes(&self, with_delegates: bool) -> Vec<NodeDetail> {
        let roster = self.reconciler.roster();
        roster
            .nodes()
            .iter()
            .map(|n| {
                if with_delegates {
                    n.detail(Some(&roster.delegates_of(&n.id)))
                } else {
                    n.detail(None)
                }
            })
            .collect()
    }

    /// Remove a node together with all of its delegates.
    pub fn del_node(&self, id: &str) -> Result<NodeDetail> {
        let roster = self.reconciler.roster();
        let store = self.reconciler.store();
        let (node, delegates) = roster
            .del_node(id)
            .ok_or_else(|| MonitorError::NodeNotFound(id.to_string()))?;
        for delegate in &delegates {
            store.delete_delegate(&delegate.public_key)?;
        }
        store.delete_node(id)?;

        info!(
            "[REGISTRY] Removed node {} and {} delegates",
            node.id,
            delegates.len()
        );
        self.reconciler
            .events()
            .emit(MonitorEvent::NodeRemoved(node.id.clone()));
        Ok(node.detail(Some(&delegates)))
    }

    pub fn add_delegate(&self, req: CreateDelegate) -> Result<String> {
        let public_key = req.public_key.trim();
        if public_key.is_empty() {
            return Err(MonitorError::InvalidRequest(
                "publicKey must not be empty".into(),
            ));
        }
        let roster = self.reconciler.roster();
        if !roster.has_node(&req.id) {
            return Err(MonitorError::NodeNotFound(req.id));
        }
        if roster.has_delegate(public_key) {
            return Err(MonitorError::DuplicateDelegate(public_key.to_string()));
        }

        let delegate = Delegate::new(req.id, public_key, req.name);
        self.reconciler.store().save_delegate(&delegate)?;
        roster.add_delegate(delegate.clone());
        info!(
            "[REGISTRY] Added delegate {} to node {}",
            delegate.public_key, delegate.node_id
        );
        self.reconciler
            .events()
            .emit(MonitorEvent::DelegateAdded(delegate.public_key.clone()));
        Ok(delegate.public_key)
    }

    pub fn get_delegate(&self, public_key: &str) -> Result<DelegateDetail> {
        self.reconciler
            .roster()
            .delegate(public_key)
            .map(|d| d.detail())
            .ok_or_else(|| MonitorError::DelegateNotFound(public_key.to_string()))
    }

    pub fn all_delegates(&self) -> Vec<DelegateDetail> {
        self.reconciler
            .roster()
            .delegates()
            .iter()
            .map(Delegate::detail)
            .collect()
    }

    /// Remove a delegate and recompute its node's best block.
    pub fn del_delegate(&self, public_key: &str) -> Result<DelegateDetail> {
        let delegate = self
            .reconciler
            .roster()
            .del_delegate(public_key)
            .ok_or_else(|| MonitorError::DelegateNotFound(public_key.to_string()))?;
        self.reconciler.store().delete_delegate(public_key)?;

        self.reconciler.refresh_node_best(&delegate.node_id);
        info!(
            "[REGISTRY] Removed delegate {} from node {}",
            delegate.public_key, delegate.node_id
        );
        self.reconciler
            .events()
            .emit(MonitorEvent::DelegateRemoved(delegate.public_key.clone()));
        Ok(delegate.detail())
    }

    pub fn add_mail(&self, req: CreateMail) -> Result<MailRecipient> {
        let address = req.address.trim();
        if !address.contains('@') {
            return Err(MonitorError::InvalidRequest(format!(
                "not a mail address: {address}"
            )));
        }
        let mail = MailRecipient {
            id: uuid::Uuid::new_v4().to_string(),
            name: req.name,
            address: address.to_string(),
        };
        self.reconciler.store().save_mail(&mail)?;
        Ok(mail)
    }

    pub fn del_mail(&self, id: &str) -> Result<()> {
        if self.reconciler.store().delete_mail(id)? {
            Ok(())
        } else {
            Err(MonitorError::MailNotFound(id.to_string()))
        }
    }

    pub fn all_mails(&self) -> Result<Vec<MailRecipient>> {
        self.reconciler.store().all_mails()
    }

    pub fn start_watcher(&self) -> bool {
        self.watcher.start()
    }

    pub fn stop_watcher(&self) -> bool {
        self.watcher.stop()
    }

    pub fn watcher_running(&self) -> bool {
        self.watcher.is_running()
    }
}
