//! Persistence gateway for node, delegate and mail recipient records.
//!
//! Storage format:
//!   Tree "nodes":     key = node id,              value = JSON `Node`
//!   Tree "delegates": key = delegate public key,  value = JSON `Delegate`
//!   Tree "mails":     key = recipient id,         value = JSON `MailRecipient`
//!
//! The in-memory roster is authoritative at runtime; the store is a
//! durability mirror written on every state change.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{Delegate, MailRecipient, Node};

const NODES_TREE: &str = "nodes";
const DELEGATES_TREE: &str = "delegates";
const MAILS_TREE: &str = "mails";

pub trait RecordStore: Send + Sync {
    fn all_nodes(&self) -> Result<Vec<Node>>;
    fn save_node(&self, node: &Node) -> Result<()>;
    fn delete_node(&self, node_id: &str) -> Result<bool>;

    fn all_delegates(&self) -> Result<Vec<Delegate>>;
    fn save_delegate(&self, delegate: &Delegate) -> Result<()>;
    fn delete_delegate(&self, public_key: &str) -> Result<bool>;

    fn all_mails(&self) -> Result<Vec<MailRecipient>>;
    fn save_mail(&self, mail: &MailRecipient) -> Result<()>;
    fn delete_mail(&self, id: &str) -> Result<bool>;
}

/// Store backed by sled trees.
pub struct SledStore {
    nodes: sled::Tree,
    delegates: sled::Tree,
    mails: sled::Tree,
}

impl SledStore {
    pub fn new(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            nodes: db.open_tree(NODES_TREE)?,
            delegates: db.open_tree(DELEGATES_TREE)?,
            mails: db.open_tree(MAILS_TREE)?,
        })
    }

    /// Open (or create) the database directory.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::new(&db)
    }

    /// Throwaway store, dropped with the process.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::new(&db)
    }

    pub fn flush(&self) -> Result<()> {
        self.nodes.flush()?;
        Ok(())
    }

    fn put<T: Serialize>(tree: &sled::Tree, key: &str, value: &T) -> Result<()> {
        let val = serde_json::to_vec(value)?;
        tree.insert(key.as_bytes(), val)?;
        Ok(())
    }

    /// Entries that no longer decode are skipped with a warning.
    fn scan<T: DeserializeOwned>(tree: &sled::Tree) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for kv in tree.iter() {
            let (k, v) = kv?;
            match serde_json::from_slice(&v) {
                Ok(item) => out.push(item),
                Err(e) => warn!(
                    "[STORE] Skipping undecodable record {}: {}",
                    String::from_utf8_lossy(&k),
                    e
                ),
            }
        }
        Ok(out)
    }

    fn remove(tree: &sled::Tree, key: &str) -> Result<bool> {
        Ok(tree.remove(key.as_bytes())?.is_some())
    }
}

impl RecordStore for SledStore {
    fn all_nodes(&self) -> Result<Vec<Node>> {
        Self::scan(&self.nodes)
    }

    fn save_node(&self, node: &Node) -> Result<()> {
        Self::put(&self.nodes, &node.id, node)?;
        debug!("[STORE] Saved node {}", node.id);
        Ok(())
    }

    fn delete_node(&self, node_id: &str) -> Result<bool> {
        Self::remove(&self.nodes, node_id)
    }

    fn all_delegates(&self) -> Result<Vec<Delegate>> {
        Self::scan(&self.delegates)
    }

    fn save_delegate(&self, delegate: &Delegate) -> Result<()> {
        Self::put(&self.delegates, &delegate.public_key, delegate)?;
        debug!("[STORE] Saved delegate {}", delegate.public_key);
        Ok(())
    }

    fn delete_delegate(&self, public_key: &str) -> Result<bool> {
        Self::remove(&self.delegates, public_key)
    }

    fn all_mails(&self) -> Result<Vec<MailRecipient>> {
        Self::scan(&self.mails)
    }

    fn save_mail(&self, mail: &MailRecipient) -> Result<()> {
        Self::put(&self.mails, &mail.id, mail)
    }

    fn delete_mail(&self, id: &str) -> Result<bool> {
        Self::remove(&self.mails, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_roundtrips_through_sled() {
        let store = SledStore::temporary().unwrap();
        let mut node = Node::new("n1", "10.0.0.1", 4096);
        node.lastest_height = Some(42);
        store.save_node(&node).unwrap();

        let all = store.all_nodes().unwrap();
        assert_eq!(all, vec![node]);
        assert!(store.delete_node("n1").unwrap());
        assert!(!store.delete_node("n1").unwrap());
        assert!(store.all_nodes().unwrap().is_empty());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store
                .save_delegate(&Delegate::new("n1", "pk", "alpha"))
                .unwrap();
            store
                .save_mail(&MailRecipient {
                    id: "m1".into(),
                    name: "ops".into(),
                    address: "ops@example.com".into(),
                })
                .unwrap();
            store.flush().unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.all_delegates().unwrap()[0].public_key, "pk");
        assert_eq!(store.all_mails().unwrap()[0].address, "ops@example.com");
    }
}
