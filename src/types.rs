//! Records kept for every monitored chain node and delegate, plus the
//! projections handed to subscribers and API callers.

use serde::{Deserialize, Serialize};

/// Role a node plays in the monitored network. Stored and shown as its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum NodeType {
    Gpu,
    Seed,
    Wallet,
    Undefined,
}

impl From<i32> for NodeType {
    fn from(v: i32) -> Self {
        match v {
            0 => NodeType::Gpu,
            1 => NodeType::Seed,
            2 => NodeType::Wallet,
            _ => NodeType::Undefined,
        }
    }
}

impl From<NodeType> for i32 {
    fn from(t: NodeType) -> Self {
        match t {
            NodeType::Gpu => 0,
            NodeType::Seed => 1,
            NodeType::Wallet => 2,
            NodeType::Undefined => -1,
        }
    }
}

/// Sync state reported by `/api/loader/status/sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum NodeStatus {
    Unknown,
    Synced,
    Syncing,
}

impl NodeStatus {
    pub fn from_syncing(syncing: bool) -> Self {
        if syncing {
            NodeStatus::Syncing
        } else {
            NodeStatus::Synced
        }
    }
}

impl From<i32> for NodeStatus {
    fn from(v: i32) -> Self {
        match v {
            0 => NodeStatus::Synced,
            1 => NodeStatus::Syncing,
            _ => NodeStatus::Unknown,
        }
    }
}

impl From<NodeStatus> for i32 {
    fn from(s: NodeStatus) -> Self {
        match s {
            NodeStatus::Unknown => -1,
            NodeStatus::Synced => 0,
            NodeStatus::Syncing => 1,
        }
    }
}

/// Where a node's HTTP API lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeEndpoint {
    pub ip: String,
    pub port: u16,
}

impl NodeEndpoint {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

/// A block as returned by a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub height: u64,
    pub timestamp: u64,
    pub generator_public_key: String,
    pub generator_id: String,
}

/// The most recent block attributed to a node or delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedBlock {
    pub id: String,
    pub height: u64,
    /// Chain timestamp, seconds since genesis.
    pub timestamp: u64,
    /// Wall-clock milliseconds since the Unix epoch.
    pub date: i64,
    pub generator_public_key: String,
    pub generator_address: String,
}

impl ProducedBlock {
    pub fn from_block(block: &Block, genesis_ms: i64) -> Self {
        Self {
            id: block.id.clone(),
            height: block.height,
            timestamp: block.timestamp,
            date: block_date(genesis_ms, block.timestamp),
            generator_public_key: block.generator_public_key.clone(),
            generator_address: block.generator_id.clone(),
        }
    }
}

pub fn block_date(genesis_ms: i64, timestamp: u64) -> i64 {
    genesis_ms.saturating_add((timestamp as i64).saturating_mul(1000))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub ip: String,
    pub port: u16,
    pub name: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    /// Highest block height walked by the catch-up poller. `None` until the
    /// first height observation seeds it.
    pub lastest_height: Option<u64>,
    pub block: Option<ProducedBlock>,
}

impl Node {
    pub fn new(id: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            ip: ip.into(),
            port,
            name: String::new(),
            node_type: NodeType::Undefined,
            status: NodeStatus::Unknown,
            lastest_height: None,
            block: None,
        }
    }

    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint {
            ip: self.ip.clone(),
            port: self.port,
        }
    }

    pub fn block_height(&self) -> Option<u64> {
        self.block.as_ref().map(|b| b.height)
    }

    pub fn detail(&self, delegates: Option<&[Delegate]>) -> NodeDetail {
        let b = self.block.as_ref();
        NodeDetail {
            id: self.id.clone(),
            ip: self.ip.clone(),
            port: self.port,
            name: self.name.clone(),
            node_type: self.node_type.into(),
            status: self.status.into(),
            lastest_height: self.lastest_height,
            block_id: b.map(|b| b.id.clone()),
            block_height: b.map(|b| b.height),
            block_timestamp: b.map(|b| b.timestamp),
            block_date: b.map(|b| b.date),
            generator_public_key: b.map(|b| b.generator_public_key.clone()),
            generator_address: b.map(|b| b.generator_address.clone()),
            delegates: delegates.map(|ds| ds.iter().map(Delegate::detail).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    /// Owning node.
    pub node_id: String,
    pub public_key: String,
    pub name: String,
    pub address: Option<String>,
    /// `None` until a block is attributed, and again after a rollback.
    pub block: Option<ProducedBlock>,
}

impl Delegate {
    pub fn new(
        node_id: impl Into<String>,
        public_key: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            public_key: public_key.into(),
            name: name.into(),
            address: None,
            block: None,
        }
    }

    pub fn block_height(&self) -> Option<u64> {
        self.block.as_ref().map(|b| b.height)
    }

    pub fn detail(&self) -> DelegateDetail {
        let b = self.block.as_ref();
        DelegateDetail {
            id: self.node_id.clone(),
            name: self.name.clone(),
            public_key: self.public_key.clone(),
            address: self.address.clone(),
            block_id: b.map(|b| b.id.clone()),
            block_height: b.map(|b| b.height),
            block_timestamp: b.map(|b| b.timestamp),
            block_date: b.map(|b| b.date),
        }
    }
}

/// Node as seen by subscribers and API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    pub id: String,
    pub ip: String,
    pub port: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: i32,
    pub status: i32,
    pub lastest_height: Option<u64>,
    pub block_id: Option<String>,
    pub block_height: Option<u64>,
    pub block_timestamp: Option<u64>,
    pub block_date: Option<i64>,
    pub generator_public_key: Option<String>,
    pub generator_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delegates: Option<Vec<DelegateDetail>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateDetail {
    /// Owning node id.
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub address: Option<String>,
    pub block_id: Option<String>,
    pub block_height: Option<u64>,
    pub block_timestamp: Option<u64>,
    pub block_date: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailRecipient {
    pub id: String,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNode {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "undefined_type")]
    pub node_type: i32,
}

fn undefined_type() -> i32 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDelegate {
    /// Owning node id.
    pub id: String,
    pub public_key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMail {
    #[serde(default)]
    pub name: String,
    pub address: String,
}
