//! Outbound calls to a monitored node's HTTP API.
//!
//! Every response is wrapped `{success: bool, ...}`. Transport failures,
//! timeouts, non-2xx statuses and `success: false` all collapse to `None`;
//! callers treat that as "no data this tick".

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ChainConfig;
use crate::types::{Block, NodeEndpoint};

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain tip height.
    async fn get_height(&self, node: &NodeEndpoint) -> Option<u64>;

    async fn get_block(&self, node: &NodeEndpoint, height: u64) -> Option<Block>;

    /// Blocks above `offset`, at most `limit` of them.
    async fn get_blocks(&self, node: &NodeEndpoint, offset: u64, limit: u64) -> Option<Vec<Block>>;

    /// Most recent block produced by `public_key`.
    async fn get_last_generated_block(&self, node: &NodeEndpoint, public_key: &str)
        -> Option<Block>;

    /// Whether the node reports itself as syncing.
    async fn get_sync_status(&self, node: &NodeEndpoint) -> Option<bool>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct HeightBody {
    height: u64,
}

#[derive(Debug, Deserialize)]
struct BlockBody {
    block: Block,
}

#[derive(Debug, Deserialize)]
struct BlocksBody {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct SyncBody {
    syncing: bool,
}

/// reqwest-backed client. Range requests get their own, longer timeout.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    http: Client,
    batch_http: Client,
}

impl HttpChainClient {
    pub fn new(cfg: &ChainConfig) -> reqwest::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()?;
        let batch_http = Client::builder()
            .timeout(Duration::from_millis(cfg.batch_timeout_ms))
            .build()?;
        Ok(Self { http, batch_http })
    }

    async fn fetch<T: DeserializeOwned>(
        client: &Client,
        node: &NodeEndpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Option<T> {
        let url = format!("{}{}", node.base_url(), path);
        let resp = match client.get(&url).query(query).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url = %url, error = %e, "chain request failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!(url = %url, status = %resp.status(), "chain request returned error status");
            return None;
        }

        let envelope: Envelope<T> = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(url = %url, error = %e, "chain response did not decode");
                return None;
            }
        };

        if !envelope.success {
            debug!(url = %url, error = ?envelope.error, "chain request unsuccessful");
            return None;
        }
        envelope.body
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn get_height(&self, node: &NodeEndpoint) -> Option<u64> {
        Self::fetch::<HeightBody>(&self.http, node, "/api/blocks/getHeight", &[])
            .await
            .map(|b| b.height)
    }

    async fn get_block(&self, node: &NodeEndpoint, height: u64) -> Option<Block> {
        Self::fetch::<BlockBody>(
            &self.http,
            node,
            "/api/blocks/get",
            &[("height", height.to_string())],
        )
        .await
        .map(|b| b.block)
    }

    async fn get_blocks(&self, node: &NodeEndpoint, offset: u64, limit: u64) -> Option<Vec<Block>> {
        Self::fetch::<BlocksBody>(
            &self.batch_http,
            node,
            "/api/blocks",
            &[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("orderBy", "height:asc".to_string()),
            ],
        )
        .await
        .map(|b| b.blocks)
    }

    async fn get_last_generated_block(
        &self,
        node: &NodeEndpoint,
        public_key: &str,
    ) -> Option<Block> {
        let body = Self::fetch::<BlocksBody>(
            &self.http,
            node,
            "/api/blocks",
            &[
                ("generatorPublicKey", public_key.to_string()),
                ("limit", "1".to_string()),
                ("orderBy", "height:desc".to_string()),
            ],
        )
        .await?;
        body.blocks.into_iter().next()
    }

    async fn get_sync_status(&self, node: &NodeEndpoint) -> Option<bool> {
        Self::fetch::<SyncBody>(&self.http, node, "/api/loader/status/sync", &[])
            .await
            .map(|b| b.syncing)
    }
}
