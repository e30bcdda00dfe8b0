//! Outbound alert mail.
//!
//! Two transports: [`RelayMailer`] hands the message to an HTTP mail relay,
//! [`LogMailer`] only writes it to the log. The report helpers build the
//! body of a stall alert from the current roster.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::config::MailConfig;
use crate::types::{Node, NodeType};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, html: &str) -> Result<()>;
}

/// Writes would-be mail to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipients: &[String], subject: &str, html: &str) -> Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }
        info!(
            "[MAIL] (log only) to={} subject={:?} body={}",
            recipients.join(","),
            subject,
            html
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

/// POSTs `{from, to, subject, html}` to a mail relay endpoint.
#[derive(Debug, Clone)]
pub struct RelayMailer {
    http: Client,
    endpoint: String,
    from: String,
}

impl RelayMailer {
    pub fn new(endpoint: impl Into<String>, from: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build mail relay client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, recipients: &[String], subject: &str, html: &str) -> Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }
        let payload = RelayPayload {
            from: &self.from,
            to: recipients,
            subject,
            html,
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("mail relay {} unreachable", self.endpoint))?;
        if !resp.status().is_success() {
            bail!("mail relay {} answered {}", self.endpoint, resp.status());
        }
        info!("[MAIL] Sent {:?} to {} recipients", subject, recipients.len());
        Ok(())
    }
}

/// Pick the transport from config: relay when configured, log otherwise.
pub fn from_config(cfg: &MailConfig) -> Result<Box<dyn Mailer>> {
    match cfg.relay_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Box::new(RelayMailer::new(
            url,
            cfg.from.clone(),
            Duration::from_millis(cfg.timeout_ms),
        )?)),
        _ => Ok(Box::new(LogMailer)),
    }
}

/// Broadcast text for a stall alert.
pub fn stall_message(minutes: u64, height: u64) -> String {
    format!("no block for {minutes} minutes at height {height}")
}

fn node_line(node: &Node) -> String {
    let height = node
        .lastest_height
        .map(|h| h.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let marker = if node.node_type == NodeType::Seed {
        " (seed)"
    } else {
        ""
    };
    format!("{}:{} height {}{}", node.name, node.ip, height, marker)
}

/// HTML body listing every node's walked height.
pub fn stall_report(minutes: u64, height: u64, nodes: &[Node]) -> String {
    let mut lines = vec![stall_message(minutes, height)];
    lines.extend(nodes.iter().map(node_line));
    lines.join("<br />")
}
