use thiserror::Error;

/// Errors surfaced by the monitor's administrative and storage paths.
///
/// Remote chain failures never show up here: the chain client collapses
/// them to "no data" and the next scheduler tick retries.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("chainnode {0} is already registered")]
    DuplicateNode(String),

    #[error("no chainnode exists with id({0})")]
    NodeNotFound(String),

    #[error("delegate {0} is already registered")]
    DuplicateDelegate(String),

    #[error("no delegate exists with publicKey({0})")]
    DelegateNotFound(String),

    #[error("no mail recipient exists with id({0})")]
    MailNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Store(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
