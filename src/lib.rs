//! Chain node monitor.
//!
//! Polls a set of remote chain nodes for their tip height, sync status and
//! produced blocks, attributes blocks to registered delegates, detects
//! rollbacks and raises escalating alerts when block production stalls.

pub mod alert;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod mail;
pub mod reconcile;
pub mod registry;
pub mod roster;
pub mod scheduler;
pub mod store;
pub mod types;

pub use error::{MonitorError, Result};
