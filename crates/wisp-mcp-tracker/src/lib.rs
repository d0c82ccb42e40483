//! # Tracker
//!
//! Cluster-aware lookup of the processes behind MCP sessions. Three topics:
//!
//! - **sessions**: key is the session id; at most one live owner per key
//!   cluster-wide.
//! - **requests**: key is a JSON-RPC request id, used to correlate URL
//!   elicitation callbacks arriving on any node.
//! - **resources**: key is a resource URI; many subscriber entries per key.
//!
//! Entries pair a [`SessionHandle`] with JSON metadata. Lookups skip and
//! proactively untrack dead entries. Join/leave diffs replicate through an
//! optional [`PubSub`] substrate; without one the tracker is local-only and
//! distribution-dependent operations return [`TrackerError::NotAvailable`].

pub mod pubsub;
pub mod tracker;

pub use pubsub::{LocalPubSub, PubSub, TrackerDiff};
pub use tracker::{SessionHandle, Topic, Tracker};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// No pub/sub substrate configured; the operation needs distribution
    #[error("tracker is local-only; no pub/sub substrate configured")]
    NotAvailable,

    /// A live entry already owns this key (one stream owner per session)
    #[error("key already tracked: {0}")]
    AlreadyTracked(String),

    #[error("key not tracked: {0}")]
    NotFound(String),

    #[error("substrate error: {0}")]
    Substrate(String),
}
