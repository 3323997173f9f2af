//! Error taxonomy.
//!
//! Store failures are structural and propagate to whoever called `play()`.
//! Scheduler failures are absorbed per id inside a session and only ever
//! show up in logs.

use thiserror::Error;

use crate::vocab::NodeId;

/// Failures reported by the [`crate::Store`] collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("node {0} is its own ancestor")]
    Cycle(NodeId),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Failures reported by the [`crate::Scheduler`] collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("no audio source for node {0}")]
    NoSource(NodeId),

    #[error("scheduler rejected node {node}: {reason}")]
    Rejected { node: NodeId, reason: String },
}

/// Failures that end a playback session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A node reappeared below itself while descending the tree.
    #[error("cyclic composition: {node} is nested inside itself")]
    Cycle { node: NodeId },
}
