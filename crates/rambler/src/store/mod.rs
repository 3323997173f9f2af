//! The node hierarchy and parameter store the player reads from.
//!
//! The store owns the composition. Navigators cache snapshots of it and
//! follow structural changes through [`PartsWatch`] receivers; parameter
//! changes arrive through [`ParameterSubscription`] handles.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::error::StoreError;
use crate::vocab::{NodeId, ParamKind, ParamValue, Relation};

/// Receiver carrying the current parts list of one node.
pub type PartsWatch = watch::Receiver<Vec<NodeId>>;

/// A parameter value changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterChange {
    /// Node the parameter belongs to; `None` for global parameters.
    pub owner: Option<NodeId>,
    pub kind: ParamKind,
    pub value: ParamValue,
}

/// Subscription to one parameter class, optionally narrowed to one owner.
///
/// Dropping the subscription removes the observer.
pub struct ParameterSubscription {
    rx: broadcast::Receiver<ParameterChange>,
    owner: Option<NodeId>,
    kind: ParamKind,
}

impl ParameterSubscription {
    pub fn new(
        rx: broadcast::Receiver<ParameterChange>,
        owner: Option<NodeId>,
        kind: ParamKind,
    ) -> Self {
        Self { rx, owner, kind }
    }

    /// Wait for the next matching change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<ParameterChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.matches(&change) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        param.kind = ?self.kind,
                        skipped,
                        "parameter subscriber lagged, changes dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}

    fn matches(&self, change: &ParameterChange) -> bool {
        change.kind == self.kind
            && (self.owner.is_none() || change.owner.as_ref() == self.owner.as_ref())
    }
}

/// Read side of the composition store.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Ordered child ids of `node`. Empty for a leaf.
    async fn find_parts(&self, node: &NodeId) -> Result<Vec<NodeId>, StoreError>;

    /// Subscribe to structural changes of `node`'s parts list.
    fn watch_parts(&self, node: &NodeId) -> Result<PartsWatch, StoreError>;

    async fn find_parameter_value(
        &self,
        node: &NodeId,
        kind: ParamKind,
    ) -> Result<Option<ParamValue>, StoreError>;

    /// Resolve an object-valued relation of a node or type id.
    async fn find_object(
        &self,
        subject: &str,
        relation: Relation,
    ) -> Result<Option<String>, StoreError>;

    /// Value held by a parameter object (see [`Relation::TypeParameter`]).
    async fn find_object_value(&self, object: &str) -> Result<Option<ParamValue>, StoreError>;

    /// Observe changes of one parameter class. `owner = None` observes every
    /// owner, including global parameters.
    fn observe_parameter(&self, owner: Option<&NodeId>, kind: ParamKind) -> ParameterSubscription;

    /// Every ancestor of `node`, nearest first.
    async fn find_all_parents(&self, node: &NodeId) -> Result<Vec<NodeId>, StoreError>;

    async fn find_similars(&self, node: &NodeId) -> Result<Vec<NodeId>, StoreError>;

    /// Directed successor edges from `node`.
    async fn find_successors(&self, node: &NodeId) -> Result<Vec<NodeId>, StoreError>;

    async fn find_source_path(&self, node: &NodeId) -> Result<Option<String>, StoreError>;
}
