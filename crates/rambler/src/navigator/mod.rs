//! Navigators: per-node combinator state machines.
//!
//! A [`Navigator`] is bound to one node for its lifetime. It caches a
//! snapshot of the node's parts, picks up structural changes from the
//! store's parts watch at the start of each step, and yields one
//! [`Instruction`] per call to [`Navigator::next`] until its combinator
//! decides no further pass is warranted.
//!
//! The combinator set is closed. [`navigator_for`] resolves a node's
//! declared combinator type (falling back to the base type of a declared
//! subtype) and picks the matching variant.

mod graph;
mod indexed;
mod oneshot;
mod passes;
mod similarity;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::error::StoreError;
use crate::store::{PartsWatch, Store};
use crate::vocab::{CombinatorKind, NodeId, ParamKind, Relation};

use graph::GraphWalk;
use indexed::{Indexed, Order};
use oneshot::{OneShot, ParamRef};
use passes::PassCounter;
use similarity::SimilarityLeap;

/// Ids to play next, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub ids: Vec<NodeId>,
    /// The first output of an onset-ordered pass; schedulers restart their
    /// relative timing from here.
    pub init_ref_time: bool,
}

impl Instruction {
    pub fn new(ids: Vec<NodeId>) -> Self {
        Self {
            ids,
            init_ref_time: false,
        }
    }
}

/// Borrowed navigator state handed to a variant for one step.
pub(crate) struct Step<'a> {
    pub(crate) node: &'a NodeId,
    pub(crate) store: &'a dyn Store,
    pub(crate) parts: &'a mut Vec<NodeId>,
    pub(crate) passes: &'a mut PassCounter,
    pub(crate) rng: &'a mut StdRng,
}

#[derive(Debug)]
enum Variant {
    Indexed(Indexed),
    OneShot(OneShot),
    Similarity(SimilarityLeap),
    Graph(GraphWalk),
}

impl Variant {
    fn for_kind(kind: CombinatorKind, param: ParamRef) -> Self {
        match kind {
            CombinatorKind::Sequence => Variant::Indexed(Indexed::new(Order::Forward)),
            CombinatorKind::Reverse => Variant::Indexed(Indexed::new(Order::Reverse)),
            CombinatorKind::Permutation => Variant::Indexed(Indexed::new(Order::Permuted(None))),
            CombinatorKind::OnsetSequence => Variant::Indexed(Indexed::new(Order::Onset)),
            CombinatorKind::Conjunction => Variant::OneShot(OneShot::Conjunction),
            CombinatorKind::Disjunction => Variant::OneShot(OneShot::Disjunction),
            CombinatorKind::Subset => Variant::OneShot(OneShot::Subset(param)),
            CombinatorKind::Selection => Variant::OneShot(OneShot::Selection(param)),
            CombinatorKind::MultiSelection => Variant::OneShot(OneShot::MultiSelection(param)),
            CombinatorKind::MultiRandom => Variant::OneShot(OneShot::MultiRandom(param)),
            CombinatorKind::SimilarityLeap => Variant::Similarity(SimilarityLeap::new(param)),
            CombinatorKind::Graph => Variant::Graph(GraphWalk::default()),
        }
    }
}

/// Parts snapshot plus the watch that keeps it current.
struct Snapshot {
    parts: Vec<NodeId>,
    watch: Option<PartsWatch>,
}

impl Snapshot {
    /// Load on first use, afterwards take the latest published list if it
    /// changed. Returns the previous length when the snapshot was replaced.
    ///
    /// Only called at the start of a step: a structural edit is picked up by
    /// the next `next()` or `has_parts()`, and `position()` reports the old
    /// snapshot until then.
    async fn refresh(&mut self, store: &dyn Store, node: &NodeId) -> Result<Option<usize>, StoreError> {
        match &mut self.watch {
            None => {
                // Subscribe first so no edit between the two calls is missed
                self.watch = Some(store.watch_parts(node)?);
                self.parts = store.find_parts(node).await?;
                Ok(None)
            }
            Some(watch) => {
                if !watch.has_changed().unwrap_or(false) {
                    return Ok(None);
                }
                let previous = self.parts.len();
                self.parts = watch.borrow_and_update().clone();
                Ok(Some(previous))
            }
        }
    }
}

/// Stateful iterator implementing one combinator for one node.
pub struct Navigator {
    node: NodeId,
    store: Arc<dyn Store>,
    combinator: &'static str,
    snapshot: Snapshot,
    passes: PassCounter,
    variant: Variant,
    rng: StdRng,
}

impl Navigator {
    /// Navigator for `node` using `kind`. `param` is the parameter object of
    /// the combinator's declared type, if any.
    pub fn new(node: NodeId, store: Arc<dyn Store>, kind: CombinatorKind, param: Option<String>) -> Self {
        Self::with_variant(node, store, kind.tag(), Variant::for_kind(kind, param))
    }

    /// Navigator that emits the node itself once per pass.
    pub fn leaf(node: NodeId, store: Arc<dyn Store>) -> Self {
        Self::with_variant(node, store, "Leaf", Variant::OneShot(OneShot::Leaf))
    }

    fn with_variant(node: NodeId, store: Arc<dyn Store>, combinator: &'static str, variant: Variant) -> Self {
        Self {
            node,
            store,
            combinator,
            snapshot: Snapshot {
                parts: Vec::new(),
                watch: None,
            },
            passes: PassCounter::default(),
            variant,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source with a seeded one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Tag of the combinator in use ("Leaf" for the implicit leaf rule).
    pub fn combinator(&self) -> &'static str {
        self.combinator
    }

    /// Passes started so far.
    pub fn passes(&self) -> u32 {
        self.passes.started()
    }

    pub async fn has_parts(&mut self) -> Result<bool, StoreError> {
        self.refresh().await?;
        Ok(!self.snapshot.parts.is_empty())
    }

    /// Next instruction, or `None` once no further pass is warranted.
    pub async fn next(&mut self) -> Result<Option<Instruction>, StoreError> {
        self.refresh().await?;
        let step = Step {
            node: &self.node,
            store: self.store.as_ref(),
            parts: &mut self.snapshot.parts,
            passes: &mut self.passes,
            rng: &mut self.rng,
        };
        match &mut self.variant {
            Variant::Indexed(indexed) => indexed.next(step).await,
            Variant::OneShot(oneshot) => oneshot.next(step).await,
            Variant::Similarity(similarity) => similarity.next(step).await,
            Variant::Graph(graph) => graph.next(step).await,
        }
    }

    /// Progress within the current pass: the cursor for indexed walks, the
    /// step count for graph walks, 0 for one-shot combinators.
    pub fn position(&self) -> usize {
        match &self.variant {
            Variant::Indexed(indexed) => indexed.position(),
            Variant::OneShot(_) => 0,
            Variant::Similarity(similarity) => similarity.position(),
            Variant::Graph(graph) => graph.position(),
        }
    }

    async fn refresh(&mut self) -> Result<(), StoreError> {
        let Some(previous) = self.snapshot.refresh(self.store.as_ref(), &self.node).await? else {
            return Ok(());
        };
        let len = self.snapshot.parts.len();
        match &mut self.variant {
            Variant::Indexed(indexed) => indexed.parts_replaced(previous, len),
            Variant::OneShot(_) => {}
            Variant::Similarity(similarity) => similarity.parts_replaced(len),
            Variant::Graph(graph) => graph.parts_replaced(len),
        }
        Ok(())
    }
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("node", &self.node)
            .field("combinator", &self.combinator)
            .field("parts", &self.snapshot.parts)
            .field("passes", &self.passes)
            .field("variant", &self.variant)
            .finish()
    }
}

/// Build the navigator a node declares.
///
/// Without a declared (or resolvable) combinator the node plays its parts
/// in onset order when the first part carries an onset, in sequence
/// otherwise, and plays itself when it has no parts.
pub async fn navigator_for(node: &NodeId, store: Arc<dyn Store>) -> Result<Navigator, StoreError> {
    if let Some(type_id) = store.find_object(node.as_str(), Relation::CombinatorType).await? {
        match resolve_kind(store.as_ref(), &type_id).await? {
            Some(kind) => {
                let param = store.find_object(&type_id, Relation::TypeParameter).await?;
                return Ok(Navigator::new(node.clone(), store, kind, param));
            }
            None => warn!(
                node.id = %node,
                combinator = %type_id,
                "unknown combinator type, inferring from parts"
            ),
        }
    }

    let parts = store.find_parts(node).await?;
    let Some(first) = parts.first() else {
        return Ok(Navigator::leaf(node.clone(), store));
    };
    let kind = if store.find_parameter_value(first, ParamKind::Onset).await?.is_some() {
        CombinatorKind::OnsetSequence
    } else {
        CombinatorKind::Sequence
    };
    Ok(Navigator::new(node.clone(), store, kind, None))
}

async fn resolve_kind(store: &dyn Store, type_id: &str) -> Result<Option<CombinatorKind>, StoreError> {
    if let Ok(kind) = type_id.parse() {
        return Ok(Some(kind));
    }
    let base = store.find_object(type_id, Relation::BaseType).await?;
    Ok(base.and_then(|tag| tag.parse().ok()))
}
