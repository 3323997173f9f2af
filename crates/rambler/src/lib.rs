//! Rambler: combinator-driven playback of tree-structured compositions
//!
//! A composition is a tree of nodes held by a [`Store`]. Every internal node
//! declares a combinator that decides, pass by pass, which of its parts play
//! next and in what arrangement:
//!
//! - **Sequence / Reverse / Permutation / OnsetSequence**: one part at a time
//! - **Conjunction**: all parts at once
//! - **Disjunction / Subset / MultiRandom**: random choices
//! - **Selection / MultiSelection**: parts picked by index
//! - **SimilarityLeap / Graph**: walks over store-declared relations
//!
//! A [`HierarchicalPlayer`] walks one subtree with these [`Navigator`]s and
//! hands leaves to a [`Scheduler`]. A [`MultiPlayer`] runs one session per
//! top-level node and publishes which ids are currently sounding.

pub mod error;
pub mod multi_player;
pub mod navigator;
pub mod player;
pub mod playing;
mod reactor;
pub mod scheduler;
pub mod store;
pub mod vocab;

pub use error::{PlayError, ScheduleError, StoreError};
pub use multi_player::MultiPlayer;
pub use navigator::{navigator_for, Instruction, Navigator};
pub use player::{HierarchicalPlayer, SessionPhase};
pub use playing::natural_cmp;
pub use scheduler::{
    DummyScheduler, EventSink, ObjectEvent, ScheduledObject, ScheduledRef, Scheduler,
    SessionContext,
};
pub use store::{MemoryStore, ParameterChange, ParameterSubscription, PartsWatch, Store};
pub use vocab::{CombinatorKind, NodeId, ParamKind, ParamValue, Relation, UnknownCombinator};
