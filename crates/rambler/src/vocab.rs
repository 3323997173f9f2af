//! Shared vocabulary: node ids, parameter kinds and values, store relations,
//! and the closed set of combinator tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a node in the composition tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parameter classes the player reads or observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Truthy value keeps a navigator passing forever.
    Loop,
    /// Number of additional passes after the first.
    Repeat,
    /// Start time used to order onset sequences.
    Onset,
    /// Length of a scheduled object, used to pick timing anchors.
    Duration,
    /// Value held by a combinator parameter object.
    Value,
    LeapingProbability,
    ContinueAfterLeaping,
    /// Trigger class: positive starts the owning node, otherwise stops it.
    Play,
    ListenerOrientation,
    ListenerPosition,
}

/// A parameter value as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Number(f64),
    List(Vec<f64>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            ParamValue::List(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            ParamValue::Flag(b) => *b,
            ParamValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ParamValue::List(values) => !values.is_empty(),
        }
    }

    /// Non-negative integral entries as indices. A scalar is a single index.
    pub fn as_indices(&self) -> Vec<usize> {
        let to_index = |v: f64| (v >= 0.0 && v.fract() == 0.0).then_some(v as usize);
        match self {
            ParamValue::List(values) => values.iter().copied().filter_map(to_index).collect(),
            ParamValue::Number(n) => to_index(*n).into_iter().collect(),
            ParamValue::Flag(_) => Vec::new(),
        }
    }

    pub fn as_vec3(&self) -> Option<[f64; 3]> {
        match self {
            ParamValue::List(values) if values.len() == 3 => Some([values[0], values[1], values[2]]),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(values: Vec<f64>) -> Self {
        ParamValue::List(values)
    }
}

/// Object-valued relations resolved through [`crate::Store::find_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Node -> its declared combinator type id.
    CombinatorType,
    /// Type id -> the base combinator tag it specializes.
    BaseType,
    /// Type id -> the parameter object configuring it.
    TypeParameter,
}

/// The closed set of traversal rules a node may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombinatorKind {
    Sequence,
    Reverse,
    Permutation,
    OnsetSequence,
    Conjunction,
    Disjunction,
    Subset,
    Selection,
    MultiSelection,
    MultiRandom,
    SimilarityLeap,
    Graph,
}

impl CombinatorKind {
    pub const ALL: [CombinatorKind; 12] = [
        CombinatorKind::Sequence,
        CombinatorKind::Reverse,
        CombinatorKind::Permutation,
        CombinatorKind::OnsetSequence,
        CombinatorKind::Conjunction,
        CombinatorKind::Disjunction,
        CombinatorKind::Subset,
        CombinatorKind::Selection,
        CombinatorKind::MultiSelection,
        CombinatorKind::MultiRandom,
        CombinatorKind::SimilarityLeap,
        CombinatorKind::Graph,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            CombinatorKind::Sequence => "Sequence",
            CombinatorKind::Reverse => "Reverse",
            CombinatorKind::Permutation => "Permutation",
            CombinatorKind::OnsetSequence => "OnsetSequence",
            CombinatorKind::Conjunction => "Conjunction",
            CombinatorKind::Disjunction => "Disjunction",
            CombinatorKind::Subset => "Subset",
            CombinatorKind::Selection => "Selection",
            CombinatorKind::MultiSelection => "MultiSelection",
            CombinatorKind::MultiRandom => "MultiRandom",
            CombinatorKind::SimilarityLeap => "SimilarityLeap",
            CombinatorKind::Graph => "Graph",
        }
    }
}

impl fmt::Display for CombinatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Error for tags outside the combinator set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown combinator tag: {0}")]
pub struct UnknownCombinator(pub String);

impl FromStr for CombinatorKind {
    type Err = UnknownCombinator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CombinatorKind::ALL
            .into_iter()
            .find(|kind| kind.tag().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCombinator(s.to_string()))
    }
}
