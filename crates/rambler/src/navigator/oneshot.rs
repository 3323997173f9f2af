//! Combinators emitting one instruction per pass.

use rand::seq::{index, SliceRandom};
use rand::Rng;

use super::{Instruction, Step};
use crate::error::StoreError;
use crate::store::Store;
use crate::vocab::{NodeId, ParamValue};

/// Parameter object id resolved from the combinator's type, if declared.
pub(crate) type ParamRef = Option<String>;

#[derive(Debug)]
pub(crate) enum OneShot {
    /// Emits the node itself.
    Leaf,
    Conjunction,
    Disjunction,
    Subset(ParamRef),
    Selection(ParamRef),
    MultiSelection(ParamRef),
    MultiRandom(ParamRef),
}

impl OneShot {
    pub(crate) async fn next(&self, mut step: Step<'_>) -> Result<Option<Instruction>, StoreError> {
        if !step.passes.another_pass_warranted(step.store, step.node).await? {
            return Ok(None);
        }
        let ids = self.pick(&mut step).await?;
        if ids.is_empty() {
            return Ok(None);
        }
        step.passes.begin_pass();
        Ok(Some(Instruction::new(ids)))
    }

    async fn pick(&self, step: &mut Step<'_>) -> Result<Vec<NodeId>, StoreError> {
        let parts: &[NodeId] = step.parts;
        let n = parts.len();
        let ids = match self {
            OneShot::Leaf => vec![step.node.clone()],
            OneShot::Conjunction => parts.to_vec(),
            OneShot::Disjunction => parts.choose(step.rng).cloned().into_iter().collect(),
            OneShot::Subset(param) => {
                let size = match param_value(step.store, param).await?.and_then(|v| v.as_f64()) {
                    Some(size) => clamp_count(size, n),
                    None if n == 0 => 0,
                    None => step.rng.gen_range(1..=(n - 1).max(1)),
                };
                let mut picked = index::sample(step.rng, n, size).into_vec();
                picked.sort_unstable();
                picked.into_iter().map(|i| parts[i].clone()).collect()
            }
            OneShot::Selection(param) => {
                let index = match param_value(step.store, param).await? {
                    Some(value) => value.as_indices().first().copied(),
                    None => Some(0),
                };
                index.and_then(|i| parts.get(i)).cloned().into_iter().collect()
            }
            OneShot::MultiSelection(param) => param_value(step.store, param)
                .await?
                .map(|value| value.as_indices())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|i| parts.get(i).cloned())
                .collect(),
            OneShot::MultiRandom(param) => {
                let count = param_value(step.store, param)
                    .await?
                    .and_then(|v| v.as_f64())
                    .map_or(1, |count| clamp_count(count, n));
                parts
                    .choose_multiple(step.rng, count)
                    .cloned()
                    .collect()
            }
        };
        Ok(ids)
    }
}

/// Current value of a combinator parameter. Read at every pick so edits
/// to the parameter object apply from the next pass.
pub(crate) async fn param_value(
    store: &dyn Store,
    param: &ParamRef,
) -> Result<Option<ParamValue>, StoreError> {
    match param {
        Some(object) => store.find_object_value(object).await,
        None => Ok(None),
    }
}

fn clamp_count(value: f64, n: usize) -> usize {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        (value as usize).min(n)
    }
}
