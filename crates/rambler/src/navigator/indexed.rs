//! Cursor-driven combinators: sequence, reverse, permutation and onset
//! sequence. One id per call; the cursor walks `0..n` once per pass.

use std::cmp::Ordering;

use rand::seq::SliceRandom;

use super::{Instruction, Step};
use crate::error::StoreError;
use crate::store::Store;
use crate::vocab::{NodeId, ParamKind};

#[derive(Debug)]
pub(crate) enum Order {
    Forward,
    Reverse,
    /// Shuffled index table, drawn lazily at the first output of a pass.
    Permuted(Option<Vec<usize>>),
    /// Forward over the parts sorted by onset.
    Onset,
}

#[derive(Debug)]
pub(crate) struct Indexed {
    order: Order,
    cursor: usize,
}

impl Indexed {
    pub(crate) fn new(order: Order) -> Self {
        Self { order, cursor: 0 }
    }

    /// Raw cursor, also for permutations.
    pub(crate) fn position(&self) -> usize {
        self.cursor
    }

    pub(crate) fn parts_replaced(&mut self, old_len: usize, new_len: usize) {
        self.cursor = self.cursor.min(new_len);
        if let Order::Permuted(table) = &mut self.order {
            if old_len != new_len {
                *table = None;
            }
        }
    }

    fn reset(&mut self) {
        self.cursor = 0;
        if let Order::Permuted(table) = &mut self.order {
            *table = None;
        }
    }

    pub(crate) async fn next(&mut self, step: Step<'_>) -> Result<Option<Instruction>, StoreError> {
        if step.parts.is_empty() {
            return Ok(None);
        }
        if self.cursor >= step.parts.len() {
            if !step.passes.another_pass_warranted(step.store, step.node).await? {
                return Ok(None);
            }
            self.reset();
        }
        if self.cursor == 0 {
            step.passes.begin_pass();
        }

        let n = step.parts.len();
        let mut init_ref_time = false;
        let index = match &mut self.order {
            Order::Forward => self.cursor,
            Order::Reverse => n - 1 - self.cursor,
            Order::Permuted(table) => {
                let table = table.get_or_insert_with(|| {
                    let mut indices: Vec<usize> = (0..n).collect();
                    indices.shuffle(step.rng);
                    indices
                });
                table[self.cursor]
            }
            Order::Onset => {
                init_ref_time = self.cursor == 0;
                sort_by_onset(step.store, step.parts).await?;
                self.cursor
            }
        };
        self.cursor += 1;

        Ok(Some(Instruction {
            ids: vec![step.parts[index].clone()],
            init_ref_time,
        }))
    }
}

/// Reorder `parts` by onset unless already sorted. Parts without an onset
/// sort first; the sort is stable.
async fn sort_by_onset(store: &dyn Store, parts: &mut Vec<NodeId>) -> Result<(), StoreError> {
    let mut keyed = Vec::with_capacity(parts.len());
    for part in parts.iter() {
        let onset = store
            .find_parameter_value(part, ParamKind::Onset)
            .await?
            .and_then(|v| v.as_f64());
        keyed.push((onset, part.clone()));
    }
    if keyed.windows(2).all(|w| w[0].0 <= w[1].0) {
        return Ok(());
    }
    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    *parts = keyed.into_iter().map(|(_, id)| id).collect();
    Ok(())
}
