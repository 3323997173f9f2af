use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::oneshot::{param_value, ParamRef};
use super::{Instruction, Step};
use crate::error::StoreError;
use crate::vocab::ParamKind;

/// Sequential walk that may leap to a part declared similar to the one due.
#[derive(Debug)]
pub(crate) struct SimilarityLeap {
    probability: ParamRef,
    cursor: usize,
}

impl SimilarityLeap {
    pub(crate) fn new(probability: ParamRef) -> Self {
        Self {
            probability,
            cursor: 0,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.cursor
    }

    pub(crate) fn parts_replaced(&mut self, new_len: usize) {
        self.cursor = self.cursor.min(new_len);
    }

    pub(crate) async fn next(&mut self, step: Step<'_>) -> Result<Option<Instruction>, StoreError> {
        if step.parts.is_empty() {
            return Ok(None);
        }
        if self.cursor >= step.parts.len() {
            if !step.passes.another_pass_warranted(step.store, step.node).await? {
                return Ok(None);
            }
            self.cursor = 0;
        }
        if self.cursor == 0 {
            step.passes.begin_pass();
        }

        let due = step.parts[self.cursor].clone();
        self.cursor += 1;

        let probability = match param_value(step.store, &self.probability).await? {
            Some(value) => value.as_f64(),
            None => step
                .store
                .find_parameter_value(step.node, ParamKind::LeapingProbability)
                .await?
                .and_then(|v| v.as_f64()),
        }
        .unwrap_or(0.0);

        if probability <= 0.0 || step.rng.gen::<f64>() >= probability {
            return Ok(Some(Instruction::new(vec![due])));
        }

        let similars = step.store.find_similars(&due).await?;
        let Some(substitute) = similars.choose(step.rng).cloned() else {
            return Ok(Some(Instruction::new(vec![due])));
        };

        let continue_after = step
            .store
            .find_parameter_value(step.node, ParamKind::ContinueAfterLeaping)
            .await?
            .is_some_and(|v| v.is_truthy());
        if continue_after {
            if let Some(index) = step.parts.iter().position(|p| *p == substitute) {
                self.cursor = index + 1;
            }
        }
        debug!(
            node.id = %step.node,
            from = %due,
            to = %substitute,
            continue_after,
            "leaping to similar part"
        );

        Ok(Some(Instruction::new(vec![substitute])))
    }
}
