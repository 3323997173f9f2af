use crate::error::StoreError;
use crate::store::Store;
use crate::vocab::{NodeId, ParamKind};

/// Pass bookkeeping shared by every combinator.
///
/// A pass is counted when its first output is produced. Whether another
/// pass may start is read from the store at every pass boundary, so loop
/// and repeat edits take effect on the next boundary.
#[derive(Debug, Default)]
pub(crate) struct PassCounter {
    started: u32,
}

impl PassCounter {
    pub(crate) fn started(&self) -> u32 {
        self.started
    }

    pub(crate) fn begin_pass(&mut self) {
        self.started += 1;
    }

    /// The first pass is always allowed. After that the node's loop flag or
    /// a repeat count above the completed extra passes keeps it going.
    pub(crate) async fn another_pass_warranted(
        &self,
        store: &dyn Store,
        node: &NodeId,
    ) -> Result<bool, StoreError> {
        if self.started == 0 {
            return Ok(true);
        }
        let looping = store
            .find_parameter_value(node, ParamKind::Loop)
            .await?
            .is_some_and(|v| v.is_truthy());
        if looping {
            return Ok(true);
        }
        let repeat = store
            .find_parameter_value(node, ParamKind::Repeat)
            .await?
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        Ok(repeat > f64::from(self.started - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_repeat_counts_extra_passes() {
        let store = MemoryStore::new();
        store.add_node("n", None);
        store.set_parameter(Some("n"), ParamKind::Repeat, 2.0);
        let node = NodeId::from("n");

        let mut passes = PassCounter::default();
        let mut total = 0;
        while passes.another_pass_warranted(&store, &node).await.unwrap() {
            passes.begin_pass();
            total += 1;
            assert!(total < 10, "repeat should stop");
        }
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_loop_flag_checked_at_each_boundary() {
        let store = MemoryStore::new();
        store.add_node("n", None);
        let node = NodeId::from("n");
        let mut passes = PassCounter::default();

        passes.begin_pass();
        assert!(!passes.another_pass_warranted(&store, &node).await.unwrap());

        store.set_parameter(Some("n"), ParamKind::Loop, true);
        assert!(passes.another_pass_warranted(&store, &node).await.unwrap());

        store.set_parameter(Some("n"), ParamKind::Loop, false);
        assert!(!passes.another_pass_warranted(&store, &node).await.unwrap());
    }
}
