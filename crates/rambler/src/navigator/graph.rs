use petgraph::graphmap::DiGraphMap;
use rand::seq::SliceRandom;
use rand::rngs::StdRng;

use super::{Instruction, Step};
use crate::error::StoreError;
use crate::store::Store;
use crate::vocab::NodeId;

/// Random walk over successor edges between sibling parts.
///
/// Each pass starts at the first part. Every step moves to a random
/// successor of the current part; a part without successors hands over to
/// the first unvisited part. The pass ends when the chosen part was already
/// visited in this pass, or when no unvisited part is left, so a pass never
/// plays a part twice.
#[derive(Debug, Default)]
pub(crate) struct GraphWalk {
    graph: Option<DiGraphMap<usize, ()>>,
    visited: Vec<bool>,
    current: Option<usize>,
    steps: usize,
}

impl GraphWalk {
    pub(crate) fn position(&self) -> usize {
        self.steps
    }

    pub(crate) fn parts_replaced(&mut self, new_len: usize) {
        self.graph = None;
        self.visited.resize(new_len, false);
        if self.current.is_some_and(|c| c >= new_len) {
            self.current = None;
        }
    }

    pub(crate) async fn next(&mut self, step: Step<'_>) -> Result<Option<Instruction>, StoreError> {
        if step.parts.is_empty() {
            return Ok(None);
        }
        if self.graph.is_none() {
            self.graph = Some(build_graph(step.store, step.parts).await?);
            self.visited.resize(step.parts.len(), false);
        }

        let mut target = self.advance(step.rng);
        if target.is_none() {
            if !step.passes.another_pass_warranted(step.store, step.node).await? {
                return Ok(None);
            }
            self.restart();
            target = self.advance(step.rng);
        }
        let Some(index) = target else {
            return Ok(None);
        };

        if self.steps == 0 {
            step.passes.begin_pass();
        }
        self.steps += 1;
        self.visited[index] = true;
        self.current = Some(index);
        Ok(Some(Instruction::new(vec![step.parts[index].clone()])))
    }

    fn advance(&self, rng: &mut StdRng) -> Option<usize> {
        let first_unvisited = || self.visited.iter().position(|seen| !seen);
        let Some(current) = self.current else {
            return first_unvisited();
        };
        let successors: Vec<usize> = self
            .graph
            .as_ref()
            .map(|graph| graph.neighbors(current).collect())
            .unwrap_or_default();
        match successors.choose(rng) {
            Some(&next) if self.visited[next] => None,
            Some(&next) => Some(next),
            None => first_unvisited(),
        }
    }

    fn restart(&mut self) {
        self.visited.iter_mut().for_each(|seen| *seen = false);
        self.current = None;
        self.steps = 0;
    }
}

async fn build_graph(store: &dyn Store, parts: &[NodeId]) -> Result<DiGraphMap<usize, ()>, StoreError> {
    let mut graph = DiGraphMap::new();
    for index in 0..parts.len() {
        graph.add_node(index);
    }
    for (index, part) in parts.iter().enumerate() {
        for successor in store.find_successors(part).await? {
            if let Some(target) = parts.iter().position(|p| *p == successor) {
                graph.add_edge(index, target, ());
            }
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::navigator::Navigator;
    use crate::store::MemoryStore;
    use crate::vocab::{CombinatorKind, NodeId, ParamKind};

    fn two_cycle() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_node("song", None);
        store.add_node("a", Some("song"));
        store.add_node("b", Some("song"));
        store.add_successor("a", "b");
        store.add_successor("b", "a");
        store
    }

    async fn drain(navigator: &mut Navigator) -> Vec<String> {
        let mut emitted = Vec::new();
        while let Some(instruction) = navigator.next().await.unwrap() {
            emitted.extend(instruction.ids.iter().map(|id| id.to_string()));
            assert!(emitted.len() <= 10, "walk did not end: {emitted:?}");
        }
        emitted
    }

    #[tokio::test]
    async fn test_cycle_ends_pass_without_loop() {
        let store = two_cycle();
        let mut navigator = Navigator::new(NodeId::from("song"), store.clone(), CombinatorKind::Graph, None);
        assert_eq!(drain(&mut navigator).await, vec!["a", "b"]);
        assert_eq!(navigator.passes(), 1);
    }

    #[tokio::test]
    async fn test_cycle_with_repeat_plays_two_passes() {
        let store = two_cycle();
        store.set_parameter(Some("song"), ParamKind::Repeat, 1.0);
        let mut navigator = Navigator::new(NodeId::from("song"), store.clone(), CombinatorKind::Graph, None);
        assert_eq!(drain(&mut navigator).await, vec!["a", "b", "a", "b"]);
        assert_eq!(navigator.passes(), 2);
    }

    #[tokio::test]
    async fn test_cycle_with_loop_keeps_going() {
        let store = two_cycle();
        store.set_parameter(Some("song"), ParamKind::Loop, true);
        let mut navigator = Navigator::new(NodeId::from("song"), store.clone(), CombinatorKind::Graph, None);
        for round in 0..8 {
            let ids = navigator.next().await.unwrap().unwrap().ids;
            assert_eq!(ids, vec![NodeId::from(if round % 2 == 0 { "a" } else { "b" })]);
            assert_eq!(navigator.position(), round % 2 + 1);
        }
    }
}
