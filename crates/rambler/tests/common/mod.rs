//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rambler::{natural_cmp, DummyScheduler, MemoryStore, MultiPlayer, NodeId};
use ramblerconf::PlayerSettings;

pub const DELAY: Duration = Duration::from_millis(20);

/// Leaf numbers per branch of [`example_tree`], in play order.
pub const BRANCHES: [&[u32]; 3] = [&[5, 6], &[7, 11, 12, 9], &[10]];

/// dymo1 ( dymo2 (5, 6), dymo3 (7, dymo8 (11, 12), 9), dymo4 (10) ), every
/// leaf with an audio source.
pub fn example_tree() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_node("dymo1", None);
    store.add_node("dymo2", Some("dymo1"));
    store.add_node("dymo3", Some("dymo1"));
    store.add_node("dymo4", Some("dymo1"));
    store.add_leaf("dymo5", Some("dymo2"), "5.m4a");
    store.add_leaf("dymo6", Some("dymo2"), "6.m4a");
    store.add_leaf("dymo7", Some("dymo3"), "7.m4a");
    store.add_node("dymo8", Some("dymo3"));
    store.add_leaf("dymo9", Some("dymo3"), "9.m4a");
    store.add_leaf("dymo10", Some("dymo4"), "10.m4a");
    store.add_leaf("dymo11", Some("dymo8"), "11.m4a");
    store.add_leaf("dymo12", Some("dymo8"), "12.m4a");
    store
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub scheduler: Arc<DummyScheduler>,
    pub player: MultiPlayer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(PlayerSettings::default())
    }

    pub fn with_settings(settings: PlayerSettings) -> Self {
        let store = example_tree();
        let scheduler = Arc::new(DummyScheduler::new(DELAY));
        let player = MultiPlayer::new(store.clone(), scheduler.clone(), settings);
        Self {
            store,
            scheduler,
            player,
        }
    }

    /// Scheduled groups as id strings, each group naturally sorted.
    pub fn scheduled(&self) -> Vec<Vec<String>> {
        groups_of(&self.scheduler)
    }
}

pub fn groups_of(scheduler: &DummyScheduler) -> Vec<Vec<String>> {
    scheduler
        .scheduled_groups()
        .into_iter()
        .map(|group| {
            let mut ids: Vec<String> = group.iter().map(NodeId::to_string).collect();
            ids.sort_by(|a, b| natural_cmp(a, b));
            ids
        })
        .collect()
}

pub fn id(n: u32) -> NodeId {
    NodeId::new(format!("dymo{n}"))
}

/// Groups of leaf numbers as id strings.
pub fn groups(numbers: &[&[u32]]) -> Vec<Vec<String>> {
    numbers
        .iter()
        .map(|group| group.iter().map(|n| format!("dymo{n}")).collect())
        .collect()
}

/// Branches played one after the other: one group per leaf.
pub fn sequential(branches: &[&[u32]]) -> Vec<Vec<String>> {
    let singles: Vec<&[u32]> = branches
        .iter()
        .flat_map(|branch| branch.chunks(1))
        .collect();
    groups(&singles)
}

/// Branches played side by side: the i-th group holds every branch's i-th
/// leaf.
pub fn parallel(branches: &[&[u32]]) -> Vec<Vec<String>> {
    let longest = branches.iter().map(|b| b.len()).max().unwrap_or(0);
    (0..longest)
        .map(|i| {
            let mut ids: Vec<String> = branches
                .iter()
                .filter_map(|branch| branch.get(i))
                .map(|n| format!("dymo{n}"))
                .collect();
            ids.sort_by(|a, b| natural_cmp(a, b));
            ids
        })
        .collect()
}
