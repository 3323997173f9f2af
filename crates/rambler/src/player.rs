//! One cancellable playback session of one subtree.
//!
//! A session asks its node's navigator for the next set of ids and either
//! plays each id as a child session (composite node) or hands it to the
//! scheduler (leaf node). Children inherit the session's current timing
//! anchor; their results become the anchor for what follows. Cancellation
//! is a token shared down the tree and checked after every suspension.

use std::sync::{Arc, Mutex};

use futures::future::{join, join_all, BoxFuture};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PlayError;
use crate::navigator::{navigator_for, Instruction, Navigator};
use crate::scheduler::{ActiveObjects, EventSink, ScheduledRef, Scheduler, SessionContext};
use crate::store::Store;
use crate::vocab::{NodeId, ParamKind};

/// Lifecycle of a session. No phase is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Playing,
    Stopped,
    Ended,
}

struct SessionState {
    phase: SessionPhase,
    position: Option<usize>,
    children: Vec<HierarchicalPlayer>,
    last_results: Vec<ScheduledRef>,
}

struct Session {
    id: Uuid,
    node: NodeId,
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    sink: EventSink,
    /// Anchor inherited from the enclosing session.
    anchor: Option<ScheduledRef>,
    init_ref_time: bool,
    /// Nodes from the root session down to this session's parent.
    ancestry: Vec<NodeId>,
    cancel: CancellationToken,
    log_navigation: bool,
    active: Arc<ActiveObjects>,
    state: Mutex<SessionState>,
}

/// Handle to one playback session. Clones share the session.
#[derive(Clone)]
pub struct HierarchicalPlayer {
    session: Arc<Session>,
}

impl HierarchicalPlayer {
    /// Top-level session for `node`. Object events go to `sink`.
    pub fn new(
        node: NodeId,
        store: Arc<dyn Store>,
        scheduler: Arc<dyn Scheduler>,
        sink: EventSink,
        log_navigation: bool,
    ) -> Self {
        Self::with_session(Session {
            id: Uuid::new_v4(),
            node,
            store,
            scheduler,
            sink,
            anchor: None,
            init_ref_time: true,
            ancestry: Vec::new(),
            cancel: CancellationToken::new(),
            log_navigation,
            active: Arc::new(ActiveObjects::default()),
            state: Mutex::new(SessionState {
                phase: SessionPhase::Idle,
                position: None,
                children: Vec::new(),
                last_results: Vec::new(),
            }),
        })
    }

    fn with_session(session: Session) -> Self {
        Self {
            session: Arc::new(session),
        }
    }

    fn child(&self, node: &NodeId, anchor: Option<ScheduledRef>, init_ref_time: bool) -> Self {
        let parent = &self.session;
        let mut ancestry = parent.ancestry.clone();
        ancestry.push(parent.node.clone());
        Self::with_session(Session {
            id: Uuid::new_v4(),
            node: node.clone(),
            store: parent.store.clone(),
            scheduler: parent.scheduler.clone(),
            sink: parent.sink.clone(),
            anchor,
            init_ref_time,
            ancestry,
            cancel: parent.cancel.child_token(),
            log_navigation: parent.log_navigation,
            active: Arc::new(ActiveObjects::default()),
            state: Mutex::new(SessionState {
                phase: SessionPhase::Idle,
                position: None,
                children: Vec::new(),
                last_results: Vec::new(),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn node(&self) -> &NodeId {
        &self.session.node
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.state.lock().unwrap().phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase() == SessionPhase::Playing
    }

    /// Position of this session's navigator, once it produced output.
    pub fn position(&self) -> Option<usize> {
        self.session.state.lock().unwrap().position
    }

    /// Objects this session currently holds.
    pub fn active_objects(&self) -> Vec<ScheduledRef> {
        self.session.active.snapshot()
    }

    pub fn same_session(&self, other: &HierarchicalPlayer) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }

    /// Play the subtree. Resolves with the object that anchors whatever
    /// follows this subtree, or `None` if stopped or nothing was scheduled.
    ///
    /// Only the first call plays; later calls resolve to `Ok(None)`.
    pub fn play(&self) -> BoxFuture<'static, Result<Option<ScheduledRef>, PlayError>> {
        let this = self.clone();
        async move { this.run().await }.boxed()
    }

    /// Stop this session, its children and its objects. Safe to call at any
    /// time and more than once.
    pub fn stop(&self) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            let children = {
                let mut state = this.session.state.lock().unwrap();
                if matches!(state.phase, SessionPhase::Idle | SessionPhase::Playing) {
                    state.phase = SessionPhase::Stopped;
                    debug!(
                        session.id = %this.session.id,
                        node.id = %this.session.node,
                        "session stopped"
                    );
                }
                std::mem::take(&mut state.children)
            };
            this.session.cancel.cancel();
            let objects = this.session.active.drain();
            join(
                join_all(children.iter().map(|child| child.stop())),
                join_all(objects.iter().map(|object| object.stop())),
            )
            .await;
        }
        .boxed()
    }

    async fn run(self) -> Result<Option<ScheduledRef>, PlayError> {
        let session = &self.session;
        {
            let mut state = session.state.lock().unwrap();
            if state.phase != SessionPhase::Idle {
                return Ok(None);
            }
            state.phase = SessionPhase::Playing;
        }

        if session.ancestry.contains(&session.node) {
            self.finish(SessionPhase::Ended);
            return Err(PlayError::Cycle {
                node: session.node.clone(),
            });
        }
        debug!(session.id = %session.id, node.id = %session.node, "session started");

        match self.traverse().await {
            Ok(_) if session.cancel.is_cancelled() => Ok(None),
            Ok(result) => {
                self.finish(SessionPhase::Ended);
                debug!(session.id = %session.id, node.id = %session.node, "session ended");
                Ok(result)
            }
            Err(e) => {
                warn!(
                    session.id = %session.id,
                    node.id = %session.node,
                    error = %e,
                    "session failed"
                );
                self.stop().await;
                Err(e)
            }
        }
    }

    fn finish(&self, phase: SessionPhase) {
        let mut state = self.session.state.lock().unwrap();
        if state.phase == SessionPhase::Playing {
            state.phase = phase;
        }
    }

    async fn traverse(&self) -> Result<Option<ScheduledRef>, PlayError> {
        let session = &self.session;
        let cancel = &session.cancel;

        let mut navigator = navigator_for(&session.node, session.store.clone()).await?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mut composite = false;
        loop {
            let next = navigator.next().await?;
            composite = navigator.has_parts().await?;
            if cancel.is_cancelled() {
                return Ok(None);
            }
            session.state.lock().unwrap().position = Some(navigator.position());

            let Some(instruction) = next else {
                break;
            };
            self.log_instruction(&navigator, &instruction);

            let anchor = self.current_anchor().await;
            if cancel.is_cancelled() {
                return Ok(None);
            }

            if composite {
                self.play_parts(instruction, anchor).await?;
            } else {
                self.schedule_ids(instruction, anchor).await;
            }
            if cancel.is_cancelled() {
                return Ok(None);
            }
        }

        if composite {
            let last_results = session.state.lock().unwrap().last_results.clone();
            if let Some(longest) = longest(&last_results).await {
                return Ok(Some(longest));
            }
        }
        Ok(self.current_anchor().await)
    }

    /// Run one child session per id concurrently and keep their results.
    async fn play_parts(
        &self,
        instruction: Instruction,
        anchor: Option<ScheduledRef>,
    ) -> Result<(), PlayError> {
        let children: Vec<HierarchicalPlayer> = instruction
            .ids
            .iter()
            .map(|id| self.child(id, anchor.clone(), instruction.init_ref_time))
            .collect();
        self.session.state.lock().unwrap().children = children.clone();

        let outcomes = join_all(children.iter().map(|child| child.play())).await;
        let mut results = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            results.extend(outcome?);
        }

        let rejected = self
            .session
            .active
            .replace_unless_cancelled(&self.session.cancel, results.clone());
        if !rejected.is_empty() || self.session.cancel.is_cancelled() {
            join_all(rejected.iter().map(|object| object.stop())).await;
            return Ok(());
        }
        let mut state = self.session.state.lock().unwrap();
        state.children.clear();
        state.last_results = results;
        Ok(())
    }

    /// Schedule every id concurrently. Failures only cost their own id.
    async fn schedule_ids(&self, instruction: Instruction, anchor: Option<ScheduledRef>) {
        let session = &self.session;
        let requests = instruction.ids.iter().map(|id| {
            let ctx = SessionContext::new(
                session.node.clone(),
                session.init_ref_time,
                Arc::downgrade(&session.active),
                session.sink.clone(),
                session.store.clone(),
            );
            let anchor = anchor.clone();
            async move { (id, session.scheduler.schedule(id, anchor, ctx).await) }
        });
        let outcomes = join_all(requests).await;

        let mut scheduled = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Some(object)) => scheduled.push(object),
                Ok(None) => debug!(session.id = %session.id, node.id = %id, "nothing to schedule"),
                Err(e) => warn!(
                    session.id = %session.id,
                    node.id = %id,
                    error = %e,
                    "scheduling failed, skipping"
                ),
            }
        }

        // Objects that arrive after a stop are stopped here, never held
        let late = session.active.extend_unless_cancelled(&session.cancel, scheduled);
        if !late.is_empty() {
            debug!(session.id = %session.id, count = late.len(), "stopping objects scheduled after stop");
            join_all(late.iter().map(|object| object.stop())).await;
        }
    }

    /// The longest live object of this session, else the inherited anchor.
    async fn current_anchor(&self) -> Option<ScheduledRef> {
        let active = self.session.active.snapshot();
        match longest(&active).await {
            Some(object) => Some(object),
            None => self.session.anchor.clone(),
        }
    }

    fn log_instruction(&self, navigator: &Navigator, instruction: &Instruction) {
        let ids: Vec<&str> = instruction.ids.iter().map(NodeId::as_str).collect();
        if self.session.log_navigation {
            info!(
                node.id = %self.session.node,
                combinator = navigator.combinator(),
                ids = ?ids,
                "navigated"
            );
        } else {
            debug!(
                node.id = %self.session.node,
                combinator = navigator.combinator(),
                ids = ?ids,
                "navigated"
            );
        }
    }
}

/// Object with the greatest duration; ties go to the later one.
async fn longest(objects: &[ScheduledRef]) -> Option<ScheduledRef> {
    let mut best: Option<(f64, &ScheduledRef)> = None;
    for object in objects {
        let duration = object.get_param(ParamKind::Duration).await.unwrap_or(0.0);
        if best.map_or(true, |(longest, _)| duration >= longest) {
            best = Some((duration, object));
        }
    }
    best.map(|(_, object)| object.clone())
}

impl std::fmt::Debug for HierarchicalPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalPlayer")
            .field("id", &self.session.id)
            .field("node", &self.session.node)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playing::PlayingEvent;
    use crate::scheduler::{DummyScheduler, ObjectEvent};
    use crate::store::MemoryStore;
    use crate::vocab::CombinatorKind;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    fn setup() -> (Arc<MemoryStore>, Arc<DummyScheduler>) {
        let store = Arc::new(MemoryStore::new());
        store.add_node("root", None);
        store.add_node("a", Some("root"));
        store.add_leaf("a1", Some("a"), "a1.m4a");
        store.add_leaf("a2", Some("a"), "a2.m4a");
        store.add_leaf("b", Some("root"), "b.m4a");
        let scheduler = Arc::new(DummyScheduler::new(Duration::from_millis(20)));
        (store, scheduler)
    }

    fn player(store: &Arc<MemoryStore>, scheduler: &Arc<DummyScheduler>, node: &str) -> HierarchicalPlayer {
        HierarchicalPlayer::new(
            NodeId::from(node),
            store.clone(),
            scheduler.clone(),
            EventSink::detached(),
            false,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_subtree_in_order() {
        let (store, scheduler) = setup();
        let player = player(&store, &scheduler, "root");
        assert_eq!(player.phase(), SessionPhase::Idle);

        let result = player.play().await.unwrap();
        assert_eq!(result.unwrap().node(), &NodeId::from("b"));
        assert_eq!(player.phase(), SessionPhase::Ended);
        assert_eq!(
            scheduler.scheduled_ids(),
            vec![NodeId::from("a1"), NodeId::from("a2"), NodeId::from("b")]
        );
        assert_eq!(player.position(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_play_is_ignored() {
        let (store, scheduler) = setup();
        let player = player(&store, &scheduler, "b");
        assert!(player.play().await.unwrap().is_some());
        assert!(player.play().await.unwrap().is_none());
        assert_eq!(scheduler.scheduled_ids().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_pending_work() {
        let (store, scheduler) = setup();
        let player = player(&store, &scheduler, "root");

        let handle = tokio::spawn(player.play());
        tokio::time::sleep(Duration::from_millis(10)).await;
        player.stop().await;
        assert_eq!(player.phase(), SessionPhase::Stopped);

        assert!(handle.await.unwrap().unwrap().is_none());
        tokio::time::sleep(Duration::from_millis(100)).await;
        // a1 was already being scheduled when the stop came in
        assert!(scheduler.scheduled_ids().len() <= 1);
        assert!(player.active_objects().is_empty());

        player.stop().await;
        assert_eq!(player.phase(), SessionPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_object_is_stopped_at_once() {
        let (store, scheduler) = setup();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = HierarchicalPlayer::new(
            NodeId::from("root"),
            store.clone(),
            scheduler.clone(),
            EventSink::new(tx),
            false,
        );

        let start = Instant::now();
        let handle = tokio::spawn(player.play());
        tokio::time::sleep(Duration::from_millis(10)).await;
        player.stop().await;
        assert!(handle.await.unwrap().unwrap().is_none());

        // a1 landed at 20ms and ended right there, not at 40ms
        assert_eq!(start.elapsed(), Duration::from_millis(20));
        assert_eq!(scheduler.scheduled_ids(), vec![NodeId::from("a1")]);
        let events: Vec<(bool, NodeId)> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| match event {
                PlayingEvent::Object(ObjectEvent::Started(o)) => (true, o.node().clone()),
                PlayingEvent::Object(ObjectEvent::Ended(o)) => (false, o.node().clone()),
                PlayingEvent::Reset => panic!("unexpected reset"),
            })
            .collect();
        assert_eq!(
            events,
            vec![(true, NodeId::from("a1")), (false, NodeId::from("a1"))]
        );
        assert!(player.active_objects().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_is_reported() {
        let (store, scheduler) = setup();
        store.add_part("a", "root");
        store.set_combinator("root", CombinatorKind::Sequence, None);

        let player = player(&store, &scheduler, "root");
        let result = player.play().await;
        assert_eq!(
            result.err(),
            Some(PlayError::Cycle {
                node: NodeId::from("root")
            })
        );
        assert_eq!(player.phase(), SessionPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_node_fails() {
        let (store, scheduler) = setup();
        let player = player(&store, &scheduler, "ghost");
        let result = player.play().await;
        assert!(matches!(result, Err(PlayError::Store(_))));
    }
}
