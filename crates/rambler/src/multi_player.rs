//! Registry of concurrent top-level sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use ramblerconf::PlayerSettings;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::PlayError;
use crate::player::HierarchicalPlayer;
use crate::playing::{spawn_aggregator, PlayingEvent};
use crate::reactor::{spawn_listener_reactor, spawn_trigger_reactor};
use crate::scheduler::{EventSink, Scheduler};
use crate::store::Store;
use crate::vocab::{NodeId, ParamKind};

struct SessionEntry {
    player: HierarchicalPlayer,
    done: watch::Receiver<bool>,
}

pub(crate) struct Shared {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    settings: PlayerSettings,
    sessions: Mutex<HashMap<NodeId, SessionEntry>>,
    events: mpsc::UnboundedSender<PlayingEvent>,
    playing: Arc<watch::Sender<Vec<NodeId>>>,
    shutdown: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Plays top-level nodes, at most one session per node id, and publishes
/// which ids are sounding.
///
/// Must be created inside a tokio runtime: it spawns the playing-id
/// aggregator and, depending on [`PlayerSettings`], the trigger and
/// listener reactors. Those tasks end when the last handle is dropped.
#[derive(Clone)]
pub struct MultiPlayer {
    shared: Arc<Shared>,
}

impl MultiPlayer {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<dyn Scheduler>, settings: PlayerSettings) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (playing, _) = watch::channel(Vec::new());
        let playing = Arc::new(playing);
        let shutdown = CancellationToken::new();

        spawn_aggregator(events_rx, playing.clone(), shutdown.clone());

        let shared = Arc::new(Shared {
            store: store.clone(),
            scheduler: scheduler.clone(),
            settings: settings.clone(),
            sessions: Mutex::new(HashMap::new()),
            events,
            playing,
            shutdown: shutdown.clone(),
        });

        if settings.react_to_triggers {
            spawn_trigger_reactor(
                Arc::downgrade(&shared),
                store.observe_parameter(None, ParamKind::Play),
                shutdown.clone(),
            );
        }
        if settings.react_to_listener {
            spawn_listener_reactor(
                scheduler,
                store.observe_parameter(None, ParamKind::ListenerOrientation),
                store.observe_parameter(None, ParamKind::ListenerPosition),
                shutdown,
            );
        }

        Self { shared }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Play `node` until its session ends or is stopped. A node that is
    /// already playing is left alone.
    ///
    /// With `after`, playback starts once that node's session completes. If
    /// `after` is not playing, playback starts immediately.
    pub async fn play(&self, node: &NodeId, after: Option<&NodeId>) -> Result<(), PlayError> {
        let (player, done, wait_for) = {
            let mut sessions = self.shared.sessions.lock().unwrap();
            if sessions.contains_key(node) {
                debug!(node.id = %node, "already playing");
                return Ok(());
            }
            let player = HierarchicalPlayer::new(
                node.clone(),
                self.shared.store.clone(),
                self.shared.scheduler.clone(),
                EventSink::new(self.shared.events.clone()),
                self.shared.settings.log_navigation,
            );
            let (done, done_rx) = watch::channel(false);
            let wait_for = after.and_then(|after| sessions.get(after)).map(|e| e.done.clone());
            sessions.insert(
                node.clone(),
                SessionEntry {
                    player: player.clone(),
                    done: done_rx,
                },
            );
            (player, done, wait_for)
        };

        if let Some(mut previous) = wait_for {
            // An error means the previous session went away without finishing
            let _ = previous.wait_for(|finished| *finished).await;
        }

        info!(session.id = %player.id(), node.id = %node, "playing");
        let result = player.play().await;
        done.send_replace(true);
        self.deregister(node, &player);
        result.map(|_| ())
    }

    /// Stop `node`'s session, or every session when `node` is `None`.
    ///
    /// Stopping everything clears the published playing ids right away,
    /// without waiting for each object to settle.
    pub async fn stop(&self, node: Option<&NodeId>) {
        match node {
            Some(node) => {
                let entry = self.shared.sessions.lock().unwrap().remove(node);
                if let Some(entry) = entry {
                    info!(session.id = %entry.player.id(), node.id = %node, "stopping");
                    entry.player.stop().await;
                }
            }
            None => {
                let players: Vec<HierarchicalPlayer> = self
                    .shared
                    .sessions
                    .lock()
                    .unwrap()
                    .drain()
                    .map(|(_, entry)| entry.player)
                    .collect();
                info!(sessions = players.len(), "stopping all");
                self.shared.playing.send_replace(Vec::new());
                let _ = self.shared.events.send(PlayingEvent::Reset);
                join_all(players.iter().map(|player| player.stop())).await;
            }
        }
    }

    /// Whether `node` has a session, or any session exists for `None`.
    pub fn is_playing(&self, node: Option<&NodeId>) -> bool {
        let sessions = self.shared.sessions.lock().unwrap();
        match node {
            Some(node) => sessions.contains_key(node),
            None => !sessions.is_empty(),
        }
    }

    /// Navigator position of `node`'s session, if it is playing.
    pub fn position(&self, node: &NodeId) -> Option<usize> {
        let sessions = self.shared.sessions.lock().unwrap();
        sessions.get(node).and_then(|entry| entry.player.position())
    }

    /// Nodes with a registered session.
    pub fn sessions(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.shared.sessions.lock().unwrap().keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Ids sounding right now.
    pub fn current_playing_ids(&self) -> Vec<NodeId> {
        self.shared.playing.borrow().clone()
    }

    /// Receiver holding the sounding ids and notified on every change.
    pub fn playing_ids(&self) -> watch::Receiver<Vec<NodeId>> {
        self.shared.playing.subscribe()
    }

    /// The sounding ids as a stream, starting with the current set.
    pub fn playing_ids_stream(&self) -> WatchStream<Vec<NodeId>> {
        WatchStream::new(self.playing_ids())
    }

    fn deregister(&self, node: &NodeId, player: &HierarchicalPlayer) {
        let mut sessions = self.shared.sessions.lock().unwrap();
        if sessions
            .get(node)
            .is_some_and(|entry| entry.player.same_session(player))
        {
            sessions.remove(node);
        }
    }
}
