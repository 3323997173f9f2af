//! Scheduling collaborator contract.
//!
//! A [`Scheduler`] turns a leaf id plus a timing anchor into a
//! [`ScheduledObject`]. Objects report their start and end through the
//! [`SessionContext`] they were scheduled with, which keeps the owning
//! session's active list current and forwards the facts to the
//! [`crate::MultiPlayer`].

mod dummy;

pub use dummy::DummyScheduler;

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ScheduleError;
use crate::playing::PlayingEvent;
use crate::store::Store;
use crate::vocab::{NodeId, ParamKind};

pub type ScheduledRef = Arc<dyn ScheduledObject>;

/// A time-placed, stoppable unit produced by a [`Scheduler`].
#[async_trait]
pub trait ScheduledObject: Send + Sync + 'static {
    fn node(&self) -> &NodeId;

    /// Numeric parameter of the object, e.g. its duration in seconds.
    async fn get_param(&self, kind: ParamKind) -> Option<f64>;

    /// Stop playback. Stopping twice is a no-op.
    async fn stop(&self);

    /// The object's own id followed by its ancestors.
    async fn get_uris(&self) -> Vec<NodeId>;
}

#[async_trait]
pub trait Scheduler: Send + Sync + 'static {
    /// Place `node` relative to `anchor`. `Ok(None)` means there is nothing
    /// to play for this node.
    async fn schedule(
        &self,
        node: &NodeId,
        anchor: Option<ScheduledRef>,
        ctx: SessionContext,
    ) -> Result<Option<ScheduledRef>, ScheduleError>;

    fn set_listener_orientation(&self, forward: [f64; 3], up: [f64; 3]);

    fn set_listener_position(&self, position: [f64; 3]);
}

/// Whether two handles point at the same object.
pub fn same_object(a: &ScheduledRef, b: &ScheduledRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Start/end fact reported by a scheduled object.
#[derive(Clone)]
pub enum ObjectEvent {
    Started(ScheduledRef),
    Ended(ScheduledRef),
}

impl fmt::Debug for ObjectEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectEvent::Started(object) => f.debug_tuple("Started").field(object.node()).finish(),
            ObjectEvent::Ended(object) => f.debug_tuple("Ended").field(object.node()).finish(),
        }
    }
}

/// Where sessions forward object events. A detached sink drops them.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<PlayingEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<PlayingEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn detached() -> Self {
        Self::default()
    }

    fn send(&self, event: ObjectEvent) {
        if let Some(tx) = &self.tx {
            // Aggregator gone means nobody is listening anymore
            let _ = tx.send(PlayingEvent::Object(event));
        }
    }
}

/// Objects a session currently holds, in scheduling order.
#[derive(Default)]
pub(crate) struct ActiveObjects {
    objects: Mutex<Vec<ScheduledRef>>,
}

impl ActiveObjects {
    /// Append `objects` unless `cancel` fired. The check happens under the
    /// lock, so a concurrent stop either sees them in its drain or they are
    /// handed back here for the caller to stop.
    pub(crate) fn extend_unless_cancelled(
        &self,
        cancel: &CancellationToken,
        objects: Vec<ScheduledRef>,
    ) -> Vec<ScheduledRef> {
        let mut held = self.objects.lock().unwrap();
        if cancel.is_cancelled() {
            return objects;
        }
        held.extend(objects);
        Vec::new()
    }

    /// Like [`Self::extend_unless_cancelled`], replacing what is held.
    pub(crate) fn replace_unless_cancelled(
        &self,
        cancel: &CancellationToken,
        objects: Vec<ScheduledRef>,
    ) -> Vec<ScheduledRef> {
        let mut held = self.objects.lock().unwrap();
        if cancel.is_cancelled() {
            return objects;
        }
        *held = objects;
        Vec::new()
    }

    pub(crate) fn remove(&self, object: &ScheduledRef) -> bool {
        let mut objects = self.objects.lock().unwrap();
        match objects.iter().position(|o| same_object(o, object)) {
            Some(index) => {
                objects.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<ScheduledRef> {
        self.objects.lock().unwrap().clone()
    }

    pub(crate) fn drain(&self) -> Vec<ScheduledRef> {
        std::mem::take(&mut *self.objects.lock().unwrap())
    }
}

/// The calling session as seen by a [`Scheduler`].
#[derive(Clone)]
pub struct SessionContext {
    node: NodeId,
    init_ref_time: bool,
    active: Weak<ActiveObjects>,
    sink: EventSink,
    store: Arc<dyn Store>,
}

impl SessionContext {
    pub(crate) fn new(
        node: NodeId,
        init_ref_time: bool,
        active: Weak<ActiveObjects>,
        sink: EventSink,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            node,
            init_ref_time,
            active,
            sink,
            store,
        }
    }

    /// Context with no owning session, for driving a scheduler directly.
    pub fn detached(node: NodeId, store: Arc<dyn Store>) -> Self {
        Self::new(node, false, Weak::new(), EventSink::detached(), store)
    }

    /// Node of the session that asked for scheduling.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Whether the scheduler should restart relative timing here.
    pub fn init_ref_time(&self) -> bool {
        self.init_ref_time
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn object_started(&self, object: ScheduledRef) {
        self.sink.send(ObjectEvent::Started(object));
    }

    pub fn object_ended(&self, object: &ScheduledRef) {
        if let Some(active) = self.active.upgrade() {
            active.remove(object);
        }
        self.sink.send(ObjectEvent::Ended(object.clone()));
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("node", &self.node)
            .field("init_ref_time", &self.init_ref_time)
            .finish_non_exhaustive()
    }
}
