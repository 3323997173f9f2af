use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use ramblerconf::SchedulerSettings;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{ScheduledObject, ScheduledRef, Scheduler, SessionContext};
use crate::error::ScheduleError;
use crate::vocab::{NodeId, ParamKind};

/// Timer-driven scheduler that records what it was asked to play.
///
/// Only nodes with an audio source path are scheduled. Each schedule call
/// waits one delay before creating its object; the object starts at once
/// and ends one delay later. Ids are logged with the instant they were
/// scheduled at, so tests can read back which leaves sounded together.
pub struct DummyScheduler {
    delay: Duration,
    require_sources: bool,
    scheduled: Mutex<Vec<(Instant, NodeId)>>,
    orientation: Mutex<Option<([f64; 3], [f64; 3])>>,
    position: Mutex<Option<[f64; 3]>>,
}

impl DummyScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            require_sources: false,
            scheduled: Mutex::new(Vec::new()),
            orientation: Mutex::new(None),
            position: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self::new(Duration::from_millis(settings.object_delay_ms))
    }

    /// Reject nodes without a source path instead of skipping them.
    pub fn require_sources(mut self, require: bool) -> Self {
        self.require_sources = require;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Every scheduled id, in scheduling order.
    pub fn scheduled_ids(&self) -> Vec<NodeId> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Scheduled ids grouped by the moment they were scheduled. Entries less
    /// than half a delay apart share a group.
    pub fn scheduled_groups(&self) -> Vec<Vec<NodeId>> {
        let scheduled = self.scheduled.lock().unwrap();
        let mut groups: Vec<Vec<NodeId>> = Vec::new();
        let mut last: Option<Instant> = None;
        for (at, id) in scheduled.iter() {
            match (last, groups.last_mut()) {
                (Some(prev), Some(group)) if at.duration_since(prev) < self.delay / 2 => {
                    group.push(id.clone())
                }
                _ => groups.push(vec![id.clone()]),
            }
            last = Some(*at);
        }
        groups
    }

    pub fn clear(&self) {
        self.scheduled.lock().unwrap().clear();
    }

    pub fn listener_orientation(&self) -> Option<([f64; 3], [f64; 3])> {
        *self.orientation.lock().unwrap()
    }

    pub fn listener_position(&self) -> Option<[f64; 3]> {
        *self.position.lock().unwrap()
    }
}

#[async_trait]
impl Scheduler for DummyScheduler {
    async fn schedule(
        &self,
        node: &NodeId,
        _anchor: Option<ScheduledRef>,
        ctx: SessionContext,
    ) -> Result<Option<ScheduledRef>, ScheduleError> {
        let source = ctx
            .store()
            .find_source_path(node)
            .await
            .map_err(|e| ScheduleError::Rejected {
                node: node.clone(),
                reason: e.to_string(),
            })?;
        if source.is_none() {
            if self.require_sources {
                return Err(ScheduleError::NoSource(node.clone()));
            }
            return Ok(None);
        }

        tokio::time::sleep(self.delay).await;

        let object = DummyObject::new(node.clone(), ctx, self.delay);
        self.scheduled
            .lock()
            .unwrap()
            .push((Instant::now(), node.clone()));
        debug!(node.id = %node, "scheduled");

        let handle: ScheduledRef = object.clone();
        object.ctx.object_started(handle.clone());
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            object.end();
        });
        Ok(Some(handle))
    }

    fn set_listener_orientation(&self, forward: [f64; 3], up: [f64; 3]) {
        *self.orientation.lock().unwrap() = Some((forward, up));
    }

    fn set_listener_position(&self, position: [f64; 3]) {
        *self.position.lock().unwrap() = Some(position);
    }
}

struct DummyObject {
    node: NodeId,
    ctx: SessionContext,
    length: Duration,
    ended: AtomicBool,
    me: Weak<DummyObject>,
}

impl DummyObject {
    fn new(node: NodeId, ctx: SessionContext, length: Duration) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            node,
            ctx,
            length,
            ended: AtomicBool::new(false),
            me: me.clone(),
        })
    }

    fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            let handle: ScheduledRef = me;
            self.ctx.object_ended(&handle);
        }
    }
}

#[async_trait]
impl ScheduledObject for DummyObject {
    fn node(&self) -> &NodeId {
        &self.node
    }

    async fn get_param(&self, kind: ParamKind) -> Option<f64> {
        match kind {
            ParamKind::Duration => Some(self.length.as_secs_f64()),
            _ => None,
        }
    }

    async fn stop(&self) {
        self.end();
    }

    async fn get_uris(&self) -> Vec<NodeId> {
        let mut uris = vec![self.node.clone()];
        match self.ctx.store().find_all_parents(&self.node).await {
            Ok(parents) => uris.extend(parents),
            Err(e) => warn!(node.id = %self.node, error = %e, "could not resolve ancestors"),
        }
        uris
    }
}
