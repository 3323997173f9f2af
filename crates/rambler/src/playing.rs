//! Aggregation of the ids currently sounding.
//!
//! Every session of a [`crate::MultiPlayer`] reports object starts and ends
//! into one channel. A single task consumes it, keeps the live objects with
//! the ids they cover, and republishes the de-duplicated, naturally sorted
//! union on a watch channel.

use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::scheduler::{same_object, ObjectEvent, ScheduledRef};
use crate::vocab::NodeId;

#[derive(Debug)]
pub(crate) enum PlayingEvent {
    Object(ObjectEvent),
    /// Forget every object, as after stopping all sessions.
    Reset,
}

struct PlayingSet {
    objects: Vec<(ScheduledRef, Vec<NodeId>)>,
    tx: Arc<watch::Sender<Vec<NodeId>>>,
}

impl PlayingSet {
    async fn apply(&mut self, event: PlayingEvent) {
        match event {
            PlayingEvent::Object(ObjectEvent::Started(object)) => {
                let uris = object.get_uris().await;
                self.objects.push((object, uris));
                self.publish();
            }
            PlayingEvent::Object(ObjectEvent::Ended(object)) => {
                let index = self.objects.iter().position(|(o, _)| same_object(o, &object));
                if let Some(index) = index {
                    self.objects.remove(index);
                    self.publish();
                }
            }
            PlayingEvent::Reset => {
                self.objects.clear();
                self.publish();
            }
        }
    }

    fn publish(&self) {
        let mut ids: Vec<NodeId> = self
            .objects
            .iter()
            .flat_map(|(_, uris)| uris.iter().cloned())
            .collect();
        ids.sort_by(|a, b| natural_cmp(a.as_str(), b.as_str()));
        ids.dedup();
        trace!(count = ids.len(), "playing ids changed");
        self.tx.send_replace(ids);
    }
}

pub(crate) fn spawn_aggregator(
    mut rx: mpsc::UnboundedReceiver<PlayingEvent>,
    tx: Arc<watch::Sender<Vec<NodeId>>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut set = PlayingSet {
            objects: Vec::new(),
            tx,
        };
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            set.apply(event).await;
        }
    })
}

/// Order strings with digit runs compared by value, so `n2 < n10`.
/// Strings that compare equal that way fall back to byte order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = compare_chunks(x, y);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn compare_chunks(x: &str, y: &str) -> Ordering {
    let numeric = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if numeric(x) && numeric(y) {
        let x = x.trim_start_matches('0');
        let y = y.trim_start_matches('0');
        x.len().cmp(&y.len()).then_with(|| x.cmp(y))
    } else {
        x.cmp(y)
    }
}

/// Split into alternating runs of ASCII digits and everything else.
fn chunks(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map_or(rest.len(), |(i, _)| i);
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_order() {
        let mut ids = vec!["dymo10", "dymo2", "dymo1", "dymo12", "alpha", "dymo02"];
        ids.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(ids, vec!["alpha", "dymo1", "dymo02", "dymo2", "dymo10", "dymo12"]);
    }

    #[test]
    fn test_chunks() {
        let parts: Vec<&str> = chunks("ab12c3").collect();
        assert_eq!(parts, vec!["ab", "12", "c", "3"]);
        assert_eq!(chunks("").count(), 0);
    }

    #[test]
    fn test_equal_by_value_is_still_total() {
        assert_eq!(natural_cmp("a1", "a1"), Ordering::Equal);
        assert_ne!(natural_cmp("a01", "a1"), Ordering::Equal);
        assert_eq!(natural_cmp("a9", "a10"), Ordering::Less);
    }
}
