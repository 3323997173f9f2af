//! Side-channel parameter reactions of a [`crate::MultiPlayer`]: play
//! triggers and the listener pose.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::multi_player::{MultiPlayer, Shared};
use crate::scheduler::Scheduler;
use crate::store::{ParameterChange, ParameterSubscription};
use crate::vocab::ParamValue;

/// Play or stop the owner of each changed trigger parameter.
pub(crate) fn spawn_trigger_reactor(
    player: Weak<Shared>,
    mut triggers: ParameterSubscription,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                _ = shutdown.cancelled() => break,
                change = triggers.changed() => match change {
                    Some(change) => change,
                    None => break,
                },
            };
            let Some(shared) = player.upgrade() else {
                break;
            };
            on_trigger(MultiPlayer::from_shared(shared), change);
        }
    })
}

fn on_trigger(player: MultiPlayer, change: ParameterChange) {
    let Some(node) = change.owner else {
        warn!("trigger change without an owning node, ignoring");
        return;
    };
    let start = change.value.as_f64().is_some_and(|v| v > 0.0);
    debug!(node.id = %node, start, "trigger changed");
    tokio::spawn(async move {
        if start {
            if let Err(e) = player.play(&node, None).await {
                warn!(node.id = %node, error = %e, "triggered playback failed");
            }
        } else {
            player.stop(Some(&node)).await;
        }
    });
}

/// Forward listener orientation and position changes to the scheduler.
pub(crate) fn spawn_listener_reactor(
    scheduler: Arc<dyn Scheduler>,
    mut orientation: ParameterSubscription,
    mut position: ParameterSubscription,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                change = orientation.changed() => match change {
                    Some(change) => match orientation_vectors(&change.value) {
                        Some((forward, up)) => scheduler.set_listener_orientation(forward, up),
                        None => warn!(value = ?change.value, "unusable listener orientation"),
                    },
                    None => break,
                },
                change = position.changed() => match change {
                    Some(change) => match change.value.as_vec3() {
                        Some(xyz) => scheduler.set_listener_position(xyz),
                        None => warn!(value = ?change.value, "unusable listener position"),
                    },
                    None => break,
                },
            }
        }
    })
}

/// A six-value list is `forward ++ up`. A scalar is a heading in degrees
/// around the vertical axis, zero facing -z.
pub(crate) fn orientation_vectors(value: &ParamValue) -> Option<([f64; 3], [f64; 3])> {
    match value {
        ParamValue::List(v) if v.len() == 6 => Some(([v[0], v[1], v[2]], [v[3], v[4], v[5]])),
        ParamValue::Number(degrees) => {
            let radians = degrees.to_radians();
            Some(([radians.sin(), 0.0, -radians.cos()], [0.0, 1.0, 0.0]))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 3], b: [f64; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn test_heading_in_degrees() {
        let (forward, up) = orientation_vectors(&ParamValue::Number(0.0)).unwrap();
        assert!(close(forward, [0.0, 0.0, -1.0]));
        assert_eq!(up, [0.0, 1.0, 0.0]);

        let (forward, _) = orientation_vectors(&ParamValue::Number(90.0)).unwrap();
        assert!(close(forward, [1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_full_orientation_passes_through() {
        let value = ParamValue::List(vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(
            orientation_vectors(&value),
            Some(([0.0, 0.0, 1.0], [0.0, 1.0, 0.0]))
        );
        assert_eq!(orientation_vectors(&ParamValue::List(vec![1.0])), None);
        assert_eq!(orientation_vectors(&ParamValue::Flag(true)), None);
    }
}
