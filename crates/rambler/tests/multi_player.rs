mod common;

use std::time::Duration;

use common::{groups, id, Harness, DELAY};
use rambler::{NodeId, ParamKind};
use ramblerconf::PlayerSettings;
use tokio::time::{sleep, Instant};
use tokio_stream::StreamExt;

fn ids(numbers: &[u32]) -> Vec<NodeId> {
    numbers.iter().map(|&n| id(n)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_plays_share_one_session() {
    let h = Harness::new();
    let (id_a, id_b) = (id(1), id(1));
    let (a, b) = tokio::join!(h.player.play(&id_a, None), h.player.play(&id_b, None));
    a.unwrap();
    b.unwrap();
    assert_eq!(h.scheduler.scheduled_ids().len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_session() {
    let h = Harness::new();
    let player = h.player.clone();
    let handle = tokio::spawn(async move { player.play(&id(1), None).await });

    sleep(DELAY + DELAY / 2).await;
    assert!(h.player.is_playing(Some(&id(1))));
    assert!(h.player.is_playing(None));
    assert_eq!(h.player.sessions(), vec![id(1)]);

    h.player.stop(Some(&id(1))).await;
    assert!(!h.player.is_playing(Some(&id(1))));
    handle.await.unwrap().unwrap();
    assert!(!h.player.is_playing(None));
    assert_eq!(h.scheduled(), groups(&[&[5], &[6]]));

    // dymo6 landed after the stop; it must end now, not after its length
    sleep(Duration::from_millis(1)).await;
    assert!(h.player.current_playing_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stopping_unknown_node_is_noop() {
    let h = Harness::new();
    let player = h.player.clone();
    let handle = tokio::spawn(async move { player.play(&id(2), None).await });
    tokio::task::yield_now().await;

    h.player.stop(Some(&id(4))).await;
    assert!(h.player.is_playing(Some(&id(2))));
    handle.await.unwrap().unwrap();
    assert_eq!(h.scheduled(), groups(&[&[5], &[6]]));
}

#[tokio::test(start_paused = true)]
async fn test_reports_navigator_position() {
    let h = Harness::new();
    assert_eq!(h.player.position(&id(1)), None);

    let player = h.player.clone();
    let handle = tokio::spawn(async move { player.play(&id(1), None).await });

    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.player.position(&id(1)), Some(1));
    sleep(Duration::from_millis(60)).await;
    assert_eq!(h.player.position(&id(1)), Some(2));

    handle.await.unwrap().unwrap();
    assert_eq!(h.player.position(&id(1)), None);
}

#[tokio::test(start_paused = true)]
async fn test_publishes_sounding_ids_with_ancestors() {
    let h = Harness::new();
    let player = h.player.clone();
    let handle = tokio::spawn(async move { player.play(&id(1), None).await });

    sleep(Duration::from_millis(25)).await;
    assert_eq!(h.player.current_playing_ids(), ids(&[1, 2, 5]));

    handle.await.unwrap().unwrap();
    sleep(DELAY * 2 + DELAY / 2).await;
    assert!(h.player.current_playing_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publishes_ids_of_parallel_branches() {
    let h = Harness::new();
    h.store
        .set_combinator("dymo1", rambler::CombinatorKind::Conjunction, None);
    let player = h.player.clone();
    let handle = tokio::spawn(async move { player.play(&id(1), None).await });

    sleep(Duration::from_millis(25)).await;
    assert_eq!(h.player.current_playing_ids(), ids(&[1, 2, 3, 4, 5, 7, 10]));
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_playing_ids_stream_starts_with_current_set() {
    let h = Harness::new();
    let mut stream = h.player.playing_ids_stream();
    assert_eq!(stream.next().await, Some(Vec::new()));

    let player = h.player.clone();
    tokio::spawn(async move { player.play(&id(4), None).await });
    assert_eq!(stream.next().await, Some(ids(&[1, 4, 10])));
    assert_eq!(stream.next().await, Some(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn test_play_after_waits_for_previous_session() {
    let h = Harness::new();
    let player = h.player.clone();
    let first = tokio::spawn(async move { player.play(&id(2), None).await });
    tokio::task::yield_now().await;

    h.player.play(&id(4), Some(&id(2))).await.unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(h.scheduled(), groups(&[&[5], &[6], &[10]]));
}

#[tokio::test(start_paused = true)]
async fn test_play_after_inactive_node_starts_at_once() {
    let h = Harness::new();
    let start = Instant::now();
    h.player.play(&id(4), Some(&id(9))).await.unwrap();
    assert_eq!(start.elapsed(), DELAY);
    assert_eq!(h.scheduled(), groups(&[&[10]]));
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_clears_playing_ids() {
    let h = Harness::new();
    h.store.set_parameter(Some("dymo2"), ParamKind::Loop, true);
    h.store.set_parameter(Some("dymo4"), ParamKind::Loop, true);

    let handles: Vec<_> = [2, 4]
        .into_iter()
        .map(|n| {
            let player = h.player.clone();
            tokio::spawn(async move { player.play(&id(n), None).await })
        })
        .collect();

    sleep(DELAY * 3 + DELAY / 2).await;
    assert!(!h.player.current_playing_ids().is_empty());
    assert_eq!(h.player.sessions(), vec![id(2), id(4)]);

    h.player.stop(None).await;
    assert!(h.player.current_playing_ids().is_empty());
    assert!(!h.player.is_playing(None));
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    sleep(DELAY * 5).await;
    assert!(h.player.current_playing_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_play_trigger_starts_and_stops_nodes() {
    let h = Harness::new();
    h.store.set_parameter(Some("dymo2"), ParamKind::Loop, true);

    h.store.set_parameter(Some("dymo2"), ParamKind::Play, 1.0);
    sleep(DELAY + DELAY / 2).await;
    assert!(h.player.is_playing(Some(&id(2))));

    h.store.set_parameter(Some("dymo2"), ParamKind::Play, 0.0);
    sleep(DELAY).await;
    assert!(!h.player.is_playing(Some(&id(2))));

    let scheduled = h.scheduler.scheduled_ids().len();
    sleep(DELAY * 5).await;
    assert_eq!(h.scheduler.scheduled_ids().len(), scheduled);
}

#[tokio::test(start_paused = true)]
async fn test_play_trigger_ignored_when_disabled() {
    let h = Harness::with_settings(PlayerSettings {
        react_to_triggers: false,
        ..PlayerSettings::default()
    });
    h.store.set_parameter(Some("dymo2"), ParamKind::Play, 1.0);
    sleep(DELAY * 5).await;
    assert!(!h.player.is_playing(None));
    assert!(h.scheduler.scheduled_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_listener_pose_reaches_scheduler() {
    let h = Harness::new();
    h.store.set_parameter(None, ParamKind::ListenerOrientation, 90.0);
    h.store
        .set_parameter(None, ParamKind::ListenerPosition, vec![1.0, 2.0, 3.0]);
    sleep(Duration::from_millis(1)).await;

    let (forward, up) = h.scheduler.listener_orientation().unwrap();
    assert!((forward[0] - 1.0).abs() < 1e-9);
    assert!(forward[2].abs() < 1e-9);
    assert_eq!(up, [0.0, 1.0, 0.0]);
    assert_eq!(h.scheduler.listener_position(), Some([1.0, 2.0, 3.0]));
}

#[tokio::test(start_paused = true)]
async fn test_listener_pose_ignored_when_disabled() {
    let h = Harness::with_settings(PlayerSettings {
        react_to_listener: false,
        ..PlayerSettings::default()
    });
    h.store.set_parameter(None, ParamKind::ListenerPosition, vec![1.0, 2.0, 3.0]);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(h.scheduler.listener_position(), None);
}
