use crate::config::Config;
use crate::coordinator::BatchOptions;
use crate::coordinator::test_helpers::{
    MockFetcher, create_test_coordinator_with, sources, test_config, wait_until,
};
use crate::types::DispatchClass;
use std::time::Duration;

fn serial_config() -> Config {
    Config {
        max_concurrent_fetches: 1,
        ..test_config()
    }
}

// --- dispatch order ---

#[tokio::test]
async fn test_same_class_runs_in_fifo_order() {
    let (fetcher, gate) = MockFetcher::new().gated();
    let coordinator = create_test_coordinator_with(serial_config(), fetcher.clone());
    let all = sources(&["1", "2", "3", "4"]);

    let handle = coordinator.run_batch(all.clone(), |_| {}).await.unwrap();
    gate.add_permits(4);
    handle.wait().await.unwrap();

    assert_eq!(fetcher.calls(), all);
}

#[tokio::test]
async fn test_user_initiated_batch_jumps_the_queue() {
    let (fetcher, gate) = MockFetcher::new().gated();
    let coordinator = create_test_coordinator_with(serial_config(), fetcher.clone());

    let background = sources(&["bg1", "bg2", "bg3"]);
    let urgent = sources(&["urgent"]);

    let background_handle = coordinator
        .run_batch_with(
            background.clone(),
            BatchOptions::default().with_class(DispatchClass::Utility),
            |_| {},
        )
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || fetcher.call_count() == 1).await,
        "first background task should be running"
    );

    let urgent_handle = coordinator
        .run_batch_with(
            urgent.clone(),
            BatchOptions::default().with_class(DispatchClass::UserInitiated),
            |_| {},
        )
        .await
        .unwrap();

    gate.add_permits(4);
    urgent_handle.wait().await.unwrap();
    background_handle.wait().await.unwrap();

    assert_eq!(
        fetcher.calls(),
        vec![
            background[0].clone(),
            urgent[0].clone(),
            background[1].clone(),
            background[2].clone(),
        ],
        "user-initiated work runs before queued utility work"
    );
}

#[tokio::test]
async fn test_default_class_comes_from_config() {
    let (fetcher, gate) = MockFetcher::new().gated();
    let config = Config {
        default_class: DispatchClass::UserInitiated,
        ..serial_config()
    };
    let coordinator = create_test_coordinator_with(config, fetcher.clone());

    let first = sources(&["first"]);
    let utility = sources(&["utility"]);
    let default = sources(&["default"]);

    let first_handle = coordinator.run_batch(first.clone(), |_| {}).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || fetcher.call_count() == 1).await);

    let utility_handle = coordinator
        .run_batch_with(
            utility.clone(),
            BatchOptions::default().with_class(DispatchClass::Utility),
            |_| {},
        )
        .await
        .unwrap();
    let default_handle = coordinator.run_batch(default.clone(), |_| {}).await.unwrap();

    gate.add_permits(3);
    first_handle.wait().await.unwrap();
    utility_handle.wait().await.unwrap();
    default_handle.wait().await.unwrap();

    assert_eq!(
        fetcher.calls(),
        vec![first[0].clone(), default[0].clone(), utility[0].clone()]
    );
}

// --- queue bookkeeping ---

#[tokio::test]
async fn test_queued_len_tracks_pending_and_withdrawn_tasks() {
    let (fetcher, gate) = MockFetcher::new().gated();
    let coordinator = create_test_coordinator_with(serial_config(), fetcher.clone());

    let handle = coordinator
        .run_batch(sources(&["a", "b", "c"]), |_| {})
        .await
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || fetcher.call_count() == 1).await);
    assert_eq!(coordinator.queued_len().await, 2);

    assert!(handle.cancel(1).await);
    assert_eq!(coordinator.queued_len().await, 1);

    gate.add_permits(2);
    handle.wait().await.unwrap();
    assert_eq!(coordinator.queued_len().await, 0);
}
