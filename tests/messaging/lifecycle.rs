//! Spawned loops: polling, cancellation and shutdown.

use std::sync::Arc;
use std::time::Duration;

use sourced_outbox::{
    CancellationToken, InMemoryStore, InboxProcessor, Mailbox, MessagingConfig, OutboxDispatcher,
};

use crate::support::{init_tracing, registry, seed_ticks, status_counts, Recording};

#[tokio::test(start_paused = true)]
async fn loops_pick_up_new_records_each_interval() {
    init_tracing();
    let store = InMemoryStore::new();
    let publisher = Recording::new();
    let worker = OutboxDispatcher::new(Arc::new(store.clone()), registry(), publisher.clone())
        .with_poll_interval(Duration::from_millis(100))
        .spawn();

    tokio::time::sleep(Duration::from_millis(10)).await;
    seed_ticks(&store, Mailbox::Outbox, 3).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(publisher.calls(), 3);
    let stats = worker.stop().await;
    assert_eq!(stats.messages_done, 3);
    assert_eq!(stats.cycles, 2);
}

#[tokio::test(start_paused = true)]
async fn shared_token_stops_both_loops() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 2).await;
    seed_ticks(&store, Mailbox::Inbox, 2).await;

    let config = MessagingConfig::from_toml_str(
        r#"
        [outbox]
        poll_interval_ms = 50

        [inbox]
        poll_interval_ms = 80
        "#,
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let outbox = OutboxDispatcher::new(Arc::new(store.clone()), registry(), Recording::new())
        .with_config(config.outbox.clone())
        .spawn_with(cancel.clone());
    let inbox = InboxProcessor::new(Arc::new(store.clone()), registry(), Recording::new())
        .with_config(config.inbox.clone())
        .spawn_with(cancel.clone());

    tokio::time::sleep(Duration::from_millis(220)).await;
    cancel.cancel();

    let (outbox_stats, inbox_stats) = tokio::join!(outbox.stop(), inbox.stop());
    assert_eq!(outbox_stats.messages_done, 2);
    assert_eq!(inbox_stats.messages_done, 2);
    assert_eq!(outbox_stats.cycles, 5);
    assert_eq!(inbox_stats.cycles, 3);
}

#[tokio::test(start_paused = true)]
async fn in_flight_batch_is_finished_before_stopping() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 3).await;
    let publisher = Recording::new().with_delay(Duration::from_millis(100));
    let worker = OutboxDispatcher::new(Arc::new(store.clone()), registry(), publisher.clone())
        .spawn();

    // Mid-way through the second record.
    tokio::time::sleep(Duration::from_millis(150)).await;
    worker.signal_stop();
    let stats = worker.stop().await;

    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.messages_done, 3);
    assert_eq!(status_counts(&store, Mailbox::Outbox).await, (0, 3, 0));
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_runs_no_cycle() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 1).await;
    let publisher = Recording::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = OutboxDispatcher::new(Arc::new(store.clone()), registry(), publisher.clone())
        .run(cancel)
        .await;

    assert_eq!(stats.cycles, 0);
    assert_eq!(publisher.calls(), 0);
    assert_eq!(status_counts(&store, Mailbox::Outbox).await, (1, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn store_outage_is_survived() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 1).await;
    store.set_available(false);
    let worker = OutboxDispatcher::new(Arc::new(store.clone()), registry(), Recording::new())
        .with_poll_interval(Duration::from_millis(100))
        .spawn();

    tokio::time::sleep(Duration::from_millis(250)).await;
    store.set_available(true);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = worker.stop().await;
    assert_eq!(stats.skipped_cycles, 3);
    assert_eq!(stats.messages_done, 1);
    assert_eq!(status_counts(&store, Mailbox::Outbox).await, (0, 1, 0));
}
