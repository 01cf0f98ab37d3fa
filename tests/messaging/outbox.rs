//! Outbox dispatch loop behaviour.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sourced_outbox::{
    CancellationToken, InMemoryStore, Mailbox, MessageRecord, MessageStatus, MessageStore,
    OutboxDispatcher,
};

use crate::support::{
    init_tracing, registry, seed_ticks, status_counts, tick_numbers, tick_record, Order,
    OrderCompleted, Recording,
};

fn dispatcher(store: &InMemoryStore, publisher: Recording) -> OutboxDispatcher<Recording> {
    OutboxDispatcher::new(Arc::new(store.clone()), registry(), publisher)
}

#[tokio::test]
async fn healthy_cycle_marks_record_done() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 1).await;
    let publisher = Recording::new();
    let before = Utc::now();

    let report = dispatcher(&store, publisher.clone())
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.done, 1);
    assert_eq!(publisher.calls(), 1);
    let record = &store.records(Mailbox::Outbox).unwrap()[0];
    assert_eq!(record.status, MessageStatus::Done);
    assert!(record.last_attempt_at.unwrap() >= before);
    assert!(record.last_error.is_none());
}

#[tokio::test]
async fn publish_error_marks_failed_and_is_not_retried() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 1).await;
    let publisher = Recording::new();
    publisher.set_fail_all(true);
    let dispatcher = dispatcher(&store, publisher.clone());

    for _ in 0..3 {
        dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();
    }

    assert_eq!(publisher.calls(), 1);
    let record = &store.records(Mailbox::Outbox).unwrap()[0];
    assert_eq!(record.status, MessageStatus::Failed);
    assert!(record.last_attempt_at.is_some());
    assert_eq!(
        record.last_error.as_deref(),
        Some("connection failed: broker unreachable")
    );
}

#[tokio::test]
async fn failing_record_does_not_stop_the_batch() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 3).await;
    let middle = store.records(Mailbox::Outbox).unwrap()[1].id.clone();
    let publisher = Recording::new();
    publisher.fail_id(&middle);

    let report = dispatcher(&store, publisher.clone())
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((report.done, report.failed), (2, 1));
    assert_eq!(tick_numbers(&publisher.events()), vec![0, 2]);
    assert_eq!(status_counts(&store, Mailbox::Outbox).await, (0, 2, 1));
}

#[tokio::test]
async fn unregistered_tag_never_reaches_publisher() {
    init_tracing();
    let store = InMemoryStore::new();
    store
        .insert(
            Mailbox::Outbox,
            MessageRecord::outbox("InvoiceIssued", br#"{"invoice":"I-1"}"#.to_vec()),
        )
        .await
        .unwrap();
    let publisher = Recording::new();

    dispatcher(&store, publisher.clone())
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(publisher.calls(), 0);
    let record = &store.records(Mailbox::Outbox).unwrap()[0];
    assert_eq!(record.status, MessageStatus::Failed);
    assert_eq!(
        record.last_error.as_deref(),
        Some("event type `InvoiceIssued` is not registered")
    );
}

#[tokio::test]
async fn malformed_payload_fails_without_publishing() {
    init_tracing();
    let store = InMemoryStore::new();
    store
        .insert(
            Mailbox::Outbox,
            MessageRecord::outbox("OrderCompleted", br#"{"order":"X"}"#.to_vec()),
        )
        .await
        .unwrap();
    let publisher = Recording::new();

    dispatcher(&store, publisher.clone())
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(publisher.calls(), 0);
    let record = &store.records(Mailbox::Outbox).unwrap()[0];
    assert!(record.is_failed());
    assert!(record
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("failed to decode `OrderCompleted` payload: invalid JSON payload"));
}

#[tokio::test]
async fn terminal_records_are_never_selected_again() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 2).await;
    let first = store.records(Mailbox::Outbox).unwrap()[0].id.clone();
    let publisher = Recording::new();
    publisher.fail_id(&first);
    let dispatcher = dispatcher(&store, publisher.clone());

    dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();
    let report = dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();

    assert!(report.is_idle());
    assert_eq!(publisher.calls(), 2);
    assert!(store.select_batch(Mailbox::Outbox, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_is_capped_at_batch_size() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 150).await;
    let publisher = Recording::new();
    let dispatcher = dispatcher(&store, publisher.clone());

    let first = dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(first.selected, 100);
    assert_eq!(status_counts(&store, Mailbox::Outbox).await, (50, 100, 0));

    let second = dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(second.selected, 50);
    assert_eq!(status_counts(&store, Mailbox::Outbox).await, (0, 150, 0));

    assert_eq!(tick_numbers(&publisher.events()), (0..150).collect::<Vec<_>>());
}

#[tokio::test]
async fn publishes_in_occurred_at_order() {
    init_tracing();
    let store = InMemoryStore::new();
    let t = Utc::now();
    // Inserted out of order; n is the age in seconds.
    for n in [2u32, 0, 4, 1, 3] {
        let at = t - Duration::seconds(n as i64);
        store
            .insert(Mailbox::Outbox, tick_record(Mailbox::Outbox, n, at))
            .await
            .unwrap();
    }
    let publisher = Recording::new();

    dispatcher(&store, publisher.clone())
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(tick_numbers(&publisher.events()), vec![4, 3, 2, 1, 0]);
}

#[tokio::test]
async fn order_completed_is_captured_and_published() {
    init_tracing();
    let store = InMemoryStore::new();
    let registry = crate::support::registry();
    let mut order = Order::new("X");
    order.complete();

    let ids = store.commit(&registry, &mut order).unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(store.aggregate("X").unwrap().unwrap()["completed"], true);

    let pending = &store.records(Mailbox::Outbox).unwrap()[0];
    assert_eq!(pending.status, MessageStatus::Pending);
    assert_eq!(pending.type_tag, "OrderCompleted");
    assert_eq!(pending.payload_str(), Some(r#"{"orderId":"X"}"#));

    let publisher = Recording::new();
    OutboxDispatcher::new(Arc::new(store.clone()), registry, publisher.clone())
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    let events = publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message_id, ids[0]);
    assert_eq!(
        events[0].downcast_ref::<OrderCompleted>(),
        Some(&OrderCompleted {
            order_id: "X".into()
        })
    );
    let done = store.get(Mailbox::Outbox, &ids[0]).await.unwrap().unwrap();
    assert_eq!(done.status, MessageStatus::Done);
}

#[tokio::test]
async fn unavailable_dependencies_skip_the_cycle() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 1).await;
    let publisher = Recording::new();
    let dispatcher = dispatcher(&store, publisher.clone());

    store.set_available(false);
    assert!(dispatcher.run_cycle(&CancellationToken::new()).await.unwrap().skipped);

    store.set_available(true);
    publisher.set_ready(false);
    assert!(dispatcher.run_cycle(&CancellationToken::new()).await.unwrap().skipped);
    assert_eq!(publisher.calls(), 0);

    publisher.set_ready(true);
    let report = dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.done, 1);
}

#[tokio::test]
async fn requeued_record_is_dispatched_again() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 1).await;
    let id = store.records(Mailbox::Outbox).unwrap()[0].id.clone();
    let publisher = Recording::new();
    publisher.set_fail_all(true);
    let dispatcher = dispatcher(&store, publisher.clone());

    dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(status_counts(&store, Mailbox::Outbox).await, (0, 0, 1));

    publisher.set_fail_all(false);
    let requeued = store
        .requeue_failed(Mailbox::Outbox, &[id.clone()])
        .await
        .unwrap();
    assert_eq!(requeued, 1);

    dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();
    let record = store.get(Mailbox::Outbox, &id).await.unwrap().unwrap();
    assert_eq!(record.status, MessageStatus::Done);
    assert!(record.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn concurrent_attempts_start_in_timestamp_order() {
    init_tracing();
    let store = InMemoryStore::new();
    seed_ticks(&store, Mailbox::Outbox, 6).await;
    let publisher = Recording::new().with_delay(std::time::Duration::from_millis(50));

    let started_at = tokio::time::Instant::now();
    let report = dispatcher(&store, publisher.clone())
        .with_concurrency(3)
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started_at.elapsed();

    assert_eq!(report.done, 6);
    assert_eq!(tick_numbers(&publisher.started()), vec![0, 1, 2, 3, 4, 5]);
    // Two waves of three overlapping attempts.
    assert!(elapsed >= std::time::Duration::from_millis(100));
    assert!(elapsed < std::time::Duration::from_millis(150));
    assert_eq!(status_counts(&store, Mailbox::Outbox).await, (0, 6, 0));
}
