//! Producer outbox -> bus -> consumer inbox.

use std::sync::Arc;

use sourced_outbox::bus::InMemoryBus;
use sourced_outbox::{
    BusPublisher, CancellationToken, Codec, EventTypeRegistry, InMemoryStore, InboxProcessor,
    InboxWriter, Mailbox, MessageStatus, OutboxDispatcher,
};

use crate::support::{init_tracing, registry, status_counts, Order, OrderCompleted, Recording};

#[tokio::test]
async fn event_travels_from_outbox_to_inbox_once() {
    init_tracing();
    let registry = registry();
    let producer = InMemoryStore::new();
    let consumer_store = InMemoryStore::new();
    let bus = InMemoryBus::new();

    let mut order = Order::new("X");
    order.events.set_correlation_id("checkout-7");
    order.complete();
    let ids = producer.commit(&registry, &mut order).unwrap();

    let dispatcher = OutboxDispatcher::new(
        Arc::new(producer.clone()),
        registry.clone(),
        BusPublisher::new(bus.clone()),
    );
    dispatcher.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(status_counts(&producer, Mailbox::Outbox).await, (0, 1, 0));

    // The broker loses the ack and delivers the same envelope again.
    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, ids[0]);
    bus.redeliver(published[0].clone()).unwrap();

    let writer = InboxWriter::new(Arc::new(consumer_store.clone()));
    let drained = writer.drain(&bus).await.unwrap();
    assert_eq!((drained.accepted, drained.duplicates), (1, 1));

    let consumer = Recording::new();
    InboxProcessor::new(Arc::new(consumer_store.clone()), registry, consumer.clone())
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    let events = consumer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message_id, ids[0]);
    assert_eq!(events[0].meta("correlation_id"), Some("checkout-7"));
    assert_eq!(
        events[0].downcast_ref::<OrderCompleted>().map(|e| e.order_id.as_str()),
        Some("X")
    );
    assert_eq!(status_counts(&consumer_store, Mailbox::Inbox).await, (0, 1, 0));
}

#[tokio::test]
async fn transport_failure_leaves_record_failed() {
    init_tracing();
    let registry = registry();
    let producer = InMemoryStore::new();
    let bus = InMemoryBus::new();
    let mut order = Order::new("X");
    order.complete();
    let ids = producer.commit(&registry, &mut order).unwrap();

    bus.fail_next(1);
    OutboxDispatcher::new(
        Arc::new(producer.clone()),
        registry,
        BusPublisher::new(bus.clone()),
    )
    .run_cycle(&CancellationToken::new())
    .await
    .unwrap();

    assert!(bus.is_empty());
    let record = producer.records(Mailbox::Outbox).unwrap().remove(0);
    assert_eq!(record.id, ids[0]);
    assert_eq!(record.status, MessageStatus::Failed);
    assert!(record
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("connection failed: injected failure"));
}

#[tokio::test]
async fn bitcode_on_both_sides() {
    init_tracing();
    let producer_registry = registry();
    let consumer_registry = Arc::new(EventTypeRegistry::new());
    consumer_registry
        .register_with_codec::<OrderCompleted>(Codec::Bitcode)
        .unwrap();

    let producer = InMemoryStore::new();
    let consumer_store = InMemoryStore::new();
    let bus = InMemoryBus::new();

    let mut order = Order::new("Y");
    order.complete();
    producer.commit(&producer_registry, &mut order).unwrap();

    OutboxDispatcher::new(
        Arc::new(producer),
        producer_registry,
        BusPublisher::new(bus.clone()).with_codec(Codec::Bitcode),
    )
    .run_cycle(&CancellationToken::new())
    .await
    .unwrap();

    InboxWriter::new(Arc::new(consumer_store.clone()))
        .drain(&bus)
        .await
        .unwrap();
    let consumer = Recording::new();
    InboxProcessor::new(Arc::new(consumer_store), consumer_registry, consumer.clone())
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        consumer.events()[0].downcast_ref::<OrderCompleted>(),
        Some(&OrderCompleted {
            order_id: "Y".into()
        })
    );
}
