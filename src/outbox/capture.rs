//! Transactional capture: persist an aggregate's state together with the
//! events it raised.
//!
//! An aggregate collects events in an [`EventBuffer`] while it handles a
//! command. [`InMemoryStore::commit`] then writes the new state and one
//! pending outbox row per event in a single transaction, so an event is
//! recorded if and only if the state change that produced it is.
//!
//! ```ignore
//! impl Order {
//!     pub fn complete(&mut self) {
//!         self.status = OrderStatus::Completed;
//!         self.events.raise(OrderCompleted { order_id: self.id.clone() });
//!     }
//! }
//!
//! order.complete();
//! let message_ids = store.commit(&registry, &mut order)?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::error::StoreError;
use crate::message::{Mailbox, MessageRecord};
use crate::registry::{ErasedEvent, EventPayload, EventTypeRegistry, RegistryError};
use crate::store::InMemoryStore;

/// An event raised by an aggregate and not yet committed.
#[derive(Clone)]
pub struct PendingEvent {
    pub type_tag: String,
    pub occurred_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
    event: Arc<dyn ErasedEvent>,
}

impl fmt::Debug for PendingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEvent")
            .field("type_tag", &self.type_tag)
            .field("occurred_at", &self.occurred_at)
            .field("event", &self.event)
            .finish()
    }
}

impl PendingEvent {
    pub fn new<T: EventPayload>(event: T) -> Self {
        Self {
            type_tag: T::TYPE_TAG.to_string(),
            occurred_at: Utc::now(),
            metadata: BTreeMap::new(),
            event: Arc::new(event),
        }
    }

    pub fn event(&self) -> &dyn ErasedEvent {
        self.event.as_ref()
    }

    fn to_record(&self, registry: &EventTypeRegistry) -> Result<MessageRecord, RegistryError> {
        let payload = registry.resolve(&self.type_tag)?.encode(self.event())?;
        Ok(MessageRecord::outbox(self.type_tag.clone(), payload)
            .with_timestamp(self.occurred_at)
            .with_metadata(self.metadata.clone()))
    }
}

/// Events raised since the last commit, oldest first.
#[derive(Debug, Default, Clone)]
pub struct EventBuffer {
    events: Vec<PendingEvent>,
    metadata: BTreeMap<String, String>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event. Its `occurred_at` is kept strictly after the
    /// previously raised event's, so raise order survives a clock tie.
    pub fn raise<T: EventPayload>(&mut self, event: T) {
        let mut pending = PendingEvent::new(event);
        pending.metadata = self.metadata.clone();
        if let Some(last) = self.events.last() {
            if pending.occurred_at <= last.occurred_at {
                pending.occurred_at = last.occurred_at + Duration::microseconds(1);
            }
        }
        self.events.push(pending);
    }

    /// Tag every event raised from now on with a correlation id.
    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.metadata
            .insert(MessageRecord::CORRELATION_ID.to_string(), id.into());
    }

    pub fn set_causation_id(&mut self, id: impl Into<String>) {
        self.metadata
            .insert(MessageRecord::CAUSATION_ID.to_string(), id.into());
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEvent> {
        self.events.iter()
    }

    pub fn take(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.events)
    }

    /// Put back events from a failed commit ahead of anything raised since.
    pub fn restore(&mut self, mut events: Vec<PendingEvent>) {
        events.append(&mut self.events);
        self.events = events;
    }
}

/// A domain object whose state changes are committed with their events.
pub trait Aggregate {
    fn aggregate_id(&self) -> &str;

    /// Snapshot written to the store on commit.
    fn state(&self) -> Result<serde_json::Value, serde_json::Error>;

    fn pending_events_mut(&mut self) -> &mut EventBuffer;

    fn take_pending_events(&mut self) -> Vec<PendingEvent> {
        self.pending_events_mut().take()
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to serialize state of aggregate {aggregate_id}")]
    State {
        aggregate_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode event")]
    Registry(#[from] RegistryError),
    #[error("failed to write commit")]
    Store(#[from] StoreError),
}

impl InMemoryStore {
    /// Write the aggregate's state and one pending outbox row per raised
    /// event in one transaction. Returns the new message ids in raise order.
    ///
    /// On error nothing is written and the events go back into the
    /// aggregate's buffer.
    pub fn commit<A: Aggregate + ?Sized>(
        &self,
        registry: &EventTypeRegistry,
        aggregate: &mut A,
    ) -> Result<Vec<String>, CaptureError> {
        let aggregate_id = aggregate.aggregate_id().to_string();
        let state = aggregate
            .state()
            .map_err(|source| CaptureError::State {
                aggregate_id: aggregate_id.clone(),
                source,
            })?;

        let pending = aggregate.take_pending_events();
        let result = pending
            .iter()
            .map(|event| event.to_record(registry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(CaptureError::from)
            .and_then(|records| {
                self.transaction(|tx| {
                    tx.put_aggregate(aggregate_id.clone(), state);
                    let mut ids = Vec::with_capacity(records.len());
                    for record in records {
                        ids.push(record.id.clone());
                        tx.insert(Mailbox::Outbox, record)?;
                    }
                    Ok::<_, CaptureError>(ids)
                })
            });

        match result {
            Ok(ids) => {
                tracing::debug!(%aggregate_id, events = ids.len(), "aggregate committed");
                Ok(ids)
            }
            Err(err) => {
                aggregate.pending_events_mut().restore(pending);
                Err(err)
            }
        }
    }
}
