use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bus::{Envelope, InMemoryBus};
use crate::error::DeliveryError;
use crate::registry::{Codec, DecodedEvent};

/// Publishes decoded outbox events to an external system.
///
/// A returned error marks the record failed; it is not retried.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Whether the transport is reachable. The dispatcher skips the cycle
    /// when this returns `false`.
    async fn ready(&self) -> bool {
        true
    }

    async fn publish(&self, event: &DecodedEvent) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn ready(&self) -> bool {
        (**self).ready().await
    }

    async fn publish(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        (**self).publish(event).await
    }
}

/// A simple publisher that logs events, or collects them into a buffer.
pub struct LogPublisher {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl Default for LogPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl LogPublisher {
    pub fn new() -> Self {
        LogPublisher { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogPublisher {
            buffer: Some(buffer),
        }
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        let payload = event.to_json().map_err(DeliveryError::other)?;
        let line = format!("[OUTBOX] {} {}", event.type_tag, payload);
        match &self.buffer {
            Some(buffer) => buffer
                .lock()
                .map_err(|_| DeliveryError::Rejected("log publisher buffer poisoned".into()))?
                .push(line),
            None => tracing::info!(message_id = %event.message_id, type_tag = %event.type_tag, %payload, "published"),
        }
        Ok(())
    }
}

/// Emits each event's JSON body on an [`EventEmitter`](event_emitter_rs::EventEmitter)
/// for in-process subscribers, keyed by type tag.
#[cfg(feature = "emitter")]
pub struct EmitterPublisher {
    emitter: Mutex<event_emitter_rs::EventEmitter>,
}

#[cfg(feature = "emitter")]
impl EmitterPublisher {
    pub fn new(emitter: event_emitter_rs::EventEmitter) -> Self {
        EmitterPublisher {
            emitter: Mutex::new(emitter),
        }
    }
}

#[cfg(feature = "emitter")]
#[async_trait]
impl Publisher for EmitterPublisher {
    async fn publish(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        let payload = event.to_json().map_err(DeliveryError::other)?.to_string();
        self.emitter
            .lock()
            .map_err(|_| DeliveryError::Rejected("event emitter poisoned".into()))?
            .emit(&event.type_tag, payload);
        Ok(())
    }
}

/// Re-encodes events and sends them over an [`InMemoryBus`].
///
/// The envelope keeps the outbox record id so the receiving inbox can
/// deduplicate redeliveries.
#[derive(Clone)]
pub struct BusPublisher {
    bus: InMemoryBus,
    codec: Codec,
}

impl BusPublisher {
    pub fn new(bus: InMemoryBus) -> Self {
        Self {
            bus,
            codec: Codec::Json,
        }
    }

    /// Wire codec; the consumer must register its types with the same one.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn bus(&self) -> &InMemoryBus {
        &self.bus
    }
}

#[async_trait]
impl Publisher for BusPublisher {
    async fn ready(&self) -> bool {
        self.bus.is_available()
    }

    async fn publish(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        let payload = event
            .body()
            .encode(self.codec)
            .map_err(DeliveryError::other)?;
        let envelope = Envelope::new(event.message_id.clone(), event.type_tag.clone(), payload)
            .with_metadata(event.metadata.clone());
        self.bus.publish(envelope)
    }
}
