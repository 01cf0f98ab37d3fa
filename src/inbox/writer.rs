use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::bus::{Envelope, InMemoryBus};
use crate::error::StoreError;
use crate::message::{Mailbox, MessageRecord};
use crate::store::MessageStore;

/// A message as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// The transport's own message id; reused as the inbox row id.
    pub id: String,
    pub type_tag: String,
    pub payload: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
    /// Arrival time. Defaults to the moment the writer stores the message.
    pub received_at: Option<DateTime<Utc>>,
}

impl IncomingMessage {
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            payload,
            metadata: BTreeMap::new(),
            received_at: None,
        }
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }
}

impl From<Envelope> for IncomingMessage {
    fn from(envelope: Envelope) -> Self {
        Self {
            id: envelope.id,
            type_tag: envelope.type_tag,
            payload: envelope.payload,
            metadata: envelope.metadata,
            received_at: None,
        }
    }
}

/// Outcome of [`InboxWriter::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// Stored as a new pending row.
    Accepted,
    /// A row with this id already exists; the copy was dropped.
    Duplicate,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub accepted: usize,
    pub duplicates: usize,
}

/// Writes incoming messages into the inbox table.
///
/// Acknowledge the transport only after `receive` returns `Ok`: either the
/// message is now stored, or it already was.
#[derive(Clone)]
pub struct InboxWriter {
    store: Arc<dyn MessageStore>,
}

impl InboxWriter {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub async fn receive(&self, message: IncomingMessage) -> Result<Received, StoreError> {
        let record = MessageRecord::inbox(message.id, message.type_tag, message.payload)
            .with_timestamp(message.received_at.unwrap_or_else(Utc::now))
            .with_metadata(message.metadata);
        let id = record.id.clone();

        match self.store.insert(Mailbox::Inbox, record).await {
            Ok(()) => {
                tracing::debug!(message_id = %id, "inbox message accepted");
                Ok(Received::Accepted)
            }
            Err(StoreError::DuplicateId { .. }) => {
                tracing::debug!(message_id = %id, "duplicate inbox message dropped");
                Ok(Received::Duplicate)
            }
            Err(err) => Err(err),
        }
    }

    /// Move every queued envelope from `bus` into the inbox.
    ///
    /// Stops at the first store error; envelopes written so far stay
    /// written and the failing one is put back on the bus.
    pub async fn drain(&self, bus: &InMemoryBus) -> Result<DrainReport, StoreError> {
        let mut report = DrainReport::default();
        while let Some(envelope) = bus
            .poll()
            .map_err(|err| StoreError::Backend(err.to_string()))?
        {
            match self.receive(envelope.clone().into()).await {
                Ok(Received::Accepted) => report.accepted += 1,
                Ok(Received::Duplicate) => report.duplicates += 1,
                Err(err) => {
                    bus.redeliver(envelope)
                        .map_err(|bus_err| StoreError::Backend(bus_err.to_string()))?;
                    return Err(err);
                }
            }
        }
        Ok(report)
    }
}
