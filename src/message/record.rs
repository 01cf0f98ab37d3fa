use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MessageStatus;

/// Durable message record, shared by the outbox and the inbox.
///
/// `timestamp` is the domain event's occurrence time for outbox records and
/// the arrival time for inbox records; both tables order pending work by it.
/// Status transitions go through [`complete`](Self::complete),
/// [`fail`](Self::fail) and [`requeue`](Self::requeue), which ignore calls
/// from an illegal source state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub type_tag: String,
    #[serde(with = "payload_serde")]
    pub payload: Vec<u8>,
    pub status: MessageStatus,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Correlation/causation ids and other headers carried to the delivery boundary.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

mod payload_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(payload: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(payload).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl MessageRecord {
    pub const CORRELATION_ID: &'static str = "correlation_id";
    pub const CAUSATION_ID: &'static str = "causation_id";

    fn pending(id: String, type_tag: String, payload: Vec<u8>) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            type_tag,
            payload,
            status: MessageStatus::Pending,
            last_attempt_at: None,
            last_error: None,
            metadata: BTreeMap::new(),
        }
    }

    /// New pending outbox record with a freshly generated id.
    pub fn outbox(type_tag: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::pending(Uuid::new_v4().to_string(), type_tag.into(), payload)
    }

    /// New pending inbox record. The id must be the transport message's own
    /// id so that a redelivery collides with the first copy.
    pub fn inbox(id: impl Into<String>, type_tag: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::pending(id.into(), type_tag.into(), payload)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.meta(Self::CORRELATION_ID)
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.meta(Self::CAUSATION_ID)
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    pub fn is_done(&self) -> bool {
        self.status == MessageStatus::Done
    }

    pub fn is_failed(&self) -> bool {
        self.status == MessageStatus::Failed
    }

    /// Pending -> Done. Clears any error left over from an earlier cycle.
    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = MessageStatus::Done;
        self.last_attempt_at = Some(at);
        self.last_error = None;
        true
    }

    /// Pending -> Failed, recording the error detail.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        let error = error.into();
        self.status = MessageStatus::Failed;
        self.last_attempt_at = Some(at);
        self.last_error = Some(if error.is_empty() {
            "unspecified failure".to_string()
        } else {
            error
        });
        true
    }

    /// Failed -> Pending. Operator action only; the loops never requeue.
    /// `last_error` is kept so the previous failure stays visible.
    pub fn requeue(&mut self) -> bool {
        if !self.is_failed() {
            return false;
        }
        self.status = MessageStatus::Pending;
        true
    }
}
