use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Stable across redeliveries; consumers deduplicate on it.
    pub id: String,
    pub type_tag: String,
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Envelope {
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            payload,
            metadata: BTreeMap::new(),
        }
    }

    /// Create an envelope with a string payload.
    pub fn with_string_payload(
        id: impl Into<String>,
        type_tag: impl Into<String>,
        payload: &str,
    ) -> Self {
        Self::new(id, type_tag, payload.as_bytes().to_vec())
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
