use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::{Codec, CodecError};

/// A payload type that can travel through the outbox and inbox.
///
/// `TYPE_TAG` is persisted with every record and must stay stable across
/// releases and across producer/consumer boundaries.
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct OrderCompleted { order_id: String }
///
/// impl EventPayload for OrderCompleted {
///     const TYPE_TAG: &'static str = "OrderCompleted";
/// }
/// ```
pub trait EventPayload: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    const TYPE_TAG: &'static str;
}

/// Object-safe view of a deserialized payload.
pub trait ErasedEvent: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn event_type_id(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;
    fn encode(&self, codec: Codec) -> Result<Vec<u8>, CodecError>;
}

impl<T> ErasedEvent for T
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn event_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn encode(&self, codec: Codec) -> Result<Vec<u8>, CodecError> {
        codec.encode(self)
    }
}

/// A record's payload after type resolution, handed to the delivery boundary.
#[derive(Clone, Debug)]
pub struct DecodedEvent {
    pub message_id: String,
    pub type_tag: String,
    pub metadata: BTreeMap<String, String>,
    body: Arc<dyn ErasedEvent>,
}

impl DecodedEvent {
    pub fn new<T: EventPayload>(message_id: impl Into<String>, event: T) -> Self {
        Self::from_erased(message_id.into(), T::TYPE_TAG.to_string(), Arc::new(event))
    }

    pub(crate) fn from_erased(
        message_id: String,
        type_tag: String,
        body: Arc<dyn ErasedEvent>,
    ) -> Self {
        Self {
            message_id,
            type_tag,
            metadata: BTreeMap::new(),
            body,
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.body.as_any().downcast_ref::<T>()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.body.event_type_id() == TypeId::of::<T>()
    }

    pub fn body(&self) -> &dyn ErasedEvent {
        self.body.as_ref()
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        self.body.to_json()
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }
}
