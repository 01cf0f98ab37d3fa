use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::message::MessageRecord;

use super::codec::{Codec, CodecError};
use super::error::RegistryError;
use super::event::{DecodedEvent, ErasedEvent, EventPayload};

type DecodeFn = dyn Fn(&[u8]) -> Result<Arc<dyn ErasedEvent>, CodecError> + Send + Sync;

/// A registered payload type: the decode function for one type tag.
#[derive(Clone)]
pub struct Resolved {
    type_tag: String,
    type_id: TypeId,
    type_name: &'static str,
    codec: Codec,
    decode: Arc<DecodeFn>,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("type_tag", &self.type_tag)
            .field("type_name", &self.type_name)
            .field("codec", &self.codec)
            .finish()
    }
}

impl Resolved {
    fn of<T>(type_tag: String, codec: Codec) -> Self
    where
        T: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            type_tag,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            codec,
            decode: Arc::new(
                move |bytes: &[u8]| -> Result<Arc<dyn ErasedEvent>, CodecError> {
                    let value: T = codec.decode(bytes)?;
                    Ok(Arc::new(value) as Arc<dyn ErasedEvent>)
                },
            ),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Deserialize a record's payload into the registered type.
    pub fn decode(&self, record: &MessageRecord) -> Result<DecodedEvent, RegistryError> {
        let body = (self.decode)(&record.payload).map_err(|source| RegistryError::Decode {
            type_tag: self.type_tag.clone(),
            source,
        })?;
        Ok(
            DecodedEvent::from_erased(record.id.clone(), record.type_tag.clone(), body)
                .with_metadata(record.metadata.clone()),
        )
    }

    /// Serialize an event with this registration's codec.
    pub fn encode(&self, event: &dyn ErasedEvent) -> Result<Vec<u8>, RegistryError> {
        if event.event_type_id() != self.type_id {
            return Err(RegistryError::TypeMismatch {
                tag: self.type_tag.clone(),
                expected: self.type_name,
                actual: event.type_name(),
            });
        }
        event
            .encode(self.codec)
            .map_err(|source| RegistryError::Encode {
                type_tag: self.type_tag.clone(),
                source,
            })
    }
}

/// Maps type tags to payload types.
///
/// One instance is shared (via `Arc`) by the capture hook and both loops.
/// Register every payload type before the loops start; a record whose tag
/// is unknown fails permanently.
///
/// ```ignore
/// let registry = Arc::new(EventTypeRegistry::new());
/// registry.register::<OrderCompleted>()?;
/// registry.register_with_codec::<StockReserved>(Codec::Bitcode)?;
/// ```
#[derive(Default)]
pub struct EventTypeRegistry {
    entries: RwLock<HashMap<String, Resolved>>,
}

impl fmt::Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTypeRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its `TYPE_TAG` with the JSON codec.
    ///
    /// Returns `Ok(false)` when the same type is already registered.
    pub fn register<T: EventPayload>(&self) -> Result<bool, RegistryError> {
        self.register_as::<T>(T::TYPE_TAG, Codec::Json)
    }

    pub fn register_with_codec<T: EventPayload>(&self, codec: Codec) -> Result<bool, RegistryError> {
        self.register_as::<T>(T::TYPE_TAG, codec)
    }

    /// Register a type under an explicit tag, for payload types that do not
    /// implement [`EventPayload`].
    pub fn register_as<T>(&self, tag: impl Into<String>, codec: Codec) -> Result<bool, RegistryError>
    where
        T: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    {
        let tag = tag.into();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;

        if let Some(existing) = entries.get(&tag) {
            if existing.type_id == TypeId::of::<T>() && existing.codec == codec {
                return Ok(false);
            }
            return Err(RegistryError::TagConflict {
                tag,
                existing: existing.type_name,
                requested: std::any::type_name::<T>(),
            });
        }

        let resolved = Resolved::of::<T>(tag.clone(), codec);
        tracing::debug!(type_tag = %tag, type_name = resolved.type_name, ?codec, "event type registered");
        entries.insert(tag, resolved);
        Ok(true)
    }

    pub fn resolve(&self, type_tag: &str) -> Result<Resolved, RegistryError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        entries
            .get(type_tag)
            .cloned()
            .ok_or_else(|| RegistryError::Unregistered(type_tag.to_string()))
    }

    /// Resolve the record's tag and deserialize its payload.
    pub fn decode(&self, record: &MessageRecord) -> Result<DecodedEvent, RegistryError> {
        self.resolve(&record.type_tag)?.decode(record)
    }

    /// Serialize an event with the codec registered for its tag.
    pub fn encode<T: EventPayload>(&self, event: &T) -> Result<Vec<u8>, RegistryError> {
        self.resolve(T::TYPE_TAG)?.encode(event)
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(type_tag))
            .unwrap_or(false)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
