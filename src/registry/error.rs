use thiserror::Error;

use super::codec::CodecError;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The type tag was never registered. Permanent for the record that
    /// carries it until the host registers the type.
    #[error("event type `{0}` is not registered")]
    Unregistered(String),
    /// The payload does not match the registered type's shape.
    #[error("failed to decode `{type_tag}` payload")]
    Decode {
        type_tag: String,
        #[source]
        source: CodecError,
    },
    #[error("failed to encode `{type_tag}` payload")]
    Encode {
        type_tag: String,
        #[source]
        source: CodecError,
    },
    #[error("event type `{tag}` is already registered as {existing}, cannot register {requested}")]
    TagConflict {
        tag: String,
        existing: &'static str,
        requested: &'static str,
    },
    #[error("event type `{tag}` is registered as {expected}, got {actual}")]
    TypeMismatch {
        tag: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("registry lock poisoned")]
    LockPoisoned,
}
