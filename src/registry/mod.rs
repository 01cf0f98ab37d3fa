//! Event Type Registry - resolves persisted type tags back to payload types.
//!
//! Records store their payload as opaque bytes plus a type tag. The registry
//! maps each tag to a decode function, so the loops can turn a record into a
//! typed [`DecodedEvent`] without knowing the concrete types up front.

mod codec;
mod error;
mod event;
mod table;

pub use codec::{Codec, CodecError};
pub use error::RegistryError;
pub use event::{DecodedEvent, ErasedEvent, EventPayload};
pub use table::{EventTypeRegistry, Resolved};
