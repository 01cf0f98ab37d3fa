//! Service bus - the transport between a producer's outbox and a consumer's
//! inbox.
//!
//! ```text
//! producer                                         consumer
//! ┌────────┐  dispatch  ┌──────────────┐  drain   ┌───────┐  process
//! │ outbox │ ─────────▶ │ InMemoryBus  │ ───────▶ │ inbox │ ────────▶ handlers
//! └────────┘  (publish) └──────────────┘ (receive)└───────┘
//! ```
//!
//! The envelope id is the outbox record id, and the inbox keys its rows by
//! that id. A message the bus delivers twice therefore lands in the inbox
//! once.
//!
//! Broker adapters (Kafka, NATS, ...) implement
//! [`Publisher`](crate::Publisher) and feed [`InboxWriter`](crate::InboxWriter)
//! directly; [`InMemoryBus`] covers tests and single-process setups.

mod envelope;
mod in_memory;

pub use envelope::Envelope;
pub use in_memory::InMemoryBus;
