//! Inbox - idempotent intake and processing of incoming messages.
//!
//! [`InboxWriter`] stores each transport message as a pending inbox row
//! keyed by the transport's message id, so a redelivered message is
//! detected as a duplicate and dropped. The [`InboxProcessor`] then polls
//! pending rows in arrival order and hands each decoded event to a
//! [`Consumer`].
//!
//! ## Example
//!
//! ```ignore
//! let consumer = HandlerConsumer::new()
//!     .on::<OrderCompleted, _>(|event| ship(&event.order_id));
//!
//! let writer = InboxWriter::new(store.clone());
//! writer.drain(&bus).await?;
//!
//! let worker = InboxProcessor::new(store, registry, consumer).spawn();
//! ```

mod consumer;
mod processor;
mod writer;

pub use consumer::{Consumer, HandlerConsumer};
pub use processor::{Consuming, InboxProcessor};
pub use writer::{DrainReport, IncomingMessage, InboxWriter, Received};
