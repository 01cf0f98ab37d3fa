//! Outbox - capture domain events with state and publish them afterwards.
//!
//! Events raised by an aggregate are written as pending outbox rows in the
//! same transaction as the aggregate's state ([`capture`]). The
//! [`OutboxDispatcher`] then polls those rows, hands each decoded event to a
//! [`Publisher`] and marks it done or failed.
//!
//! ## Example
//!
//! ```ignore
//! let store = InMemoryStore::new();
//! let registry = Arc::new(EventTypeRegistry::new());
//! registry.register::<OrderCompleted>()?;
//!
//! order.complete();
//! store.commit(&registry, &mut order)?;
//!
//! let worker = OutboxDispatcher::new(Arc::new(store), registry, LogPublisher::new())
//!     .with_batch_size(50)
//!     .spawn();
//! ```

pub mod capture;
mod dispatcher;
mod publisher;

pub use capture::{Aggregate, CaptureError, EventBuffer, PendingEvent};
pub use dispatcher::{OutboxDispatcher, Publishing};
#[cfg(feature = "emitter")]
pub use publisher::EmitterPublisher;
pub use publisher::{BusPublisher, LogPublisher, Publisher};
