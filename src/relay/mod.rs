//! Relay - the polling state machine shared by the outbox and inbox loops.
//!
//! A [`Relay`] repeatedly selects a batch of pending records, resolves and
//! decodes each one through the [`EventTypeRegistry`](crate::EventTypeRegistry),
//! hands it to its [`Deliver`] operation and writes every resulting
//! transition back in one `save_batch`. The outbox and inbox loops differ
//! only in the table they drain and the terminal operation.
//!
//! ## Example
//!
//! ```ignore
//! let cancel = CancellationToken::new();
//! let outbox = OutboxDispatcher::new(store.clone(), registry.clone(), publisher)
//!     .with_config(config.outbox.clone())
//!     .spawn_with(cancel.clone());
//! let inbox = InboxProcessor::new(store, registry, consumer)
//!     .with_config(config.inbox.clone())
//!     .spawn_with(cancel.clone());
//!
//! cancel.cancel();
//! let (outbox_stats, inbox_stats) = tokio::join!(outbox.stop(), inbox.stop());
//! ```

mod config;
mod handle;
mod stats;
mod worker;

pub use config::{ConfigError, MessagingConfig, RelayConfig, DEFAULT_POLL_INTERVAL};
pub use handle::WorkerHandle;
pub use stats::{CycleReport, WorkerStats};
pub use worker::{Deliver, Relay};
