pub mod bus;
mod error;
pub mod inbox;
mod message;
pub mod outbox;
mod registry;
mod relay;
pub mod store;

pub use error::{error_chain, DeliveryError, RelayError, StoreError};
pub use inbox::{
    Consumer, DrainReport, HandlerConsumer, InboxProcessor, InboxWriter, IncomingMessage, Received,
};
pub use message::{InvalidStatus, Mailbox, MessageRecord, MessageStatus};
pub use outbox::{
    Aggregate, BusPublisher, CaptureError, EventBuffer, LogPublisher, OutboxDispatcher,
    PendingEvent, Publisher,
};
#[cfg(feature = "emitter")]
pub use outbox::EmitterPublisher;
pub use registry::{
    Codec, CodecError, DecodedEvent, ErasedEvent, EventPayload, EventTypeRegistry, RegistryError,
    Resolved,
};
pub use relay::{
    ConfigError, CycleReport, Deliver, MessagingConfig, Relay, RelayConfig, WorkerHandle,
    WorkerStats, DEFAULT_POLL_INTERVAL,
};
pub use store::{InMemoryStore, MessageStore, SaveFailure, SaveReport, Transaction, DEFAULT_BATCH_SIZE};

// Re-export so hosts can share a token between loops without depending on tokio-util directly
pub use tokio_util::sync::CancellationToken;

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
