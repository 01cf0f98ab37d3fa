use std::error::Error;

use thiserror::Error;

use crate::message::{Mailbox, MessageStatus};

/// Errors raised by a [`MessageStore`](crate::MessageStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("{mailbox} message {id} already exists")]
    DuplicateId { mailbox: Mailbox, id: String },
    #[error("{mailbox} message {id} not found")]
    NotFound { mailbox: Mailbox, id: String },
    #[error("{mailbox} message {id} is {actual}, expected {expected}")]
    Conflict {
        mailbox: Mailbox,
        id: String,
        expected: MessageStatus,
        actual: MessageStatus,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failure reported by a publish or consume operation.
///
/// The relay cannot tell transient failures from poison messages, so every
/// variant is handled the same way: the record is marked failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("delivery timed out")]
    Timeout,
    #[error("no handler registered for `{0}`")]
    NoHandler(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("delivery failed")]
    Other(#[source] Box<dyn Error + Send + Sync>),
}

impl DeliveryError {
    pub fn other(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        DeliveryError::Other(error.into())
    }
}

/// Cycle-level failure. Logged by the loop and retried on the next interval.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("store operation failed")]
    Store(#[from] StoreError),
}

/// Render an error together with its chain of sources, as stored in
/// `last_error`.
pub fn error_chain(error: &(dyn Error + 'static)) -> String {
    let mut detail = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}
