use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a message record.
///
/// `Pending` is the only initial state. A single dispatch or processing
/// attempt moves a record to `Done` or `Failed`; the loops never move it back.
/// The discriminants are the persisted codes, and serde reads and writes
/// the code rather than the variant name.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum MessageStatus {
    #[default]
    Pending = 0,
    Done = 1,
    Failed = 2,
}

impl MessageStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_terminal(self) -> bool {
        self != MessageStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Done => "done",
            MessageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted status code outside `0..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid message status code {0}")]
pub struct InvalidStatus(pub u8);

impl TryFrom<u8> for MessageStatus {
    type Error = InvalidStatus;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MessageStatus::Pending),
            1 => Ok(MessageStatus::Done),
            2 => Ok(MessageStatus::Failed),
            other => Err(InvalidStatus(other)),
        }
    }
}

impl From<MessageStatus> for u8 {
    fn from(status: MessageStatus) -> Self {
        status.code()
    }
}

/// Which of the two message tables a record or loop belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mailbox {
    Outbox,
    Inbox,
}

impl Mailbox {
    pub fn as_str(self) -> &'static str {
        match self {
            Mailbox::Outbox => "outbox",
            Mailbox::Inbox => "inbox",
        }
    }

    /// Name of the ordering timestamp for records in this table.
    pub fn timestamp_field(self) -> &'static str {
        match self {
            Mailbox::Outbox => "occurred_at",
            Mailbox::Inbox => "received_at",
        }
    }

    /// Prefix used for environment overrides of this mailbox's relay settings.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Mailbox::Outbox => "OUTBOX",
            Mailbox::Inbox => "INBOX",
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
