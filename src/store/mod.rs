//! Storage contract for the outbox and inbox tables.
//!
//! The loops only ever read pending batches and write status transitions
//! back; creation happens in the capture hook (outbox) or the inbound
//! writer (inbox). [`InMemoryStore`] is the bundled implementation.

mod in_memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Mailbox, MessageRecord, MessageStatus};

pub use in_memory::{InMemoryStore, Transaction};

/// Default number of records selected per cycle.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A transition write that did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFailure {
    pub id: String,
    pub error: StoreError,
}

/// Outcome of [`MessageStore::save_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: usize,
    pub failed: Vec<SaveFailure>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Durable storage for message records.
///
/// Each table must keep `id` unique; for the inbox this uniqueness is the
/// duplicate-detection mechanism. Implementations should index
/// `(status, timestamp)` so that [`select_batch`](Self::select_batch) stays
/// cheap as terminal rows accumulate.
///
/// There is no claim or lease step. Two loops polling the same table can
/// select the same batch and deliver it twice, so run one loop per table.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Cheap availability probe, checked at the start of every cycle.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Write a new record. Fails with [`StoreError::DuplicateId`] if the id
    /// is already present.
    async fn insert(&self, mailbox: Mailbox, record: MessageRecord) -> Result<(), StoreError>;

    /// Up to `limit` pending records, oldest first (ties broken by id).
    async fn select_batch(
        &self,
        mailbox: Mailbox,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError>;

    /// Persist status, `last_attempt_at` and `last_error` for records
    /// returned by the previous `select_batch`.
    ///
    /// Every record is attempted; one failed write never blocks the rest.
    /// Per-record failures are reported in the returned [`SaveReport`].
    async fn save_batch(
        &self,
        mailbox: Mailbox,
        records: &[MessageRecord],
    ) -> Result<SaveReport, StoreError>;

    async fn get(&self, mailbox: Mailbox, id: &str) -> Result<Option<MessageRecord>, StoreError>;

    /// Number of records in `status`. Hosts poll the failed count to alert
    /// on stuck messages.
    async fn count(&self, mailbox: Mailbox, status: MessageStatus) -> Result<usize, StoreError>;

    /// Flip failed records back to pending so the loop picks them up again.
    /// Returns how many records were requeued; ids that are not failed are
    /// skipped.
    async fn requeue_failed(&self, mailbox: Mailbox, ids: &[String]) -> Result<usize, StoreError>;
}
