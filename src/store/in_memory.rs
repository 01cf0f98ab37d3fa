use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::message::{Mailbox, MessageRecord, MessageStatus};

use super::{MessageStore, SaveFailure, SaveReport};

type IndexKey = (MessageStatus, DateTime<Utc>, String);

fn index_key(record: &MessageRecord) -> IndexKey {
    (record.status, record.timestamp, record.id.clone())
}

#[derive(Default)]
struct Table {
    rows: HashMap<String, MessageRecord>,
    /// Ordered by status first, so pending rows form a prefix sorted by timestamp.
    index: BTreeSet<IndexKey>,
}

impl Table {
    fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    fn insert(&mut self, record: MessageRecord) {
        self.index.insert(index_key(&record));
        self.rows.insert(record.id.clone(), record);
    }

    fn pending(&self, limit: usize) -> Vec<MessageRecord> {
        self.index
            .iter()
            .take_while(|(status, _, _)| *status == MessageStatus::Pending)
            .take(limit)
            .filter_map(|(_, _, id)| self.rows.get(id).cloned())
            .collect()
    }

    fn apply(&mut self, mailbox: Mailbox, record: &MessageRecord) -> Result<(), StoreError> {
        let stored = self
            .rows
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::NotFound {
                mailbox,
                id: record.id.clone(),
            })?;

        if !stored.is_pending() {
            return Err(StoreError::Conflict {
                mailbox,
                id: record.id.clone(),
                expected: MessageStatus::Pending,
                actual: stored.status,
            });
        }

        self.index.remove(&index_key(stored));
        stored.status = record.status;
        stored.last_attempt_at = record.last_attempt_at;
        stored.last_error = record.last_error.clone();
        self.index.insert(index_key(stored));
        Ok(())
    }

    fn requeue(&mut self, id: &str) -> bool {
        let Some(stored) = self.rows.get_mut(id) else {
            return false;
        };
        let old_key = index_key(stored);
        if !stored.requeue() {
            return false;
        }
        self.index.remove(&old_key);
        self.index.insert(index_key(stored));
        true
    }
}

#[derive(Default)]
struct Tables {
    outbox: Table,
    inbox: Table,
    aggregates: HashMap<String, serde_json::Value>,
}

impl Tables {
    fn table(&self, mailbox: Mailbox) -> &Table {
        match mailbox {
            Mailbox::Outbox => &self.outbox,
            Mailbox::Inbox => &self.inbox,
        }
    }

    fn table_mut(&mut self, mailbox: Mailbox) -> &mut Table {
        match mailbox {
            Mailbox::Outbox => &mut self.outbox,
            Mailbox::Inbox => &mut self.inbox,
        }
    }
}

/// Writes staged inside [`InMemoryStore::transaction`].
///
/// Nothing is visible to other handles until the closure returns `Ok`;
/// on error every staged write is discarded.
pub struct Transaction<'a> {
    tables: &'a Tables,
    messages: Vec<(Mailbox, MessageRecord)>,
    aggregates: Vec<(String, serde_json::Value)>,
}

impl Transaction<'_> {
    pub fn insert(&mut self, mailbox: Mailbox, record: MessageRecord) -> Result<(), StoreError> {
        let staged = self
            .messages
            .iter()
            .any(|(staged_mailbox, staged)| *staged_mailbox == mailbox && staged.id == record.id);
        if staged || self.tables.table(mailbox).contains(&record.id) {
            return Err(StoreError::DuplicateId {
                mailbox,
                id: record.id,
            });
        }
        self.messages.push((mailbox, record));
        Ok(())
    }

    pub fn put_aggregate(&mut self, id: impl Into<String>, state: serde_json::Value) {
        self.aggregates.push((id.into(), state));
    }

    /// Latest state of an aggregate, including writes staged in this transaction.
    pub fn aggregate(&self, id: &str) -> Option<&serde_json::Value> {
        self.aggregates
            .iter()
            .rev()
            .find(|(staged_id, _)| staged_id == id)
            .map(|(_, state)| state)
            .or_else(|| self.tables.aggregates.get(id))
    }
}

/// Thread-safe in-memory store for both message tables plus aggregate state.
///
/// Cloning creates another handle to the same storage.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Tables>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            inner: Arc::new(RwLock::new(Tables::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate an outage: while unavailable every operation fails with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store marked unavailable".into()))
        }
    }

    /// Run `f` as one atomic unit. Staged writes are applied under a single
    /// write lock only if `f` succeeds.
    pub fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut Transaction<'_>) -> Result<R, E>,
    {
        self.check_available()?;
        let mut tables = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("transaction"))?;

        let (result, messages, aggregates) = {
            let mut tx = Transaction {
                tables: &*tables,
                messages: Vec::new(),
                aggregates: Vec::new(),
            };
            let result = f(&mut tx)?;
            (result, tx.messages, tx.aggregates)
        };

        for (id, state) in aggregates {
            tables.aggregates.insert(id, state);
        }
        for (mailbox, record) in messages {
            tables.table_mut(mailbox).insert(record);
        }
        Ok(result)
    }

    pub fn aggregate(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let tables = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.aggregates.get(id).cloned())
    }

    /// Every record in a table, oldest first.
    pub fn records(&self, mailbox: Mailbox) -> Result<Vec<MessageRecord>, StoreError> {
        let tables = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        let mut records: Vec<MessageRecord> =
            tables.table(mailbox).rows.values().cloned().collect();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn insert(&self, mailbox: Mailbox, record: MessageRecord) -> Result<(), StoreError> {
        self.transaction(|tx| tx.insert(mailbox, record))
    }

    async fn select_batch(
        &self,
        mailbox: Mailbox,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        self.check_available()?;
        let tables = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.table(mailbox).pending(limit))
    }

    async fn save_batch(
        &self,
        mailbox: Mailbox,
        records: &[MessageRecord],
    ) -> Result<SaveReport, StoreError> {
        self.check_available()?;
        let mut tables = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        let table = tables.table_mut(mailbox);

        let mut report = SaveReport::default();
        for record in records {
            match table.apply(mailbox, record) {
                Ok(()) => report.saved += 1,
                Err(error) => report.failed.push(SaveFailure {
                    id: record.id.clone(),
                    error,
                }),
            }
        }
        Ok(report)
    }

    async fn get(&self, mailbox: Mailbox, id: &str) -> Result<Option<MessageRecord>, StoreError> {
        self.check_available()?;
        let tables = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.table(mailbox).rows.get(id).cloned())
    }

    async fn count(&self, mailbox: Mailbox, status: MessageStatus) -> Result<usize, StoreError> {
        self.check_available()?;
        let tables = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables
            .table(mailbox)
            .rows
            .values()
            .filter(|record| record.status == status)
            .count())
    }

    async fn requeue_failed(&self, mailbox: Mailbox, ids: &[String]) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut tables = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        let table = tables.table_mut(mailbox);

        let mut requeued = 0;
        for id in ids {
            if table.requeue(id) {
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}
