use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::error::{error_chain, DeliveryError, RelayError};
use crate::message::{Mailbox, MessageRecord};
use crate::registry::{DecodedEvent, EventTypeRegistry};
use crate::store::MessageStore;

use super::config::RelayConfig;
use super::handle::WorkerHandle;
use super::stats::{CycleReport, WorkerStats};

/// The terminal operation of a relay: publish for the outbox, consume for
/// the inbox.
#[async_trait]
pub trait Deliver: Send + Sync {
    /// Table this operation drains.
    const MAILBOX: Mailbox;

    /// Whether the boundary can take work right now. A `false` skips the cycle.
    async fn ready(&self) -> bool {
        true
    }

    async fn deliver(&self, event: &DecodedEvent) -> Result<(), DeliveryError>;
}

/// Polling loop that advances pending records to `Done` or `Failed`.
///
/// Each cycle selects one batch, attempts every record in timestamp order,
/// and writes all transitions back with a single `save_batch`. A failing
/// record never stops the batch and is never retried automatically.
pub struct Relay<D> {
    store: Arc<dyn MessageStore>,
    registry: Arc<EventTypeRegistry>,
    delivery: D,
    config: RelayConfig,
}

impl<D: Deliver> Relay<D> {
    pub fn from_parts(
        store: Arc<dyn MessageStore>,
        registry: Arc<EventTypeRegistry>,
        delivery: D,
    ) -> Self {
        Self {
            store,
            registry,
            delivery,
            config: RelayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn mailbox(&self) -> Mailbox {
        D::MAILBOX
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<EventTypeRegistry> {
        &self.registry
    }

    /// Run a single cycle.
    ///
    /// Cancellation is honoured up to the batch fetch, including while the
    /// store or delivery boundary is being probed. Once a batch is in hand
    /// it is attempted and flushed in full.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, RelayError> {
        let mailbox = D::MAILBOX;

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%mailbox, "cancelled before batch fetch");
                return Ok(CycleReport::skipped_cycle());
            }
            fetched = self.fetch() => fetched?,
        };
        let Some(batch) = fetched else {
            return Ok(CycleReport::skipped_cycle());
        };

        if batch.is_empty() {
            trace!(%mailbox, "no pending messages");
            return Ok(CycleReport::default());
        }

        let mut report = CycleReport {
            selected: batch.len(),
            ..Default::default()
        };

        let attempted = if self.config.concurrency <= 1 {
            let mut batch = batch;
            for record in batch.iter_mut() {
                self.attempt(record).await;
            }
            batch
        } else {
            stream::iter(batch)
                .map(|mut record| async move {
                    self.attempt(&mut record).await;
                    record
                })
                .buffered(self.config.concurrency)
                .collect::<Vec<_>>()
                .await
        };

        for record in &attempted {
            if record.is_done() {
                report.done += 1;
            } else if record.is_failed() {
                report.failed += 1;
            }
        }

        let saved = self.store.save_batch(mailbox, &attempted).await?;
        for failure in &saved.failed {
            warn!(
                %mailbox,
                message_id = %failure.id,
                error = %error_chain(&failure.error),
                "failed to persist message transition"
            );
        }
        report.save_failures = saved.failed.len();

        info!(
            %mailbox,
            selected = report.selected,
            done = report.done,
            failed = report.failed,
            save_failures = report.save_failures,
            "relay cycle complete"
        );
        Ok(report)
    }

    /// Probe both dependencies, then select the next batch. `None` means
    /// one of them is unavailable and the cycle is skipped.
    async fn fetch(&self) -> Result<Option<Vec<MessageRecord>>, RelayError> {
        let mailbox = D::MAILBOX;

        if let Err(err) = self.store.ping().await {
            warn!(%mailbox, error = %error_chain(&err), "store unavailable, skipping cycle");
            return Ok(None);
        }
        if !self.delivery.ready().await {
            warn!(%mailbox, "delivery boundary not ready, skipping cycle");
            return Ok(None);
        }

        let batch = self
            .store
            .select_batch(mailbox, self.config.batch_size)
            .await?;
        Ok(Some(batch))
    }

    async fn attempt(&self, record: &mut MessageRecord) {
        let mailbox = D::MAILBOX;

        let resolved = match self.registry.resolve(&record.type_tag) {
            Ok(resolved) => resolved,
            Err(err) => {
                let detail = error_chain(&err);
                warn!(%mailbox, message_id = %record.id, type_tag = %record.type_tag, error = %detail, "type resolution failed");
                record.fail(detail, Utc::now());
                return;
            }
        };

        let event = match resolved.decode(record) {
            Ok(event) => event,
            Err(err) => {
                let detail = error_chain(&err);
                warn!(%mailbox, message_id = %record.id, type_tag = %record.type_tag, error = %detail, "payload decode failed");
                record.fail(detail, Utc::now());
                return;
            }
        };

        let outcome = AssertUnwindSafe(self.delivery.deliver(&event))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(DeliveryError::Panicked(panic_message(panic.as_ref())))
            });

        match outcome {
            Ok(()) => {
                record.complete(Utc::now());
                debug!(%mailbox, message_id = %record.id, type_tag = %record.type_tag, "message delivered");
            }
            Err(err) => {
                let detail = error_chain(&err);
                warn!(%mailbox, message_id = %record.id, type_tag = %record.type_tag, error = %detail, "delivery failed");
                record.fail(detail, Utc::now());
            }
        }
    }

    /// Poll until `cancel` fires.
    ///
    /// Cycle-level errors are logged and retried on the next interval; the
    /// loop itself never fails.
    pub async fn run(&self, cancel: CancellationToken) -> WorkerStats {
        let mailbox = D::MAILBOX;
        info!(
            %mailbox,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            concurrency = self.config.concurrency,
            "relay started"
        );

        let mut stats = WorkerStats::default();
        loop {
            if cancel.is_cancelled() {
                break;
            }

            stats.cycles += 1;
            match self.run_cycle(&cancel).await {
                Ok(report) => stats.record(&report),
                Err(err) => {
                    stats.cycle_errors += 1;
                    error!(%mailbox, error = %error_chain(&err), "relay cycle failed, retrying next interval");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(
            %mailbox,
            cycles = stats.cycles,
            done = stats.messages_done,
            failed = stats.messages_failed,
            "relay stopped"
        );
        stats
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<D: Deliver + 'static> Relay<D> {
    /// Run the loop on a tokio task with its own cancellation token.
    pub fn spawn(self) -> WorkerHandle {
        self.spawn_with(CancellationToken::new())
    }

    /// Run the loop on a tokio task, stopping when `cancel` fires. Share one
    /// token between the outbox and inbox loops to stop both together.
    pub fn spawn_with(self, cancel: CancellationToken) -> WorkerHandle {
        let mailbox = D::MAILBOX;
        let token = cancel.clone();
        let span = tracing::info_span!("relay", %mailbox);
        let handle = tokio::spawn(async move { self.run(token).await }.instrument(span));
        WorkerHandle::new(mailbox, cancel, handle)
    }
}
