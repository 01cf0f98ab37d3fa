use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::message::Mailbox;

use super::stats::WorkerStats;

/// Handle to a relay running on a tokio task.
///
/// ## Example
///
/// ```ignore
/// let worker = OutboxDispatcher::new(store, registry, LogPublisher::new())
///     .with_poll_interval(Duration::from_millis(50))
///     .spawn();
///
/// // ... do work ...
///
/// let stats = worker.stop().await;
/// println!("Delivered {} messages", stats.messages_done);
/// ```
///
/// Dropping the handle signals the loop to stop without waiting for it.
pub struct WorkerHandle {
    mailbox: Mailbox,
    cancel: CancellationToken,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        mailbox: Mailbox,
        cancel: CancellationToken,
        handle: JoinHandle<WorkerStats>,
    ) -> Self {
        Self {
            mailbox,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn mailbox(&self) -> Mailbox {
        self.mailbox
    }

    /// Token observed by the loop. Cancelling it has the same effect as
    /// [`signal_stop`](Self::signal_stop).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the loop to stop without waiting.
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// Stop the loop and wait for the in-flight cycle to finish.
    pub async fn stop(mut self) -> WorkerStats {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return WorkerStats::default();
        };
        match handle.await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::error!(mailbox = %self.mailbox, error = %err, "relay task did not finish cleanly");
                WorkerStats::default()
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
