//! Queued audit writer.
//!
//! Request tasks hand events to a bounded channel; a single background task
//! drains it into the store. Recording never blocks and never fails the
//! caller: a full queue drops the event, a store error is logged, and both
//! are counted.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::audit::event::SecurityEvent;
use crate::audit::query::{AuditFilter, PagedResult};
use crate::audit::store::{AuditStore, AuditStoreError};
use crate::observability::metrics;

enum AuditCommand {
    Record(Box<SecurityEvent>),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the audit trail.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditCommand>,
    store: Arc<dyn AuditStore>,
    max_page_size: usize,
}

impl std::fmt::Debug for AuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditSink")
            .field("queued", &(self.tx.max_capacity() - self.tx.capacity()))
            .field("max_page_size", &self.max_page_size)
            .finish()
    }
}

impl AuditSink {
    /// Start the writer task. It exits once every handle is dropped.
    pub fn spawn(
        store: Arc<dyn AuditStore>,
        queue_capacity: usize,
        max_page_size: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = tokio::spawn(run_writer(Arc::clone(&store), rx));

        (
            Self {
                tx,
                store,
                max_page_size,
            },
            handle,
        )
    }

    /// Enqueue an event without waiting.
    pub fn record(&self, event: SecurityEvent) {
        match self.tx.try_send(AuditCommand::Record(Box::new(event))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Audit queue full, dropping event");
                metrics::record_audit_dropped("queue_full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Audit writer stopped, dropping event");
                metrics::record_audit_dropped("closed");
            }
        }
    }

    /// Wait until everything enqueued before this call has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(done_tx)).await.is_err() {
            tracing::debug!("Audit writer already stopped");
            return;
        }
        let _ = done_rx.await;
    }

    /// Query the store with paging clamped to the configured maximum.
    pub async fn query(&self, filter: AuditFilter) -> Result<PagedResult<SecurityEvent>, AuditStoreError> {
        self.store.query(&filter.clamped(self.max_page_size)).await
    }
}

async fn run_writer(store: Arc<dyn AuditStore>, mut rx: mpsc::Receiver<AuditCommand>) {
    tracing::debug!("Audit writer started");
    while let Some(command) = rx.recv().await {
        match command {
            AuditCommand::Record(event) => {
                let action = event.action;
                if let Err(e) = store.append(*event).await {
                    tracing::error!(error = %e, ?action, "Failed to write audit event");
                    metrics::record_audit_write_failure();
                }
            }
            AuditCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Audit writer stopped");
}
