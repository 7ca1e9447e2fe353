//! Serialized audit appends.
//!
//! One writer, many submitters: a single worker task owns the [`AuditStore`]
//! and drains an ordered channel, so the read-modify-persist cycle for the
//! store document never races. Two concurrent appends always observe a
//! serialized view where the second sees the first's result incorporated.

use super::record::AuditRecord;
use super::store::AuditStore;
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};

struct AppendJob {
    record: AuditRecord,
    done: oneshot::Sender<Result<()>>,
}

/// Handle for submitting audit appends.
///
/// Cheap to clone; all clones feed the same worker and share its total
/// order. The worker stops when the last handle is dropped.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::UnboundedSender<AppendJob>,
}

impl AuditSink {
    /// Spawns the append worker over the given store and returns its handle.
    #[must_use]
    pub fn spawn(store: AuditStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AppendJob>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = store.append(job.record);
                match result {
                    Ok(()) => {
                        metrics::counter!("audit_appends_total", "status" => "ok").increment(1);
                    },
                    Err(ref e) => {
                        metrics::counter!("audit_appends_total", "status" => "error").increment(1);
                        tracing::warn!(error = %e, "audit append failed");
                    },
                }
                // Submitter may have gone away; the record is persisted
                // either way.
                let _ = job.done.send(result);
            }
        });

        Self { tx }
    }

    /// Appends a record, completing once the write has been persisted (or
    /// has definitively failed).
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the store write fails or the
    /// worker has stopped.
    pub async fn append(&self, record: AuditRecord) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(AppendJob {
                record,
                done: done_tx,
            })
            .map_err(|_| Error::OperationFailed {
                operation: "audit_append".to_string(),
                cause: "audit worker stopped".to_string(),
            })?;

        done_rx.await.map_err(|_| Error::OperationFailed {
            operation: "audit_append".to_string(),
            cause: "audit worker dropped the completion".to_string(),
        })?
    }
}
