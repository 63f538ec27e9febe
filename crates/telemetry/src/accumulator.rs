//! Batch accumulation across ticks

use crate::batch::{Batch, SealedBatch};
use crate::error::BatchError;
use crate::flush::{FlushPolicy, FlushReason};
use crate::row::Row;
use crate::session::DriveSession;
use tracing::debug;

/// Holds the open batch and decides when to hand it off.
///
/// A batch is opened lazily on the first row and reopened right after
/// each flush, so no row is ever dropped between batches.
#[derive(Debug)]
pub struct BatchAccumulator {
    session: DriveSession,
    header: Vec<String>,
    policy: FlushPolicy,
    open: Option<Batch>,
}

impl BatchAccumulator {
    pub fn new(session: DriveSession, header: Vec<String>, policy: FlushPolicy) -> Self {
        Self {
            session,
            header,
            policy,
            open: None,
        }
    }

    /// Append a row; returns the sealed batch when a trigger fired
    pub fn append(&mut self, row: Row) -> Result<Option<(SealedBatch, FlushReason)>, BatchError> {
        let mut batch = match self.open.take() {
            Some(batch) => batch,
            None => Batch::open(self.session, self.header.clone())?,
        };
        if let Err(e) = batch.append(row.clone()) {
            self.open = Some(batch);
            return Err(e);
        }

        match self.policy.should_flush(&batch, &row) {
            Some(reason) => {
                debug!(
                    "Flushing batch of {} rows ({} bytes): {}",
                    batch.len(),
                    batch.encoded_len(),
                    reason
                );
                Ok(Some((batch.seal(), reason)))
            }
            None => {
                self.open = Some(batch);
                Ok(None)
            }
        }
    }

    /// Seal the open batch if it holds any rows
    pub fn take(&mut self) -> Option<SealedBatch> {
        self.open
            .take()
            .filter(|batch| !batch.is_empty())
            .map(Batch::seal)
    }

    /// Start a new drive session, sealing whatever the old one had open
    pub fn rotate_session(&mut self, session: DriveSession) -> Option<SealedBatch> {
        let pending = self.take();
        self.session = session;
        pending
    }

    pub fn session(&self) -> DriveSession {
        self.session
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Rows in the open batch
    pub fn pending_rows(&self) -> usize {
        self.open.as_ref().map_or(0, Batch::len)
    }
}
