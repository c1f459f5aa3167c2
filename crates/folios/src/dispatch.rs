//! Delivery queue for fiscal documents.
//!
//! Same shape and contract as the sync outbox, specialized to a fiscal
//! document key: one live row per document, attempt tracking as data, an
//! external sender doing the actual transport. Marking a row SENT also
//! stamps `sent_at` on the parent document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use telstock_core::DomainResult;
use telstock_outbox::OutboxStatus;

use crate::document::{DteDocumentId, DteDocumentRepository};

telstock_core::entity_id! {
    /// Identifier of a DTE queue row.
    pub struct DteQueueEntryId
}

/// Insert payload; the repository assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDteQueueEntry {
    pub document_id: DteDocumentId,
    pub payload: Value,
}

impl NewDteQueueEntry {
    pub fn into_entry(self, id: DteQueueEntryId) -> DteQueueEntry {
        let now = Utc::now();
        DteQueueEntry {
            id,
            document_id: self.document_id,
            payload: self.payload,
            status: OutboxStatus::Pending,
            attempt_count: 0,
            last_error: None,
            message_id: Uuid::now_v7(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Queue row tracking delivery of one fiscal document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DteQueueEntry {
    pub id: DteQueueEntryId,
    pub document_id: DteDocumentId,
    pub payload: Value,
    pub status: OutboxStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DteQueueEntry {
    /// Replace the queued payload for this document; attempts start over.
    pub fn supersede(&mut self, payload: Value) {
        self.payload = payload;
        self.status = OutboxStatus::Pending;
        self.attempt_count = 0;
        self.last_error = None;
        self.message_id = Uuid::now_v7();
        self.updated_at = Utc::now();
    }

    /// Record one delivery attempt made by the external sender.
    pub fn mark_attempt(&mut self, success: bool, error: Option<String>) {
        self.attempt_count += 1;
        if success {
            self.status = OutboxStatus::Sent;
            self.last_error = None;
        } else {
            self.status = OutboxStatus::Failed;
            self.last_error = error;
        }
        self.updated_at = Utc::now();
    }

    /// Put the row back in the sender's queue; attempt history survives.
    pub fn reset(&mut self) {
        self.status = OutboxStatus::Pending;
        self.updated_at = Utc::now();
    }
}

/// Storage seam for DTE queue rows.
pub trait DteQueueRepository {
    /// Load a row or fail with `NotFound`.
    fn dte_queue_entry(&self, id: DteQueueEntryId) -> DomainResult<DteQueueEntry>;

    /// The live row for a document, if any.
    fn find_dte_queue_by_document(&self, document_id: DteDocumentId) -> Option<DteQueueEntry>;

    fn insert_dte_queue(&mut self, entry: NewDteQueueEntry) -> DteQueueEntry;

    fn update_dte_queue(&mut self, entry: &DteQueueEntry) -> DomainResult<()>;

    /// Rows filtered by status, most recently updated first, capped at
    /// `limit`. `None` means all statuses.
    fn list_dte_queue(&self, statuses: Option<&[OutboxStatus]>, limit: usize)
    -> Vec<DteQueueEntry>;
}

/// Queue-state manager for fiscal document delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct DteDispatchQueue;

impl DteDispatchQueue {
    pub fn new() -> Self {
        Self
    }

    /// Queue (or re-queue) the delivery payload for a document.
    pub fn enqueue_document<S: DteQueueRepository>(
        &self,
        store: &mut S,
        document_id: DteDocumentId,
        payload: Value,
    ) -> DomainResult<DteQueueEntry> {
        match store.find_dte_queue_by_document(document_id) {
            Some(mut entry) => {
                debug!(document_id = %document_id, "re-queueing fiscal document");
                entry.supersede(payload);
                store.update_dte_queue(&entry)?;
                Ok(entry)
            }
            None => Ok(store.insert_dte_queue(NewDteQueueEntry {
                document_id,
                payload,
            })),
        }
    }

    /// Record a delivery attempt; success stamps `sent_at` on the document.
    pub fn mark_attempt<S>(
        &self,
        store: &mut S,
        id: DteQueueEntryId,
        success: bool,
        error: Option<String>,
    ) -> DomainResult<DteQueueEntry>
    where
        S: DteQueueRepository + DteDocumentRepository,
    {
        let mut entry = store.dte_queue_entry(id)?;
        entry.mark_attempt(success, error);
        store.update_dte_queue(&entry)?;

        if success {
            let mut document = store.dte_document(entry.document_id)?;
            document.mark_sent(entry.updated_at);
            store.update_dte_document(&document)?;
        }
        Ok(entry)
    }

    /// The external sender's read surface.
    pub fn list<S: DteQueueRepository>(
        &self,
        store: &S,
        statuses: Option<&[OutboxStatus]>,
        limit: usize,
    ) -> Vec<DteQueueEntry> {
        store.list_dte_queue(statuses, limit)
    }

    /// Force rows back to PENDING for another delivery round.
    pub fn reset_entries<S: DteQueueRepository>(
        &self,
        store: &mut S,
        ids: &[DteQueueEntryId],
    ) -> DomainResult<usize> {
        let mut reset = 0;
        for &id in ids {
            let mut entry = store.dte_queue_entry(id)?;
            if entry.status != OutboxStatus::Pending {
                entry.reset();
                store.update_dte_queue(&entry)?;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
