//! Upsert-keyed dispatch queue with attempt tracking.
//!
//! The dispatcher manages queue *state* only. Delivery belongs to an external
//! worker that polls [`OutboxDispatcher::list`], pushes payloads downstream,
//! and reports back through [`OutboxDispatcher::mark_attempt`]. The guarantee
//! is at-least-once: a crash between delivery and the mark replays the entry,
//! so consumers dedupe on `message_id`.

use serde_json::Value;
use serde::Serialize;
use tracing::debug;

use telstock_core::DomainResult;

use crate::entry::{
    EntityType, NewOutboxEntry, Operation, OutboxEntry, OutboxEntryId, OutboxStatus,
};

/// Storage seam for outbox rows.
pub trait OutboxRepository {
    /// Load an entry or fail with `NotFound`.
    fn outbox_entry(&self, id: OutboxEntryId) -> DomainResult<OutboxEntry>;

    /// The live row for a key, if any.
    fn find_outbox_by_key(&self, entity_type: EntityType, entity_id: i64) -> Option<OutboxEntry>;

    /// Insert a new row, assigning its id.
    fn insert_outbox(&mut self, entry: NewOutboxEntry) -> OutboxEntry;

    /// Write back a mutated row.
    fn update_outbox(&mut self, entry: &OutboxEntry) -> DomainResult<()>;

    /// Rows filtered by status, most recently updated first, capped at
    /// `limit`. `None` means all statuses.
    fn list_outbox(&self, statuses: Option<&[OutboxStatus]>, limit: usize) -> Vec<OutboxEntry>;
}

/// Row counts per delivery state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
}

impl OutboxStats {
    pub fn total(&self) -> usize {
        self.pending + self.sent + self.failed
    }
}

/// Queue-state manager for domain-change notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboxDispatcher;

impl OutboxDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Insert the notification for a key, or coalesce into the existing row.
    ///
    /// Coalescing is last-write-wins: the previous payload is dropped, status
    /// forced back to PENDING, attempts and error cleared. Intermediate
    /// states superseded before delivery are never delivered individually.
    pub fn enqueue<S: OutboxRepository>(
        &self,
        store: &mut S,
        entity_type: EntityType,
        entity_id: i64,
        operation: Operation,
        payload: Value,
    ) -> DomainResult<OutboxEntry> {
        match store.find_outbox_by_key(entity_type, entity_id) {
            Some(mut entry) => {
                debug!(
                    entity_type = %entity_type,
                    entity_id,
                    superseded_status = %entry.status,
                    "coalescing outbox entry"
                );
                entry.supersede(operation, payload);
                store.update_outbox(&entry)?;
                Ok(entry)
            }
            None => Ok(store.insert_outbox(NewOutboxEntry {
                entity_type,
                entity_id,
                operation,
                payload,
            })),
        }
    }

    /// Record the outcome of one delivery attempt.
    pub fn mark_attempt<S: OutboxRepository>(
        &self,
        store: &mut S,
        id: OutboxEntryId,
        success: bool,
        error: Option<String>,
    ) -> DomainResult<OutboxEntry> {
        let mut entry = store.outbox_entry(id)?;
        entry.mark_attempt(success, error);
        store.update_outbox(&entry)?;
        Ok(entry)
    }

    /// The external worker's sole read surface.
    pub fn list<S: OutboxRepository>(
        &self,
        store: &S,
        statuses: Option<&[OutboxStatus]>,
        limit: usize,
    ) -> Vec<OutboxEntry> {
        store.list_outbox(statuses, limit)
    }

    /// Force entries back to PENDING for another delivery round. Returns how
    /// many actually changed; already-pending entries are left alone.
    pub fn reset_entries<S: OutboxRepository>(
        &self,
        store: &mut S,
        ids: &[OutboxEntryId],
    ) -> DomainResult<usize> {
        let mut reset = 0;
        for &id in ids {
            let mut entry = store.outbox_entry(id)?;
            if entry.status != OutboxStatus::Pending {
                entry.reset();
                store.update_outbox(&entry)?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// Row counts per status over the whole queue.
    pub fn stats<S: OutboxRepository>(&self, store: &S) -> OutboxStats {
        let mut stats = OutboxStats::default();
        for entry in store.list_outbox(None, usize::MAX) {
            match entry.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Sent => stats.sent += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}
