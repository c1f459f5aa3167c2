//! Audit sinks for embedders and tests.

use std::sync::{Mutex, PoisonError};

use telstock_core::{AuditRecord, AuditSink};

/// Discards every record. The default sink when the embedder keeps its own
/// audit trail elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _record: AuditRecord) {}
}

/// Keeps every committed record in memory, in commit order.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The `action` column of every record, in order. Convenient for
    /// asserting a workflow's audit shape.
    pub fn actions(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|record| record.action)
            .collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}
