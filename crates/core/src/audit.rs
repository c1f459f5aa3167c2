//! Structured audit trail.
//!
//! Engines describe every state transition as an [`AuditRecord`]; the unit of
//! work buffers records and forwards them to the configured [`AuditSink`]
//! only after commit. A rolled-back transaction therefore leaves no audit
//! trace, and a transition audited once stays audited once regardless of how
//! many delivery attempts downstream consumers make.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::UserId;

/// One audit fact: who did what to which entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub performed_by: UserId,
    pub details: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: i64,
        performed_by: UserId,
        details: Value,
    ) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id,
            performed_by,
            details,
            recorded_at: Utc::now(),
        }
    }
}

/// Destination for committed audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, record: AuditRecord) {
        (**self).record(record);
    }
}

/// Write side handed to engines; implemented by the unit of work, which
/// flushes to the sink on commit and discards on rollback.
pub trait AuditLog {
    fn record_audit(&mut self, record: AuditRecord);
}
