//! Outbox rows: durable, retry-tracked notification state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

telstock_core::entity_id! {
    /// Identifier of an outbox row.
    pub struct OutboxEntryId
}

/// Delivery state of an outbox row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

impl core::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate family a notification refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Sale,
    PurchaseOrder,
    TransferOrder,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Sale => "sale",
            EntityType::PurchaseOrder => "purchase_order",
            EntityType::TransferOrder => "transfer_order",
        }
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the downstream consumer should do with the payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Upsert,
    StatusUpdate,
    Return,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Upsert => "UPSERT",
            Operation::StatusUpdate => "STATUS_UPDATE",
            Operation::Return => "RETURN",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insert payload; the repository assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutboxEntry {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub operation: Operation,
    pub payload: Value,
}

impl NewOutboxEntry {
    pub fn into_entry(self, id: OutboxEntryId) -> OutboxEntry {
        let now = Utc::now();
        OutboxEntry {
            id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            operation: self.operation,
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

/// One durable notification row.
///
/// At most one live row exists per `(entity_type, entity_id)`; re-enqueueing
/// the key replaces this row in place instead of growing the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: OutboxEntryId,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub operation: Operation,
    pub payload: Value,
    pub status: OutboxStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Rotates on every supersede; at-least-once consumers dedupe on it.
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// Replace this row with a newer notification for the same key.
    /// Attempt state starts over: the old payload will never be delivered.
    pub fn supersede(&mut self, operation: Operation, payload: Value) {
        self.operation = operation;
        self.payload = payload;
        self.status = OutboxStatus::Pending;
        self.attempt_count = 0;
        self.last_error = None;
        self.message_id = Uuid::now_v7();
        self.updated_at = Utc::now();
    }

    /// Record one delivery attempt made by the external worker.
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

    /// Put the row back in the worker's queue; attempt history survives.
    pub fn reset(&mut self) {
        self.status = OutboxStatus::Pending;
        self.updated_at = Utc::now();
    }
}
