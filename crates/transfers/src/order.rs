//! Transfer order aggregate and its closed transition table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use telstock_core::{DomainError, DomainResult, StoreId, UserId};
use telstock_ledger::DeviceId;

telstock_core::entity_id! {
    /// Identifier of an inter-store transfer order.
    pub struct TransferOrderId
}

/// Lifecycle of a transfer. Wire values are the Spanish statuses the sync
/// consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Solicitada,
    EnTransito,
    Recibida,
    Cancelada,
    Rechazada,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solicitada => "SOLICITADA",
            Self::EnTransito => "EN_TRANSITO",
            Self::Recibida => "RECIBIDA",
            Self::Cancelada => "CANCELADA",
            Self::Rechazada => "RECHAZADA",
        }
    }

    /// Terminal orders accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Recibida | Self::Cancelada | Self::Rechazada)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four operations that move an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    Dispatch,
    Receive,
    Reject,
    Cancel,
}

impl TransferAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Receive => "receive",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for TransferAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete transition table. Pairs absent here are invalid, including
/// everything out of a terminal status.
pub fn transition(status: TransferStatus, action: TransferAction) -> Option<TransferStatus> {
    use TransferAction::*;
    use TransferStatus::*;
    match (status, action) {
        (Solicitada, Dispatch) => Some(EnTransito),
        (Solicitada, Receive) => Some(Recibida),
        (Solicitada, Cancel) => Some(Cancelada),
        (EnTransito, Receive) => Some(Recibida),
        (EnTransito, Reject) => Some(Rechazada),
        _ => None,
    }
}

/// One line of a stored transfer order.
///
/// Quantities hold `received ≤ dispatched ≤ requested` at every commit.
/// `sku` and `unit_cost` are snapshots: the sku names the destination row to
/// merge into, and the cost is the origin average captured when stock left
/// the origin, carried by the units in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOrderItem {
    pub device_id: DeviceId,
    pub sku: String,
    pub requested_quantity: i64,
    pub dispatched_quantity: i64,
    pub received_quantity: i64,
    pub unit_cost: Decimal,
}

impl TransferOrderItem {
    /// Units that left the origin and have not landed anywhere.
    pub fn in_transit(&self) -> i64 {
        self.dispatched_quantity - self.received_quantity
    }
}

/// One requested line of a new transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest {
    pub device_id: DeviceId,
    pub quantity: i64,
}

/// Caller input for a new transfer; the coordinator validates it and
/// resolves device snapshots before anything persists.
#[derive(Debug, Clone)]
pub struct NewTransferOrder {
    pub origin_store: StoreId,
    pub destination_store: StoreId,
    pub reason: String,
    pub items: Vec<TransferRequest>,
}

impl NewTransferOrder {
    pub fn new(origin_store: StoreId, destination_store: StoreId, reason: impl Into<String>) -> Self {
        Self {
            origin_store,
            destination_store,
            reason: reason.into(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, device_id: DeviceId, quantity: i64) -> Self {
        self.items.push(TransferRequest { device_id, quantity });
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.origin_store == self.destination_store {
            return Err(DomainError::invalid_movement(
                "origin and destination are the same store",
            ));
        }
        if self.items.is_empty() {
            return Err(DomainError::invalid_quantity(
                "a transfer needs at least one item",
            ));
        }
        for item in &self.items {
            if item.quantity <= 0 {
                return Err(DomainError::invalid_quantity(format!(
                    "device {}: requested quantity must be positive",
                    item.device_id
                )));
            }
        }
        Ok(())
    }
}

/// A validated transfer before the repository assigns its id.
#[derive(Debug, Clone)]
pub struct TransferDraft {
    pub origin_store: StoreId,
    pub destination_store: StoreId,
    pub reason: String,
    pub items: Vec<TransferOrderItem>,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
}

impl TransferDraft {
    pub fn into_order(self, id: TransferOrderId) -> TransferOrder {
        TransferOrder {
            id,
            origin_store: self.origin_store,
            destination_store: self.destination_store,
            status: TransferStatus::Solicitada,
            reason: self.reason,
            items: self.items,
            requested_by: self.requested_by,
            requested_at: self.requested_at,
            dispatched_by: None,
            dispatched_at: None,
            received_by: None,
            received_at: None,
            closed_by: None,
            closed_at: None,
        }
    }
}

/// An inter-store transfer with its lines, loaded and saved as one
/// aggregate. `closed_by`/`closed_at` record whoever cancelled or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOrder {
    pub id: TransferOrderId,
    pub origin_store: StoreId,
    pub destination_store: StoreId,
    pub status: TransferStatus,
    pub reason: String,
    pub items: Vec<TransferOrderItem>,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
    pub dispatched_by: Option<UserId>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub received_by: Option<UserId>,
    pub received_at: Option<DateTime<Utc>>,
    pub closed_by: Option<UserId>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TransferOrder {
    pub fn item(&self, device_id: DeviceId) -> Option<&TransferOrderItem> {
        self.items.iter().find(|item| item.device_id == device_id)
    }

    /// Receipt completion rule: every line has landed at least one unit.
    pub fn all_items_received(&self) -> bool {
        self.items.iter().all(|item| item.received_quantity > 0)
    }
}
