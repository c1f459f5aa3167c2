//! Purchase order aggregate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use telstock_core::{DomainError, DomainResult, StoreId};
use telstock_ledger::DeviceId;

telstock_core::entity_id! {
    /// Identifier of a purchase order.
    pub struct PurchaseOrderId
}

/// Lifecycle of a purchase order. Wire values are the Spanish statuses the
/// sync consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Pendiente,
    Parcial,
    Completada,
    Cancelada,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pendiente => "PENDIENTE",
            Self::Parcial => "PARCIAL",
            Self::Completada => "COMPLETADA",
            Self::Cancelada => "CANCELADA",
        }
    }

    /// COMPLETADA and CANCELADA accept no further receipts.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completada | Self::Cancelada)
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a stored purchase order.
///
/// `quantity_received` only grows and never exceeds `quantity_ordered`;
/// `quantity_returned` never exceeds `quantity_received`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub device_id: DeviceId,
    pub quantity_ordered: i64,
    pub quantity_received: i64,
    pub quantity_returned: i64,
    pub unit_cost: Decimal,
}

impl PurchaseOrderItem {
    /// Quantity still outstanding from the supplier.
    pub fn remaining(&self) -> i64 {
        self.quantity_ordered - self.quantity_received
    }

    /// Quantity that can still go back to the supplier.
    pub fn returnable(&self) -> i64 {
        self.quantity_received - self.quantity_returned
    }

    pub fn is_complete(&self) -> bool {
        self.quantity_received == self.quantity_ordered
    }
}

/// One ordered line of a draft order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseLine {
    pub device_id: DeviceId,
    pub quantity_ordered: i64,
    pub unit_cost: Decimal,
}

impl NewPurchaseLine {
    fn into_item(self) -> PurchaseOrderItem {
        PurchaseOrderItem {
            device_id: self.device_id,
            quantity_ordered: self.quantity_ordered,
            quantity_received: 0,
            quantity_returned: 0,
            unit_cost: self.unit_cost,
        }
    }
}

/// Draft order; the repository assigns the id on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub store_id: StoreId,
    pub supplier: String,
    pub items: Vec<NewPurchaseLine>,
}

impl NewPurchaseOrder {
    pub fn new(store_id: StoreId, supplier: impl Into<String>) -> Self {
        Self {
            store_id,
            supplier: supplier.into(),
            items: Vec::new(),
        }
    }

    pub fn with_line(
        mut self,
        device_id: DeviceId,
        quantity_ordered: i64,
        unit_cost: Decimal,
    ) -> Self {
        self.items.push(NewPurchaseLine {
            device_id,
            quantity_ordered,
            unit_cost,
        });
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.supplier.trim().is_empty() {
            return Err(DomainError::invalid_movement(
                "a purchase order needs a supplier",
            ));
        }
        if self.items.is_empty() {
            return Err(DomainError::invalid_quantity(
                "a purchase order needs at least one line",
            ));
        }
        for line in &self.items {
            if line.quantity_ordered <= 0 {
                return Err(DomainError::invalid_quantity(format!(
                    "device {}: ordered quantity must be positive",
                    line.device_id
                )));
            }
            if line.unit_cost < Decimal::ZERO {
                return Err(DomainError::invalid_movement(format!(
                    "device {}: unit cost cannot be negative",
                    line.device_id
                )));
            }
        }
        Ok(())
    }

    pub fn into_order(self, id: PurchaseOrderId) -> PurchaseOrder {
        PurchaseOrder {
            id,
            store_id: self.store_id,
            supplier: self.supplier,
            status: PurchaseStatus::Pendiente,
            items: self
                .items
                .into_iter()
                .map(NewPurchaseLine::into_item)
                .collect(),
            created_at: Utc::now(),
            closed_at: None,
        }
    }
}

/// A supplier order with its lines, loaded and saved as one aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub store_id: StoreId,
    pub supplier: String,
    pub status: PurchaseStatus,
    pub items: Vec<PurchaseOrderItem>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    pub fn item(&self, device_id: DeviceId) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|item| item.device_id == device_id)
    }

    pub fn item_mut(&mut self, device_id: DeviceId) -> Option<&mut PurchaseOrderItem> {
        self.items
            .iter_mut()
            .find(|item| item.device_id == device_id)
    }

    /// True when every line has been received in full.
    pub fn is_fully_received(&self) -> bool {
        self.items.iter().all(PurchaseOrderItem::is_complete)
    }
}
