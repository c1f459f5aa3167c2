//! Device rows: per-store stock and cost state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use telstock_core::{StoreId, money};

telstock_core::entity_id! {
    /// Identifier of a device row (one row per store and sku).
    pub struct DeviceId
}

/// One stock row: a device model held by one store.
///
/// `quantity` and `average_cost` are mutated only through
/// [`StockLedger::apply_movement`](crate::StockLedger::apply_movement); every
/// change leaves an immutable [`Movement`](crate::Movement) behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub store_id: StoreId,
    pub sku: String,
    pub name: String,
    /// Unique unit identifiers; present on serialized units only.
    pub imei: Option<String>,
    pub serial: Option<String>,
    pub quantity: i64,
    pub average_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// A serialized unit is tracked by imei/serial and cannot be split
    /// across partial quantities.
    pub fn is_serialized(&self) -> bool {
        self.imei.is_some() || self.serial.is_some()
    }

    /// Sale price derived from the average cost and a fractional margin.
    pub fn unit_price(&self, margin: Decimal) -> Decimal {
        money::apply_margin(self.average_cost, margin)
    }

    /// Catalog attributes cloned into another store, with no stock yet.
    /// Identifiers travel with the unit; quantity arrives via movements.
    pub fn clone_into_store(&self, store_id: StoreId) -> NewDevice {
        NewDevice {
            store_id,
            sku: self.sku.clone(),
            name: self.name.clone(),
            imei: self.imei.clone(),
            serial: self.serial.clone(),
        }
    }
}

/// Insert payload; the repository assigns the id and zeroes the stock state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDevice {
    pub store_id: StoreId,
    pub sku: String,
    pub name: String,
    pub imei: Option<String>,
    pub serial: Option<String>,
}

impl NewDevice {
    pub fn new(store_id: StoreId, sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            store_id,
            sku: sku.into(),
            name: name.into(),
            imei: None,
            serial: None,
        }
    }

    pub fn with_imei(mut self, imei: impl Into<String>) -> Self {
        self.imei = Some(imei.into());
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Materialize the row the repository stores.
    pub fn into_device(self, id: DeviceId) -> Device {
        let now = Utc::now();
        Device {
            id,
            store_id: self.store_id,
            sku: self.sku,
            name: self.name,
            imei: self.imei,
            serial: self.serial,
            quantity: 0,
            average_cost: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}
