//! Repository seams for ledger state.
//!
//! Engines are generic over these traits; the in-memory store implements them
//! on its transaction type, and a SQL-backed store can do the same without
//! touching engine code. Implementations return fully materialized rows;
//! engines never traverse lazy relations.

use telstock_core::{DomainResult, StoreId};

use crate::device::{Device, DeviceId, NewDevice};
use crate::movement::{Movement, MovementDraft};

/// Access to device rows within one unit of work.
pub trait DeviceRepository {
    /// Load a device or fail with `NotFound`.
    fn device(&self, id: DeviceId) -> DomainResult<Device>;

    /// Look up the single row a store holds for a sku.
    fn find_device_by_sku(&self, store_id: StoreId, sku: &str) -> Option<Device>;

    /// Insert a new row; fails `duplicate_device` when the store already
    /// holds that sku (or that imei).
    fn insert_device(&mut self, device: NewDevice) -> DomainResult<Device>;

    /// Write back a mutated row.
    fn update_device(&mut self, device: &Device) -> DomainResult<()>;

    fn devices_in_store(&self, store_id: StoreId) -> Vec<Device>;
}

/// Append-only access to the movement ledger.
pub trait MovementRepository {
    /// Persist a draft, assigning its id.
    fn append_movement(&mut self, draft: MovementDraft) -> Movement;

    /// Full history for one device, in insertion order.
    fn movements_for_device(&self, device_id: DeviceId) -> Vec<Movement>;
}
