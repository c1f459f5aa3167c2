//! `telstock-ledger` — stock quantity and weighted-average-cost bookkeeping.

pub mod audit;
pub mod device;
pub mod ledger;
pub mod movement;
pub mod repo;

pub use audit::{AuditFinding, DeviceAuditReport, audit_device};
pub use device::{Device, DeviceId, NewDevice};
pub use ledger::{MovementInput, StockLedger};
pub use movement::{Movement, MovementDraft, MovementId, MovementKind};
pub use repo::{DeviceRepository, MovementRepository};
