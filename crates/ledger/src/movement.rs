//! Immutable stock movements: the append-only ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use telstock_core::{StoreId, UserId};

use crate::device::DeviceId;

telstock_core::entity_id! {
    /// Identifier of a ledger movement.
    pub struct MovementId
}

/// Direction of a stock movement.
///
/// `Unknown` absorbs malformed kinds on rows written before the enum closed;
/// the integrity auditor flags them and `apply_movement` refuses them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    In,
    Out,
    Adjust,
    #[serde(other)]
    Unknown,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
            MovementKind::Adjust => "ADJUST",
            MovementKind::Unknown => "UNKNOWN",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A movement accepted by the ledger but not yet persisted.
///
/// The repository assigns the id on append; drafts never resurface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDraft {
    pub device_id: DeviceId,
    pub store_id: StoreId,
    pub kind: MovementKind,
    /// For IN/OUT the moved quantity; for ADJUST the new absolute quantity.
    pub quantity: i64,
    /// Effective cost recorded with the row: the incoming cost for IN, the
    /// average at issue for OUT, the override (if any) for ADJUST.
    pub unit_cost: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
    pub actor: UserId,
    pub reason: String,
}

/// A committed ledger fact. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub device_id: DeviceId,
    pub store_id: StoreId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub unit_cost: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
    pub actor: UserId,
    pub reason: String,
}

impl Movement {
    pub fn from_draft(id: MovementId, draft: MovementDraft) -> Self {
        Self {
            id,
            device_id: draft.device_id,
            store_id: draft.store_id,
            kind: draft.kind,
            quantity: draft.quantity,
            unit_cost: draft.unit_cost,
            occurred_at: draft.occurred_at,
            actor: draft.actor,
            reason: draft.reason,
        }
    }
}
