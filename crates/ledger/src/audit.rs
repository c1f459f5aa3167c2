//! Replay-based integrity audit.
//!
//! A pure function over a device row and its movement history: replays the
//! history from empty state with the same arithmetic the ledger applies, then
//! diffs the outcome against the stored row. No I/O, so it is safe to run as
//! a background consistency sweep.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceId};
use crate::ledger::advance;
use crate::movement::{Movement, MovementKind};

/// Inconsistency classes, flagged independently of one another.
///
/// Wire names are the snake_case Spanish labels downstream tooling already
/// consumes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFinding {
    /// Some intermediate replay quantity went below zero.
    StockNegativo,
    /// Replayed quantity differs from the stored row.
    DiferenciaExistencias,
    /// Replayed average cost differs from the stored row (stocked rows only).
    DiferenciaCostoPromedio,
    /// Stored row has no stock but a non-zero average cost.
    CostoInconsistente,
    /// Stored row has stock but no movement history at all.
    SinMovimientos,
    /// History contains a movement kind the ledger does not recognize.
    TipoMovimientoDesconocido,
}

/// Outcome of replaying one device's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuditReport {
    pub device_id: DeviceId,
    pub movement_count: usize,
    pub expected_quantity: i64,
    pub expected_cost: Decimal,
    pub stored_quantity: i64,
    pub stored_cost: Decimal,
    pub findings: Vec<AuditFinding>,
}

impl DeviceAuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has(&self, finding: AuditFinding) -> bool {
        self.findings.contains(&finding)
    }
}

/// Replay `movements` from empty state and diff against the stored row.
///
/// History may arrive in any order; replay sorts by `(occurred_at, id)`.
pub fn audit_device(device: &Device, movements: &[Movement]) -> DeviceAuditReport {
    let mut ordered: Vec<&Movement> = movements.iter().collect();
    ordered.sort_by_key(|m| (m.occurred_at, m.id));

    let mut quantity = 0i64;
    let mut cost = Decimal::ZERO;
    let mut went_negative = false;
    let mut saw_unknown = false;

    for movement in &ordered {
        if movement.kind == MovementKind::Unknown {
            saw_unknown = true;
            continue;
        }
        let (next_quantity, next_cost) = advance(
            quantity,
            cost,
            movement.kind,
            movement.quantity,
            movement.unit_cost,
        );
        quantity = next_quantity;
        cost = next_cost;
        if quantity < 0 {
            went_negative = true;
        }
    }

    let mut findings = Vec::new();
    if went_negative {
        findings.push(AuditFinding::StockNegativo);
    }
    if saw_unknown {
        findings.push(AuditFinding::TipoMovimientoDesconocido);
    }
    if quantity != device.quantity {
        findings.push(AuditFinding::DiferenciaExistencias);
    }
    if device.quantity > 0 && cost != device.average_cost {
        findings.push(AuditFinding::DiferenciaCostoPromedio);
    }
    if device.quantity <= 0 && device.average_cost != Decimal::ZERO {
        findings.push(AuditFinding::CostoInconsistente);
    }
    if device.quantity > 0 && ordered.is_empty() {
        findings.push(AuditFinding::SinMovimientos);
    }

    DeviceAuditReport {
        device_id: device.id,
        movement_count: ordered.len(),
        expected_quantity: quantity,
        expected_cost: cost,
        stored_quantity: device.quantity,
        stored_cost: device.average_cost,
        findings,
    }
}
