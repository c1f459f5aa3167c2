//! Quantity and weighted-average-cost bookkeeping.
//!
//! Movement rules:
//! - **IN** adds quantity and recomputes the average as a quantity-weighted
//!   mean, quantized to 2 decimals, rounding half up. An IN without a cost
//!   takes the current average, leaving it unchanged.
//! - **OUT** removes quantity; the average survives unless the row hits zero,
//!   where it resets to 0.
//! - **ADJUST** sets the quantity absolutely; a supplied cost overwrites the
//!   average while quantity stays positive, and a zero quantity resets it.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use telstock_core::{DomainError, DomainResult, LedgerConfig, UserId, money};

use crate::device::Device;
use crate::movement::{MovementDraft, MovementKind};

/// Input for one ledger application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementInput {
    pub kind: MovementKind,
    pub quantity: i64,
    pub unit_cost: Option<Decimal>,
    pub actor: UserId,
    pub reason: String,
}

impl MovementInput {
    /// Incoming stock with a known cost (purchase receipts, transfer landings).
    pub fn receipt(
        quantity: i64,
        unit_cost: Decimal,
        actor: UserId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: MovementKind::In,
            quantity,
            unit_cost: Some(unit_cost),
            actor,
            reason: reason.into(),
        }
    }

    /// Incoming stock without a cost; the average stays where it is.
    pub fn restock(quantity: i64, actor: UserId, reason: impl Into<String>) -> Self {
        Self {
            kind: MovementKind::In,
            quantity,
            unit_cost: None,
            actor,
            reason: reason.into(),
        }
    }

    /// Outgoing stock (sale, transfer dispatch, supplier return).
    pub fn issue(quantity: i64, actor: UserId, reason: impl Into<String>) -> Self {
        Self {
            kind: MovementKind::Out,
            quantity,
            unit_cost: None,
            actor,
            reason: reason.into(),
        }
    }

    /// Absolute correction, optionally overwriting the average cost.
    pub fn adjustment(
        quantity: i64,
        unit_cost: Option<Decimal>,
        actor: UserId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: MovementKind::Adjust,
            quantity,
            unit_cost,
            actor,
            reason: reason.into(),
        }
    }
}

/// Applies movements to device rows and hands back the ledger fact to persist.
///
/// The ledger never touches storage: callers commit the mutated [`Device`]
/// and the returned [`MovementDraft`] inside one unit of work, or neither.
#[derive(Debug, Clone)]
pub struct StockLedger {
    config: LedgerConfig,
}

impl StockLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Apply one movement to `device`, returning the row to append.
    pub fn apply_movement(
        &self,
        device: &mut Device,
        input: MovementInput,
    ) -> DomainResult<MovementDraft> {
        let recorded_cost = match input.kind {
            MovementKind::In => self.apply_in(device, &input)?,
            MovementKind::Out => self.apply_out(device, &input)?,
            MovementKind::Adjust => self.apply_adjust(device, &input)?,
            MovementKind::Unknown => {
                return Err(DomainError::invalid_movement(format!(
                    "device {}: movement kind is not recognized",
                    device.id
                )));
            }
        };

        let now = Utc::now();
        device.updated_at = now;
        debug!(
            device_id = %device.id,
            store_id = %device.store_id,
            kind = %input.kind,
            quantity = input.quantity,
            new_quantity = device.quantity,
            "movement applied"
        );

        Ok(MovementDraft {
            device_id: device.id,
            store_id: device.store_id,
            kind: input.kind,
            quantity: input.quantity,
            unit_cost: recorded_cost,
            occurred_at: now,
            actor: input.actor,
            reason: input.reason,
        })
    }

    fn apply_in(&self, device: &mut Device, input: &MovementInput) -> DomainResult<Option<Decimal>> {
        ensure_positive(input.quantity, "IN")?;
        ensure_cost_not_negative(input.unit_cost)?;

        let incoming = input.unit_cost.unwrap_or(device.average_cost);
        let (quantity, average_cost) = advance(
            device.quantity,
            device.average_cost,
            MovementKind::In,
            input.quantity,
            input.unit_cost,
        );
        device.quantity = quantity;
        device.average_cost = average_cost;
        Ok(Some(incoming))
    }

    fn apply_out(
        &self,
        device: &mut Device,
        input: &MovementInput,
    ) -> DomainResult<Option<Decimal>> {
        ensure_positive(input.quantity, "OUT")?;
        if input.quantity > device.quantity {
            return Err(DomainError::insufficient_stock(format!(
                "device {} has {}, requested {}",
                device.id, device.quantity, input.quantity
            )));
        }

        let issued_at_cost = device.average_cost;
        let (quantity, average_cost) = advance(
            device.quantity,
            device.average_cost,
            MovementKind::Out,
            input.quantity,
            None,
        );
        device.quantity = quantity;
        device.average_cost = average_cost;

        if device.quantity <= self.config.low_stock_threshold {
            warn!(
                device_id = %device.id,
                store_id = %device.store_id,
                quantity = device.quantity,
                threshold = self.config.low_stock_threshold,
                "stock at or below threshold"
            );
        }
        Ok(Some(issued_at_cost))
    }

    fn apply_adjust(
        &self,
        device: &mut Device,
        input: &MovementInput,
    ) -> DomainResult<Option<Decimal>> {
        if input.quantity < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "ADJUST quantity must be >= 0, got {}",
                input.quantity
            )));
        }
        ensure_cost_not_negative(input.unit_cost)?;

        let (quantity, average_cost) = advance(
            device.quantity,
            device.average_cost,
            MovementKind::Adjust,
            input.quantity,
            input.unit_cost,
        );
        device.quantity = quantity;
        device.average_cost = average_cost;
        Ok(input.unit_cost.map(money::quantize))
    }
}

/// Arithmetic core shared by the strict apply path and the tolerant replay
/// auditor. Performs no validation; negative intermediates pass through so
/// the auditor can observe them.
pub(crate) fn advance(
    quantity: i64,
    average_cost: Decimal,
    kind: MovementKind,
    move_quantity: i64,
    unit_cost: Option<Decimal>,
) -> (i64, Decimal) {
    match kind {
        MovementKind::In => {
            let incoming = unit_cost.unwrap_or(average_cost);
            let new_quantity = quantity + move_quantity;
            if new_quantity <= 0 {
                // Only degenerate audit replays land here.
                return (new_quantity, Decimal::ZERO);
            }
            let total = Decimal::from(quantity) * average_cost
                + Decimal::from(move_quantity) * incoming;
            (
                new_quantity,
                money::quantize(total / Decimal::from(new_quantity)),
            )
        }
        MovementKind::Out => {
            let new_quantity = quantity - move_quantity;
            if new_quantity == 0 {
                (0, Decimal::ZERO)
            } else {
                (new_quantity, average_cost)
            }
        }
        MovementKind::Adjust => {
            if move_quantity <= 0 {
                (move_quantity, Decimal::ZERO)
            } else {
                (
                    move_quantity,
                    unit_cost.map(money::quantize).unwrap_or(average_cost),
                )
            }
        }
        MovementKind::Unknown => (quantity, average_cost),
    }
}

fn ensure_positive(quantity: i64, kind: &str) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::invalid_quantity(format!(
            "{kind} quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

fn ensure_cost_not_negative(unit_cost: Option<Decimal>) -> DomainResult<()> {
    if let Some(cost) = unit_cost {
        if cost < Decimal::ZERO {
            return Err(DomainError::invalid_movement(format!(
                "unit cost cannot be negative, got {cost}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use telstock_core::{StoreId, ValidationCode};

    use crate::device::{DeviceId, NewDevice};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn test_actor() -> UserId {
        UserId::new(7)
    }

    fn test_device(quantity: i64, average_cost: &str) -> Device {
        let mut device =
            NewDevice::new(StoreId::new(1), "SKU-1", "Galaxy A15").into_device(DeviceId::new(1));
        device.quantity = quantity;
        device.average_cost = dec(average_cost);
        device
    }

    fn ledger() -> StockLedger {
        StockLedger::new(LedgerConfig::default())
    }

    #[test]
    fn receipt_recomputes_weighted_average() {
        let mut device = test_device(5, "10.00");
        let draft = ledger()
            .apply_movement(
                &mut device,
                MovementInput::receipt(5, dec("20.00"), test_actor(), "purchase"),
            )
            .unwrap();

        assert_eq!(device.quantity, 10);
        assert_eq!(device.average_cost, dec("15.00"));
        assert_eq!(draft.kind, MovementKind::In);
        assert_eq!(draft.unit_cost, Some(dec("20.00")));
    }

    #[test]
    fn weighted_average_rounds_half_up() {
        let mut device = test_device(3, "10.00");
        ledger()
            .apply_movement(
                &mut device,
                MovementInput::receipt(1, dec("10.01"), test_actor(), "purchase"),
            )
            .unwrap();

        // (30.00 + 10.01) / 4 = 10.0025 -> 10.00
        assert_eq!(device.average_cost, dec("10.00"));

        let mut device = test_device(1, "1.00");
        ledger()
            .apply_movement(
                &mut device,
                MovementInput::receipt(1, dec("1.01"), test_actor(), "purchase"),
            )
            .unwrap();

        // 2.01 / 2 = 1.005 -> 1.01
        assert_eq!(device.average_cost, dec("1.01"));
    }

    #[test]
    fn restock_without_cost_keeps_average() {
        let mut device = test_device(4, "12.50");
        let draft = ledger()
            .apply_movement(
                &mut device,
                MovementInput::restock(6, test_actor(), "recount intake"),
            )
            .unwrap();

        assert_eq!(device.quantity, 10);
        assert_eq!(device.average_cost, dec("12.50"));
        // The effective cost is still recorded so replay stays exact.
        assert_eq!(draft.unit_cost, Some(dec("12.50")));
    }

    #[test]
    fn issue_requires_sufficient_stock() {
        let mut device = test_device(2, "10.00");
        let err = ledger()
            .apply_movement(&mut device, MovementInput::issue(5, test_actor(), "sale"))
            .unwrap_err();

        assert_eq!(err.code(), Some(ValidationCode::InsufficientStock));
        assert_eq!(device.quantity, 2, "failed issue must not mutate the row");
    }

    #[test]
    fn issue_to_zero_resets_average_cost() {
        let mut device = test_device(3, "10.00");
        let draft = ledger()
            .apply_movement(&mut device, MovementInput::issue(3, test_actor(), "sale"))
            .unwrap();

        assert_eq!(device.quantity, 0);
        assert_eq!(device.average_cost, Decimal::ZERO);
        assert_eq!(draft.unit_cost, Some(dec("10.00")), "records the issuing cost");
    }

    #[test]
    fn partial_issue_keeps_average_cost() {
        let mut device = test_device(5, "10.00");
        ledger()
            .apply_movement(&mut device, MovementInput::issue(2, test_actor(), "sale"))
            .unwrap();

        assert_eq!(device.quantity, 3);
        assert_eq!(device.average_cost, dec("10.00"));
    }

    #[test]
    fn adjust_sets_absolute_quantity() {
        let mut device = test_device(5, "10.00");
        ledger()
            .apply_movement(
                &mut device,
                MovementInput::adjustment(8, None, test_actor(), "recount"),
            )
            .unwrap();

        assert_eq!(device.quantity, 8);
        assert_eq!(device.average_cost, dec("10.00"));
    }

    #[test]
    fn adjust_to_zero_resets_cost() {
        let mut device = test_device(5, "10.00");
        ledger()
            .apply_movement(
                &mut device,
                MovementInput::adjustment(0, None, test_actor(), "write-off"),
            )
            .unwrap();

        assert_eq!(device.quantity, 0);
        assert_eq!(device.average_cost, Decimal::ZERO);
    }

    #[test]
    fn adjust_can_overwrite_cost_while_stocked() {
        let mut device = test_device(5, "10.00");
        ledger()
            .apply_movement(
                &mut device,
                MovementInput::adjustment(5, Some(dec("11.115")), test_actor(), "revaluation"),
            )
            .unwrap();

        assert_eq!(device.average_cost, dec("11.12"));
    }

    #[test]
    fn nonpositive_quantities_are_rejected() {
        let mut device = test_device(5, "10.00");
        for input in [
            MovementInput::restock(0, test_actor(), "noop"),
            MovementInput::issue(-1, test_actor(), "noop"),
            MovementInput::adjustment(-3, None, test_actor(), "noop"),
        ] {
            let err = ledger().apply_movement(&mut device, input).unwrap_err();
            assert_eq!(err.code(), Some(ValidationCode::InvalidQuantity));
        }
        assert_eq!(device.quantity, 5);
    }

    #[test]
    fn unknown_kind_is_refused() {
        let mut device = test_device(5, "10.00");
        let input = MovementInput {
            kind: MovementKind::Unknown,
            quantity: 1,
            unit_cost: None,
            actor: test_actor(),
            reason: "legacy".into(),
        };
        let err = ledger().apply_movement(&mut device, input).unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::InvalidMovement));
    }

    #[test]
    fn negative_cost_is_refused() {
        let mut device = test_device(5, "10.00");
        let err = ledger()
            .apply_movement(
                &mut device,
                MovementInput::receipt(1, dec("-3.00"), test_actor(), "bad feed"),
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::InvalidMovement));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn receipts_follow_the_weighted_mean_recurrence(
            receipts in prop::collection::vec((1i64..200, 1i64..100_000), 1..12)
        ) {
            let ledger = ledger();
            let mut device = test_device(0, "0");

            for (quantity, cents) in receipts {
                let prev_quantity = device.quantity;
                let prev_cost = device.average_cost;
                let unit_cost = Decimal::new(cents, 2);

                ledger
                    .apply_movement(
                        &mut device,
                        MovementInput::receipt(quantity, unit_cost, test_actor(), "purchase"),
                    )
                    .unwrap();

                let expected_quantity = prev_quantity + quantity;
                let expected_cost = money::quantize(
                    (Decimal::from(prev_quantity) * prev_cost
                        + Decimal::from(quantity) * unit_cost)
                        / Decimal::from(expected_quantity),
                );
                prop_assert_eq!(device.quantity, expected_quantity);
                prop_assert_eq!(device.average_cost, expected_cost);
            }
        }

        #[test]
        fn quantity_never_goes_negative(
            ops in prop::collection::vec((0u8..3, 1i64..50, 1i64..10_000), 1..30)
        ) {
            let ledger = ledger();
            let mut device = test_device(0, "0");

            for (op, quantity, cents) in ops {
                let input = match op {
                    0 => MovementInput::receipt(
                        quantity,
                        Decimal::new(cents, 2),
                        test_actor(),
                        "purchase",
                    ),
                    1 => MovementInput::issue(quantity, test_actor(), "sale"),
                    _ => MovementInput::adjustment(quantity, None, test_actor(), "recount"),
                };
                // Invalid ops roll back; valid ops keep the invariant.
                let _ = ledger.apply_movement(&mut device, input);
                prop_assert!(device.quantity >= 0);
                if device.quantity == 0 {
                    prop_assert_eq!(device.average_cost, Decimal::ZERO);
                }
            }
        }
    }
}
