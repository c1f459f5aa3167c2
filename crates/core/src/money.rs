//! Fixed-point cost arithmetic.
//!
//! All quantity/cost math runs on [`rust_decimal::Decimal`]; floats never
//! touch ledger state.

use rust_decimal::{Decimal, RoundingStrategy};

/// Quantize a cost to two fraction digits, rounding the midpoint away from
/// zero. Costs in this domain are non-negative, so this is the round-half-up
/// convention the ledgers were built on.
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Derive a sale price from a cost and a fractional margin.
pub fn apply_margin(cost: Decimal, margin: Decimal) -> Decimal {
    quantize(cost * (Decimal::ONE + margin))
}
