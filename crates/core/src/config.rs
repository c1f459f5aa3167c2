//! Engine configuration.

use rust_decimal::Decimal;
use tracing::warn;

/// Ledger tuning handed to `StockLedger::new`.
///
/// Passed explicitly so tests and embedders never depend on process-global
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Fractional sale margin applied over average cost when deriving prices.
    pub price_margin: Decimal,
    /// Quantity at or below which an outgoing movement logs a warning.
    pub low_stock_threshold: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            price_margin: Decimal::new(30, 2),
            low_stock_threshold: 3,
        }
    }
}

impl LedgerConfig {
    /// Read overrides from the environment, falling back to defaults.
    /// A present but unparsable value logs a warning and keeps the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            price_margin: env_override("TELSTOCK_PRICE_MARGIN", defaults.price_margin),
            low_stock_threshold: env_override(
                "TELSTOCK_LOW_STOCK_THRESHOLD",
                defaults.low_stock_threshold,
            ),
        }
    }
}

fn env_override<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(name, value = raw.as_str(), "ignoring unparsable override");
            default
        }),
        Err(_) => default,
    }
}
