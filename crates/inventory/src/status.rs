//! Stock status derived from current quantity and the configured minimum level.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tri-state stock health used by listings and reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockStatus {
    Critical,
    Low,
    InStock,
}

impl StockStatus {
    pub fn label(self) -> &'static str {
        match self {
            StockStatus::Critical => "critical",
            StockStatus::Low => "low",
            StockStatus::InStock => "in-stock",
        }
    }

    /// Critical and low items both need restocking.
    pub fn needs_restock(self) -> bool {
        !matches!(self, StockStatus::InStock)
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify stock. Both quantities must be in the same (base) unit.
///
/// Boundaries are inclusive: exactly half of `min_level` is critical and exactly
/// `min_level` is low.
pub fn evaluate_stock_status(current_quantity: Decimal, min_level: Decimal) -> StockStatus {
    let critical_threshold = min_level / Decimal::TWO;
    if current_quantity <= critical_threshold {
        StockStatus::Critical
    } else if current_quantity <= min_level {
        StockStatus::Low
    } else {
        StockStatus::InStock
    }
}
