//! Ledger entries (adjustments) and the filters used to list them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bakeops_core::UserId;

use crate::item::{InventoryItemId, StockAdjusted};

/// Adjustment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentId(pub Uuid);

impl AdjustmentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AdjustmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AdjustmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Why stock moved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Opening balance recorded when the item is created.
    Initial,
    Manual,
    Purchase,
    Production,
    Waste,
    Expiration,
}

impl AdjustmentKind {
    pub fn label(self) -> &'static str {
        match self {
            AdjustmentKind::Initial => "initial",
            AdjustmentKind::Manual => "manual",
            AdjustmentKind::Purchase => "purchase",
            AdjustmentKind::Production => "production",
            AdjustmentKind::Waste => "waste",
            AdjustmentKind::Expiration => "expiration",
        }
    }

    /// Kinds allowed to remove the entire remaining stock in one write-off.
    pub fn is_write_off(self) -> bool {
        matches!(self, AdjustmentKind::Waste | AdjustmentKind::Expiration)
    }
}

/// One immutable ledger entry, as read back from an item's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub item_id: InventoryItemId,
    pub item_name: String,
    /// Signed delta in the item's base unit.
    pub amount: Decimal,
    pub kind: AdjustmentKind,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    /// Commit position in the event store; breaks ties between equal timestamps.
    pub sequence: u64,
}

impl Adjustment {
    pub fn from_event(event: &StockAdjusted, item_name: impl Into<String>, sequence: u64) -> Self {
        Self {
            id: event.adjustment_id,
            item_id: event.item_id,
            item_name: item_name.into(),
            amount: event.amount,
            kind: event.kind,
            reason: event.reason.clone(),
            created_at: event.occurred_at,
            created_by: event.created_by,
            sequence,
        }
    }
}

/// Running total of a ledger; what an item's current quantity must equal.
pub fn ledger_balance<'a>(entries: impl IntoIterator<Item = &'a Adjustment>) -> Decimal {
    entries.into_iter().map(|a| a.amount).sum()
}

/// Inclusive date range; an open end is unbounded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

/// How to narrow an adjustment listing.
///
/// Text search and date range are mutually exclusive: when both are supplied the
/// text wins and the range is dropped. See [`AdjustmentFilter::from_parts`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AdjustmentFilter {
    #[default]
    All,
    Text(String),
    DateRange(DateRange),
}

impl AdjustmentFilter {
    /// Build a filter from optional request parts. Blank text counts as absent.
    pub fn from_parts(text: Option<&str>, range: Option<DateRange>) -> Self {
        match text.map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => AdjustmentFilter::Text(text.to_string()),
            None => range.map_or(AdjustmentFilter::All, AdjustmentFilter::DateRange),
        }
    }

    pub fn matches(&self, adjustment: &Adjustment) -> bool {
        match self {
            AdjustmentFilter::All => true,
            AdjustmentFilter::DateRange(range) => range.contains(adjustment.created_at),
            AdjustmentFilter::Text(text) => {
                let needle = text.to_lowercase();
                adjustment.item_name.to_lowercase().contains(&needle)
                    || adjustment.kind.label().contains(&needle)
                    || adjustment
                        .reason
                        .as_deref()
                        .is_some_and(|r| r.to_lowercase().contains(&needle))
            }
        }
    }

    /// Filter and order entries by `created_at`, then commit position.
    pub fn apply(&self, entries: impl IntoIterator<Item = Adjustment>) -> Vec<Adjustment> {
        let mut out: Vec<Adjustment> = entries.into_iter().filter(|a| self.matches(a)).collect();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        out
    }
}
