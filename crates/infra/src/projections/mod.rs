//! Projection implementations (read model builders).
//!
//! Projections consume committed envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: can be reconstructed from the event store
//! - **Idempotent**: replays at or below a stream's cursor are ignored

use thiserror::Error;

pub mod adjustment_history;
pub mod inventory_stock;

pub use adjustment_history::AdjustmentHistoryProjection;
pub use inventory_stock::{InventoryStockProjection, StockLevel};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("event does not belong to its envelope's stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("read model lock poisoned")]
    LockPoisoned,
}
