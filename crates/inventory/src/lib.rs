//! Inventory domain module (event-sourced).
//!
//! Unit normalization, stock status and the `InventoryItem` aggregate whose
//! `StockAdjusted` events form the per-item ledger. Pure domain logic: no IO,
//! no storage.

pub mod adjustment;
pub mod item;
pub mod status;
pub mod unit;

pub use adjustment::{
    Adjustment, AdjustmentFilter, AdjustmentId, AdjustmentKind, DateRange, ledger_balance,
};
pub use item::{
    AGGREGATE_TYPE, AdjustStock, CreateItem, InventoryCommand, InventoryEvent, InventoryItem,
    InventoryItemId, ItemCreated, ItemType, ItemUpdated, StockAdjusted, UpdateItem, WriteOff,
    name_key,
};
pub use status::{StockStatus, evaluate_stock_status};
pub use unit::{
    Dimension, Unit, UnitKind, checked_to_base_unit, convert, denormalize_cost, denormalize_cost_lenient,
    from_base_unit, from_base_unit_lenient, normalize_cost, normalize_cost_lenient, to_base_unit,
    to_base_unit_lenient,
};
