//! Production domain module.
//!
//! Turns a product's recipe into a production plan (batches, deductions, cost),
//! records runs in a numbered journal, and rolls recipes up into unit costs and
//! margins.

pub mod costing;
pub mod ingredient;
pub mod journal;
pub mod plan;

pub use costing::{CostLine, ProductCost, product_cost};
pub use ingredient::{Ingredient, IngredientSource};
pub use journal::{
    AGGREGATE_TYPE, IngredientDeduction, JournalCommand, JournalEvent, ProductionJournal,
    ProductionJournalId, ProductionRun, ProductionRunId, ProductionRunRecorded,
    RecordProductionRun,
};
pub use plan::{PlannedDeduction, ProductionPlan, batches_for, plan_production};
