//! Infrastructure layer: event store, command dispatch, read models and the
//! application services (inventory ledger, product catalog, production).

pub mod catalog;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod ledger;
pub mod locks;
pub mod production;
pub mod projections;
pub mod read_model;


pub use catalog::{ProductCatalog, ProductChanges};
pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::Config;
pub use ledger::{InventoryLedger, NewItem, Reconciliation};
pub use locks::ItemLocks;
pub use production::ProductionService;
