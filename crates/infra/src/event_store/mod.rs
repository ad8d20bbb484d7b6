//! Append-only event store boundary.
//!
//! Storage-agnostic abstraction for appending to and loading aggregate event
//! streams, including the multi-stream atomic commit production runs need.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
