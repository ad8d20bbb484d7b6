//! Event abstractions shared by the inventory, product and production aggregates.

pub mod envelope;
pub mod event;
pub mod handler;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
