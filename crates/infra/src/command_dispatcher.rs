//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//! ```
//!
//! Read models are updated by the services after a successful append; the
//! dispatcher itself only talks to the store.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use bakeops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ErrorKind, ExpectedVersion};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
use crate::projections::ProjectionError;

/// Error returned by the application services.
///
/// Callers branch on [`DispatchError::kind`]; the variants keep the layer the
/// failure came from for logging.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic domain rejection (validation, not found, conflict).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisting to or loading from the event store failed.
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// A read model could not absorb a committed event.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// A lock guarding an item or read model was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Domain(e) => e.kind(),
            DispatchError::Store(e) => e.kind(),
            DispatchError::Projection(_)
            | DispatchError::Deserialize(_)
            | DispatchError::LockPoisoned(_) => ErrorKind::Unavailable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Concurrency is optimistic: the stream version seen at load time is the
/// expected version at append time, so a concurrent writer surfaces as
/// [`ErrorKind::Conflict`]. The services add per-item locks on top.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Rehydrate an aggregate from its stream.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command through the full pipeline and return the committed events.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: bakeops_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate = self.load(aggregate_id, make_aggregate)?;
        let append = prepare(&aggregate, aggregate_id, aggregate_type, &command)?;
        if append.events.is_empty() {
            return Ok(vec![]);
        }

        Ok(self.store.append(append.events, append.expected_version)?)
    }
}

/// Decide a command against an already rehydrated aggregate without persisting.
///
/// The returned append expects the stream to still be at the aggregate's version;
/// several of these can be committed together with [`EventStore::append_atomic`].
pub fn prepare<A>(
    aggregate: &A,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    command: &A::Command,
) -> Result<StreamAppend, DispatchError>
where
    A: Aggregate<Error = DomainError>,
    A::Event: bakeops_events::Event + Serialize,
{
    let decided = aggregate.handle(command)?;
    let events = decided
        .iter()
        .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StreamAppend::new(
        events,
        ExpectedVersion::Exact(aggregate.version()),
    ))
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use bakeops_core::UserId;
    use bakeops_inventory::{
        AGGREGATE_TYPE, AdjustStock, AdjustmentId, AdjustmentKind, CreateItem, InventoryCommand,
        InventoryItem, InventoryItemId, ItemType, Unit,
    };

    use crate::event_store::InMemoryEventStore;

    fn create(item_id: InventoryItemId) -> InventoryCommand {
        InventoryCommand::CreateItem(CreateItem {
            item_id,
            name: "Flour".to_string(),
            item_type: ItemType::RawMaterial,
            unit: Unit::Kilogram,
            initial_quantity: dec!(2),
            min_level: dec!(1),
            max_level: dec!(10),
            cost: dec!(12),
            initial_adjustment_id: AdjustmentId::new(),
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn adjust(item_id: InventoryItemId, amount: rust_decimal::Decimal) -> InventoryCommand {
        InventoryCommand::AdjustStock(AdjustStock {
            item_id,
            adjustment_id: AdjustmentId::new(),
            amount,
            kind: AdjustmentKind::Manual,
            reason: None,
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_and_rehydrates() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let item_id = InventoryItemId::new(AggregateId::new());

        let committed = dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, create(item_id), |id| {
                InventoryItem::empty(InventoryItemId::new(id))
            })
            .unwrap();
        // Creation plus the opening-balance ledger entry.
        assert_eq!(committed.len(), 2);

        dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, adjust(item_id, dec!(-500)), |id| {
                InventoryItem::empty(InventoryItemId::new(id))
            })
            .unwrap();

        let item: InventoryItem = dispatcher
            .load(item_id.0, |id| InventoryItem::empty(InventoryItemId::new(id)))
            .unwrap();
        assert_eq!(item.current_quantity(), dec!(1500));
        assert_eq!(item.version(), 3);
    }

    #[test]
    fn domain_rejection_keeps_its_kind_and_appends_nothing() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let item_id = InventoryItemId::new(AggregateId::new());

        let err = dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, adjust(item_id, dec!(5)), |id| {
                InventoryItem::empty(InventoryItemId::new(id))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(dispatcher.store().load_stream(item_id.0).unwrap().is_empty());
    }

    #[test]
    fn prepared_append_conflicts_after_concurrent_write() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let item_id = InventoryItemId::new(AggregateId::new());
        let make = |id| InventoryItem::empty(InventoryItemId::new(id));

        dispatcher.dispatch(item_id.0, AGGREGATE_TYPE, create(item_id), make).unwrap();
        let stale: InventoryItem = dispatcher.load(item_id.0, make).unwrap();
        dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, adjust(item_id, dec!(10)), make)
            .unwrap();

        let append = prepare(&stale, item_id.0, AGGREGATE_TYPE, &adjust(item_id, dec!(-10))).unwrap();
        let err = DispatchError::from(
            dispatcher
                .store()
                .append_atomic(vec![append])
                .unwrap_err(),
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
    }
}
