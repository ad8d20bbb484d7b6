use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use bakeops_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    /// Global commit log; `position` is the 1-based index into it.
    log: Vec<StoredEvent>,
}

impl Inner {
    fn current_version(&self, aggregate_id: &AggregateId) -> u64 {
        self.streams
            .get(aggregate_id)
            .and_then(|s| s.last())
            .map(|e| e.sequence_number)
            .unwrap_or(0)
    }

    /// Check a single-stream batch against the current state without writing.
    fn validate(&self, append: &StreamAppend) -> Result<(), EventStoreError> {
        let Some(first) = append.events.first() else {
            return Ok(());
        };
        let aggregate_id = first.aggregate_id;
        let aggregate_type = &first.aggregate_type;

        for (idx, e) in append.events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if &e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let current = self.current_version(&aggregate_id);
        if !append.expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {aggregate_id}: expected {:?}, found {current}",
                append.expected_version
            )));
        }

        // Aggregate type is fixed by the first event of the stream.
        if let Some(existing) = self.streams.get(&aggregate_id).and_then(|s| s.first())
            && &existing.aggregate_type != aggregate_type
        {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream aggregate_type is '{}', attempted append with '{}'",
                existing.aggregate_type, aggregate_type
            )));
        }

        Ok(())
    }

    /// Assign sequence numbers and positions and write. Call only after `validate`.
    fn commit(&mut self, events: Vec<UncommittedEvent>) -> Vec<StoredEvent> {
        let Some(aggregate_id) = events.first().map(|e| e.aggregate_id) else {
            return vec![];
        };

        let mut next = self.current_version(&aggregate_id) + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                position: self.log.len() as u64 + 1,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            self.log.push(stored.clone());
            self.streams.entry(aggregate_id).or_default().push(stored.clone());
            committed.push(stored);
        }
        committed
    }
}

/// In-memory append-only event store.
///
/// Intended for tests and embedding. A single `RwLock` guards all streams, so an
/// atomic multi-stream append is trivially all-or-nothing.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> EventStoreError {
    EventStoreError::Unavailable("event store lock poisoned".to_string())
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let append = StreamAppend::new(events, expected_version);
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.validate(&append)?;
        Ok(inner.commit(append.events))
    }

    fn append_atomic(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let appends: Vec<_> = appends.into_iter().filter(|a| !a.events.is_empty()).collect();

        let mut seen = HashSet::new();
        for append in &appends {
            if let Some(id) = append.aggregate_id()
                && !seen.insert(id)
            {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {id} appears more than once in an atomic append"
                )));
            }
        }

        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        for append in &appends {
            inner.validate(append)?;
        }

        let mut committed = Vec::new();
        for append in appends {
            committed.extend(inner.commit(append.events));
        }
        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.log.clone())
    }
}
