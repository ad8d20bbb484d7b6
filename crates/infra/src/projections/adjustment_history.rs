use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use bakeops_core::AggregateId;
use bakeops_events::EventEnvelope;
use bakeops_inventory::{AGGREGATE_TYPE, Adjustment, AdjustmentFilter, InventoryEvent, InventoryItemId};

use super::ProjectionError;

#[derive(Debug, Default)]
struct History {
    names: HashMap<InventoryItemId, String>,
    entries: HashMap<InventoryItemId, Vec<Adjustment>>,
    cursors: HashMap<AggregateId, u64>,
}

/// Adjustment history read model: every ledger entry, per item and across items.
///
/// Entries carry the item's current name, so renaming an item renames its history.
#[derive(Debug, Default)]
pub struct AdjustmentHistoryProjection {
    inner: RwLock<History>,
}

impl AdjustmentHistoryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// One item's entries matching `filter`, oldest first.
    pub fn for_item(
        &self,
        item_id: &InventoryItemId,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<Adjustment>, ProjectionError> {
        let inner = self.inner.read().map_err(|_| ProjectionError::LockPoisoned)?;
        let entries = inner.entries.get(item_id).cloned().unwrap_or_default();
        Ok(filter.apply(entries))
    }

    /// Entries of every item matching `filter`, oldest first.
    pub fn all(&self, filter: &AdjustmentFilter) -> Result<Vec<Adjustment>, ProjectionError> {
        let inner = self.inner.read().map_err(|_| ProjectionError::LockPoisoned)?;
        Ok(filter.apply(inner.entries.values().flatten().cloned()))
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut inner = self.inner.write().map_err(|_| ProjectionError::LockPoisoned)?;
        let last = inner.cursors.get(&aggregate_id).copied().unwrap_or(0);
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: InventoryEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        if event.item_id().0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(format!(
                "event item_id {} does not match envelope aggregate_id {aggregate_id}",
                event.item_id()
            )));
        }

        match event {
            InventoryEvent::ItemCreated(e) => {
                inner.names.insert(e.item_id, e.name);
            }
            InventoryEvent::ItemUpdated(e) => {
                if let Some(entries) = inner.entries.get_mut(&e.item_id) {
                    for entry in entries.iter_mut() {
                        entry.item_name = e.name.clone();
                    }
                }
                inner.names.insert(e.item_id, e.name);
            }
            InventoryEvent::StockAdjusted(e) => {
                let name = inner.names.get(&e.item_id).cloned().unwrap_or_default();
                let entry = Adjustment::from_event(&e, name, envelope.position());
                inner.entries.entry(e.item_id).or_default().push(entry);
            }
        }

        inner.cursors.insert(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild from scratch by replaying envelopes in commit order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        *self.inner.write().map_err(|_| ProjectionError::LockPoisoned)? = History::default();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.position(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
