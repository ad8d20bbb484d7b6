use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;

use bakeops_core::{AggregateId, AggregateRoot};
use bakeops_events::EventEnvelope;
use bakeops_inventory::{
    AGGREGATE_TYPE, InventoryEvent, InventoryItem, InventoryItemId, ItemType, StockStatus, Unit,
    denormalize_cost, evaluate_stock_status, from_base_unit, name_key,
};

use super::ProjectionError;
use crate::read_model::ReadStore;

/// Queryable inventory read model: current stock and status per item.
///
/// Quantities, levels and cost are in base units; the `display_*` helpers convert
/// to the item's display unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub item_id: InventoryItemId,
    pub name: String,
    pub item_type: ItemType,
    pub unit: Unit,
    pub quantity: Decimal,
    pub min_level: Decimal,
    pub max_level: Decimal,
    pub cost_per_base_unit: Decimal,
    pub status: StockStatus,
    pub last_adjusted_at: Option<DateTime<Utc>>,
}

impl StockLevel {
    fn from_item(item: &InventoryItem) -> Self {
        Self {
            item_id: item.id_typed(),
            name: item.name().to_string(),
            item_type: item.item_type(),
            unit: item.unit(),
            quantity: item.current_quantity(),
            min_level: item.min_level(),
            max_level: item.max_level(),
            cost_per_base_unit: item.cost_per_base_unit(),
            status: item.status(),
            last_adjusted_at: item.last_adjusted_at(),
        }
    }

    pub fn display_quantity(&self) -> Decimal {
        from_base_unit(self.quantity, self.unit)
    }

    pub fn display_min_level(&self) -> Decimal {
        from_base_unit(self.min_level, self.unit)
    }

    pub fn display_max_level(&self) -> Decimal {
        from_base_unit(self.max_level, self.unit)
    }

    pub fn display_cost(&self) -> Decimal {
        denormalize_cost(self.cost_per_base_unit, self.unit)
    }

    pub fn stock_value(&self) -> Decimal {
        self.quantity.saturating_mul(self.cost_per_base_unit)
    }

    /// Base-unit quantity needed to refill to the maximum level, once restock is due.
    pub fn reorder_quantity(&self) -> Option<Decimal> {
        self.status
            .needs_restock()
            .then(|| self.max_level - self.quantity)
    }
}

/// Inventory stock projection.
///
/// Consumes committed envelopes (JSON payloads) and keeps the stock catalog:
/// current quantity, status and the name index used for uniqueness checks.
/// Envelopes of other aggregate types are ignored.
#[derive(Debug)]
pub struct InventoryStockProjection<S>
where
    S: ReadStore<InventoryItemId, StockLevel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> InventoryStockProjection<S>
where
    S: ReadStore<InventoryItemId, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, item_id: &InventoryItemId) -> Option<StockLevel> {
        self.store.get(item_id)
    }

    /// All items, ordered by name.
    pub fn list(&self) -> Vec<StockLevel> {
        let mut items = self.store.list();
        items.sort_by(|a, b| name_key(&a.name).cmp(&name_key(&b.name)));
        items
    }

    pub fn list_by_status(&self, status: StockStatus) -> Vec<StockLevel> {
        self.list().into_iter().filter(|i| i.status == status).collect()
    }

    /// Item of `item_type` whose name matches ignoring case and spacing.
    pub fn find_by_name(&self, item_type: ItemType, name: &str) -> Option<StockLevel> {
        let key = name_key(name);
        self.store
            .list()
            .into_iter()
            .find(|i| i.item_type == item_type && name_key(&i.name) == key)
    }

    /// Apply a committed envelope.
    ///
    /// Replays at or below the stream cursor are ignored; gaps are rejected.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self.cursors.write().map_err(|_| ProjectionError::LockPoisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: InventoryEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let item_id = event.item_id();
        if item_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(format!(
                "event item_id {item_id} does not match envelope aggregate_id {aggregate_id}"
            )));
        }

        match event {
            InventoryEvent::ItemCreated(e) => {
                self.store.upsert(
                    e.item_id,
                    StockLevel {
                        item_id: e.item_id,
                        name: e.name,
                        item_type: e.item_type,
                        unit: e.unit,
                        quantity: Decimal::ZERO,
                        min_level: e.min_level,
                        max_level: e.max_level,
                        cost_per_base_unit: e.cost_per_base_unit,
                        status: evaluate_stock_status(Decimal::ZERO, e.min_level),
                        last_adjusted_at: None,
                    },
                );
            }
            InventoryEvent::ItemUpdated(e) => {
                let mut level = self.existing(&e.item_id)?;
                level.name = e.name;
                level.unit = e.unit;
                level.min_level = e.min_level;
                level.max_level = e.max_level;
                level.cost_per_base_unit = e.cost_per_base_unit;
                level.status = evaluate_stock_status(level.quantity, level.min_level);
                self.store.upsert(e.item_id, level);
            }
            InventoryEvent::StockAdjusted(e) => {
                let mut level = self.existing(&e.item_id)?;
                level.quantity = level.quantity.saturating_add(e.amount);
                level.status = evaluate_stock_status(level.quantity, level.min_level);
                level.last_adjusted_at = Some(e.occurred_at);
                self.store.upsert(e.item_id, level);
            }
        }

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    fn existing(&self, item_id: &InventoryItemId) -> Result<StockLevel, ProjectionError> {
        self.store.get(item_id).ok_or_else(|| {
            ProjectionError::StreamMismatch(format!("event for unknown item {item_id}"))
        })
    }

    /// Overwrite one item's row from its rehydrated aggregate (reconciliation).
    pub fn restore(&self, item: &InventoryItem) -> Result<(), ProjectionError> {
        let mut cursors = self.cursors.write().map_err(|_| ProjectionError::LockPoisoned)?;
        self.store.upsert(item.id_typed(), StockLevel::from_item(item));
        cursors.insert(item.id_typed().0, item.version());
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes in commit order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors
            .write()
            .map_err(|_| ProjectionError::LockPoisoned)?
            .clear();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.position(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
