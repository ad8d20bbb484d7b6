//! Inventory ledger service.
//!
//! Every stock movement is a `StockAdjusted` event on the item's stream, so the
//! current quantity is a fold over the ledger. Mutations of one item are
//! serialized through [`ItemLocks`]; the event store's version check backs that up.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use bakeops_core::{AggregateId, DomainError, UserId};
use bakeops_events::EventEnvelope;
use bakeops_inventory::{
    AGGREGATE_TYPE, AdjustStock, Adjustment, AdjustmentFilter, AdjustmentId, AdjustmentKind,
    CreateItem, InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId, ItemType,
    StockStatus, Unit, UpdateItem, WriteOff, ledger_balance,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::Config;
use crate::event_store::{EventStore, StoredEvent};
use crate::locks::ItemLocks;
use crate::projections::{AdjustmentHistoryProjection, InventoryStockProjection, StockLevel};
use crate::read_model::InMemoryReadStore;

pub type StockStore = InMemoryReadStore<InventoryItemId, StockLevel>;

/// New-item form input, in the display unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub item_type: ItemType,
    pub unit: Unit,
    pub quantity: Decimal,
    pub min_level: Decimal,
    pub max_level: Decimal,
    /// Cost per display unit.
    pub cost: Decimal,
}

/// Outcome of comparing the cached stock row with a replay of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub item_id: InventoryItemId,
    /// Sum of every ledger entry.
    pub ledger_balance: Decimal,
    /// Quantity the read model held before reconciling.
    pub cached_quantity: Option<Decimal>,
    /// `ledger_balance - cached_quantity` (the whole balance when nothing was cached).
    pub drift: Decimal,
    pub repaired: bool,
}

pub struct InventoryLedger<S> {
    dispatcher: CommandDispatcher<S>,
    locks: ItemLocks,
    /// Serializes name-uniqueness check plus create/rename.
    names: Mutex<()>,
    stock: InventoryStockProjection<StockStore>,
    history: AdjustmentHistoryProjection,
    config: Config,
}

/// Timestamp for a new ledger entry: now, or the latest entry's time if the
/// clock has stepped back past it.
pub(crate) fn ledger_timestamp(latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    latest.map_or(now, |latest| latest.max(now))
}

pub(crate) fn make_item(id: AggregateId) -> InventoryItem {
    InventoryItem::empty(InventoryItemId::new(id))
}

impl<S> InventoryLedger<S>
where
    S: EventStore,
{
    pub fn new(store: S, config: Config) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
            locks: ItemLocks::new(),
            names: Mutex::new(()),
            stock: InventoryStockProjection::new(StockStore::new()),
            history: AdjustmentHistoryProjection::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn dispatcher(&self) -> &CommandDispatcher<S> {
        &self.dispatcher
    }

    pub(crate) fn locks(&self) -> &ItemLocks {
        &self.locks
    }

    /// Create an item; its opening quantity becomes the first ledger entry.
    pub fn create_item(&self, item: NewItem, actor: UserId) -> Result<InventoryItem, DispatchError> {
        let _names = self
            .names
            .lock()
            .map_err(|_| DispatchError::LockPoisoned("item names".to_string()))?;
        self.ensure_name_free(item.item_type, &item.name, None)?;

        let item_id = InventoryItemId::new(AggregateId::new());
        let command = InventoryCommand::CreateItem(CreateItem {
            item_id,
            name: item.name,
            item_type: item.item_type,
            unit: item.unit,
            initial_quantity: item.quantity,
            min_level: item.min_level,
            max_level: item.max_level,
            cost: item.cost,
            initial_adjustment_id: AdjustmentId::new(),
            created_by: actor,
            occurred_at: Utc::now(),
        });

        let committed = self.run(item_id, command)?;
        self.project(&committed)?;

        let created = self.item(item_id)?;
        tracing::info!(
            item_id = %item_id,
            name = created.name(),
            quantity = %created.current_quantity(),
            unit = %created.base_unit(),
            "inventory item created"
        );
        Ok(created)
    }

    /// Edit name, display unit, levels or cost. Quantity only moves through the ledger.
    pub fn update_item(
        &self,
        item_id: InventoryItemId,
        changes: UpdateItem,
    ) -> Result<InventoryItem, DispatchError> {
        let _names = self
            .names
            .lock()
            .map_err(|_| DispatchError::LockPoisoned("item names".to_string()))?;
        let locks = self.locks.one(item_id.0)?;
        let _guards = locks.acquire()?;

        if let Some(name) = &changes.name {
            let current = self.item(item_id)?;
            self.ensure_name_free(current.item_type(), name, Some(item_id))?;
        }

        let command = InventoryCommand::UpdateItem {
            item_id,
            changes,
            occurred_at: Utc::now(),
        };
        let committed = self.run(item_id, command)?;
        self.project(&committed)?;

        tracing::info!(item_id = %item_id, "inventory item updated");
        self.item(item_id)
    }

    /// Append one signed base-unit delta to the item's ledger.
    ///
    /// Rejected with a validation error, leaving the ledger untouched, when the
    /// result would be negative.
    pub fn record_adjustment(
        &self,
        item_id: InventoryItemId,
        amount: Decimal,
        kind: AdjustmentKind,
        reason: Option<String>,
        actor: UserId,
    ) -> Result<Adjustment, DispatchError> {
        let locks = self.locks.one(item_id.0)?;
        let _guards = locks.acquire()?;

        let command = InventoryCommand::AdjustStock(AdjustStock {
            item_id,
            adjustment_id: AdjustmentId::new(),
            amount,
            kind,
            reason,
            created_by: actor,
            occurred_at: self.entry_timestamp(item_id),
        });
        let committed = self.run(item_id, command)?;
        self.project(&committed)?;

        let adjustment = self.adjustment_from(&committed)?;
        tracing::info!(
            item_id = %item_id,
            amount = %adjustment.amount,
            kind = adjustment.kind.label(),
            "stock adjustment recorded"
        );
        Ok(adjustment)
    }

    /// Remove exactly the stock on hand as waste or expiration.
    pub fn write_off(
        &self,
        item_id: InventoryItemId,
        kind: AdjustmentKind,
        reason: Option<String>,
        actor: UserId,
    ) -> Result<Adjustment, DispatchError> {
        if !self.config.write_off_enabled {
            tracing::warn!(item_id = %item_id, "write-off rejected: disabled by configuration");
            return Err(DomainError::validation("write-offs are disabled").into());
        }

        let locks = self.locks.one(item_id.0)?;
        let _guards = locks.acquire()?;

        let command = InventoryCommand::WriteOff(WriteOff {
            item_id,
            adjustment_id: AdjustmentId::new(),
            kind,
            reason,
            created_by: actor,
            occurred_at: self.entry_timestamp(item_id),
        });
        let committed = self.run(item_id, command)?;
        self.project(&committed)?;

        let adjustment = self.adjustment_from(&committed)?;
        tracing::info!(
            item_id = %item_id,
            amount = %adjustment.amount,
            kind = adjustment.kind.label(),
            "stock written off"
        );
        Ok(adjustment)
    }

    /// One item's ledger entries, oldest first.
    ///
    /// A non-blank text filter takes precedence over a date range; see
    /// [`AdjustmentFilter::from_parts`].
    pub fn list_adjustments(
        &self,
        item_id: InventoryItemId,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<Adjustment>, DispatchError> {
        self.stock_level(item_id)?;
        Ok(self.history.for_item(&item_id, filter)?)
    }

    /// Ledger entries across every item, oldest first.
    pub fn list_all_adjustments(&self, filter: &AdjustmentFilter) -> Result<Vec<Adjustment>, DispatchError> {
        Ok(self.history.all(filter)?)
    }

    /// Current quantity in base units.
    pub fn current_quantity(&self, item_id: InventoryItemId) -> Result<Decimal, DispatchError> {
        Ok(self.stock_level(item_id)?.quantity)
    }

    /// Item rehydrated from its stream.
    pub fn item(&self, item_id: InventoryItemId) -> Result<InventoryItem, DispatchError> {
        let item = self.dispatcher.load(item_id.0, make_item)?;
        if !item.is_created() {
            return Err(DomainError::not_found(format!("inventory item {item_id}")).into());
        }
        Ok(item)
    }

    pub fn stock_level(&self, item_id: InventoryItemId) -> Result<StockLevel, DispatchError> {
        self.stock
            .get(&item_id)
            .ok_or_else(|| DomainError::not_found(format!("inventory item {item_id}")).into())
    }

    pub fn stock_levels(&self) -> Vec<StockLevel> {
        self.stock.list()
    }

    pub fn items_by_status(&self, status: StockStatus) -> Vec<StockLevel> {
        self.stock.list_by_status(status)
    }

    /// Replay the item's ledger and repair the cached stock row if it drifted.
    pub fn reconcile(&self, item_id: InventoryItemId) -> Result<Reconciliation, DispatchError> {
        let locks = self.locks.one(item_id.0)?;
        let _guards = locks.acquire()?;

        let item = self.item(item_id)?;
        let entries = self.history.for_item(&item_id, &AdjustmentFilter::All)?;
        let balance = item.current_quantity();
        if ledger_balance(&entries) != balance {
            // History lags the stream; rebuild it before trusting either read model.
            self.rebuild_history()?;
        }

        let cached_quantity = self.stock.get(&item_id).map(|l| l.quantity);
        let drift = balance - cached_quantity.unwrap_or(Decimal::ZERO);
        let repaired = cached_quantity != Some(balance);

        if repaired {
            self.stock.restore(&item)?;
            tracing::warn!(
                item_id = %item_id,
                ledger_balance = %balance,
                drift = %drift,
                "stock read model drifted from ledger; repaired"
            );
        }

        Ok(Reconciliation {
            item_id,
            ledger_balance: balance,
            cached_quantity,
            drift,
            repaired,
        })
    }

    /// Drop and rebuild both read models from the event store.
    pub fn rebuild_read_models(&self) -> Result<(), DispatchError> {
        let envelopes = self.envelopes()?;
        self.stock.rebuild_from_scratch(envelopes.clone())?;
        self.history.rebuild_from_scratch(envelopes)?;
        Ok(())
    }

    fn rebuild_history(&self) -> Result<(), DispatchError> {
        Ok(self.history.rebuild_from_scratch(self.envelopes()?)?)
    }

    fn envelopes(&self) -> Result<Vec<EventEnvelope<JsonValue>>, DispatchError> {
        Ok(self
            .dispatcher
            .store()
            .load_all()?
            .iter()
            .map(StoredEvent::to_envelope)
            .collect())
    }

    /// Feed committed events into the read models.
    pub(crate) fn project(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        for stored in committed {
            let envelope = stored.to_envelope();
            self.stock.apply_envelope(&envelope)?;
            self.history.apply_envelope(&envelope)?;
        }
        Ok(())
    }

    fn run(&self, item_id: InventoryItemId, command: InventoryCommand) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, command, make_item)
            .inspect_err(|err| {
                tracing::warn!(item_id = %item_id, error = %err, "inventory command rejected");
            })
    }

    fn entry_timestamp(&self, item_id: InventoryItemId) -> DateTime<Utc> {
        ledger_timestamp(self.stock.get(&item_id).and_then(|l| l.last_adjusted_at))
    }

    fn ensure_name_free(
        &self,
        item_type: ItemType,
        name: &str,
        except: Option<InventoryItemId>,
    ) -> Result<(), DispatchError> {
        match self.stock.find_by_name(item_type, name) {
            Some(existing) if Some(existing.item_id) != except => Err(DomainError::validation(format!(
                "an item named '{}' already exists",
                existing.name
            ))
            .into()),
            _ => Ok(()),
        }
    }

    fn adjustment_from(&self, committed: &[StoredEvent]) -> Result<Adjustment, DispatchError> {
        for stored in committed {
            let event: InventoryEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            if let InventoryEvent::StockAdjusted(e) = event {
                let name = self
                    .stock
                    .get(&e.item_id)
                    .map(|l| l.name)
                    .unwrap_or_default();
                return Ok(Adjustment::from_event(&e, name, stored.position));
            }
        }
        Err(DispatchError::Deserialize(
            "committed batch holds no stock adjustment".to_string(),
        ))
    }
}
