use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bakeops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use bakeops_events::Event;

use crate::adjustment::{AdjustmentId, AdjustmentKind};
use crate::status::{StockStatus, evaluate_stock_status};
use crate::unit::{Unit, checked_to_base_unit, denormalize_cost, from_base_unit, normalize_cost};

/// Aggregate type tag used for inventory item streams.
pub const AGGREGATE_TYPE: &str = "inventory.item";

/// Inventory item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stock category; item names are unique within a type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    RawMaterial,
    Supplies,
}

/// Case- and whitespace-insensitive key used for name uniqueness.
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Aggregate root: InventoryItem.
///
/// Every quantity and the cost are held in base units. `current_quantity` is the
/// fold of all `StockAdjusted` events; nothing else changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    name: String,
    item_type: ItemType,
    unit: Unit,
    current_quantity: Decimal,
    min_level: Decimal,
    max_level: Decimal,
    cost_per_base_unit: Decimal,
    last_adjusted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            name: String::new(),
            item_type: ItemType::RawMaterial,
            unit: Unit::Gram,
            current_quantity: Decimal::ZERO,
            min_level: Decimal::ZERO,
            max_level: Decimal::ZERO,
            cost_per_base_unit: Decimal::ZERO,
            last_adjusted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// Display unit chosen for the item.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn base_unit(&self) -> Unit {
        self.unit.base_unit()
    }

    /// Current quantity in base units.
    pub fn current_quantity(&self) -> Decimal {
        self.current_quantity
    }

    pub fn min_level(&self) -> Decimal {
        self.min_level
    }

    pub fn max_level(&self) -> Decimal {
        self.max_level
    }

    pub fn cost_per_base_unit(&self) -> Decimal {
        self.cost_per_base_unit
    }

    pub fn last_adjusted_at(&self) -> Option<DateTime<Utc>> {
        self.last_adjusted_at
    }

    pub fn status(&self) -> StockStatus {
        evaluate_stock_status(self.current_quantity, self.min_level)
    }

    pub fn display_quantity(&self) -> Decimal {
        from_base_unit(self.current_quantity, self.unit)
    }

    pub fn display_cost(&self) -> Decimal {
        denormalize_cost(self.cost_per_base_unit, self.unit)
    }

    /// Value of the stock on hand at current cost.
    pub fn stock_value(&self) -> Decimal {
        self.current_quantity.saturating_mul(self.cost_per_base_unit)
    }

    /// Base-unit quantity needed to refill to `max_level`, once at or below `min_level`.
    pub fn reorder_quantity(&self) -> Option<Decimal> {
        if self.status().needs_restock() {
            Some(self.max_level - self.current_quantity)
        } else {
            None
        }
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
///
/// Quantities and cost are in the display `unit`, exactly as entered in the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub item_id: InventoryItemId,
    pub name: String,
    pub item_type: ItemType,
    pub unit: Unit,
    pub initial_quantity: Decimal,
    pub min_level: Decimal,
    pub max_level: Decimal,
    /// Cost per display unit.
    pub cost: Decimal,
    pub initial_adjustment_id: AdjustmentId,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItem (metadata, levels, cost). Quantity is not editable here.
///
/// Levels and cost are in the display unit in effect after the update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub name: Option<String>,
    pub unit: Option<Unit>,
    pub min_level: Option<Decimal>,
    pub max_level: Option<Decimal>,
    pub cost: Option<Decimal>,
}

/// Command: AdjustStock. `amount` is a signed base-unit delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub item_id: InventoryItemId,
    pub adjustment_id: AdjustmentId,
    pub amount: Decimal,
    pub kind: AdjustmentKind,
    pub reason: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WriteOff. Removes exactly the stock on hand (waste/expiration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOff {
    pub item_id: InventoryItemId,
    pub adjustment_id: AdjustmentId,
    pub kind: AdjustmentKind,
    pub reason: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    UpdateItem {
        item_id: InventoryItemId,
        changes: UpdateItem,
        occurred_at: DateTime<Utc>,
    },
    AdjustStock(AdjustStock),
    WriteOff(WriteOff),
}

/// Event: ItemCreated. All values in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub item_id: InventoryItemId,
    pub name: String,
    pub item_type: ItemType,
    pub unit: Unit,
    pub min_level: Decimal,
    pub max_level: Decimal,
    pub cost_per_base_unit: Decimal,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemUpdated. Full post-update snapshot of the editable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub item_id: InventoryItemId,
    pub name: String,
    pub unit: Unit,
    pub min_level: Decimal,
    pub max_level: Decimal,
    pub cost_per_base_unit: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted. One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub item_id: InventoryItemId,
    pub adjustment_id: AdjustmentId,
    pub amount: Decimal,
    pub kind: AdjustmentKind,
    pub reason: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    ItemUpdated(ItemUpdated),
    StockAdjusted(StockAdjusted),
}

impl InventoryEvent {
    pub fn item_id(&self) -> InventoryItemId {
        match self {
            InventoryEvent::ItemCreated(e) => e.item_id,
            InventoryEvent::ItemUpdated(e) => e.item_id,
            InventoryEvent::StockAdjusted(e) => e.item_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::ItemUpdated(_) => "inventory.item.updated",
            InventoryEvent::StockAdjusted(_) => "inventory.item.stock_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::ItemUpdated(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.name = e.name.clone();
                self.item_type = e.item_type;
                self.unit = e.unit;
                self.current_quantity = Decimal::ZERO;
                self.min_level = e.min_level;
                self.max_level = e.max_level;
                self.cost_per_base_unit = e.cost_per_base_unit;
                self.created = true;
            }
            InventoryEvent::ItemUpdated(e) => {
                self.name = e.name.clone();
                self.unit = e.unit;
                self.min_level = e.min_level;
                self.max_level = e.max_level;
                self.cost_per_base_unit = e.cost_per_base_unit;
            }
            InventoryEvent::StockAdjusted(e) => {
                self.current_quantity = self.current_quantity.saturating_add(e.amount);
                self.last_adjusted_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::UpdateItem {
                item_id,
                changes,
                occurred_at,
            } => self.handle_update(*item_id, changes, *occurred_at),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::WriteOff(cmd) => self.handle_write_off(cmd),
        }
    }
}

fn validate_levels(min_level: Decimal, max_level: Decimal) -> Result<(), DomainError> {
    if min_level < Decimal::ZERO {
        return Err(DomainError::validation("minimum level cannot be negative"));
    }
    if min_level >= max_level {
        return Err(DomainError::validation(
            "minimum level must be lower than maximum level",
        ));
    }
    Ok(())
}

fn validate_cost(cost: Decimal) -> Result<(), DomainError> {
    if cost <= Decimal::ZERO {
        return Err(DomainError::validation("cost must be greater than zero"));
    }
    Ok(())
}

impl InventoryItem {
    fn ensure_exists(&self, item_id: InventoryItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("inventory item {item_id}")));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_backdated(&self, occurred_at: DateTime<Utc>) -> Result<(), DomainError> {
        match self.last_adjusted_at {
            Some(last) if occurred_at < last => Err(DomainError::validation(format!(
                "adjustment dated {occurred_at} precedes the latest ledger entry ({last})"
            ))),
            _ => Ok(()),
        }
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.initial_quantity < Decimal::ZERO {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        validate_cost(cmd.cost)?;

        let min_level = checked_to_base_unit(cmd.min_level, cmd.unit)?;
        let max_level = checked_to_base_unit(cmd.max_level, cmd.unit)?;
        validate_levels(min_level, max_level)?;

        let mut events = vec![InventoryEvent::ItemCreated(ItemCreated {
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            item_type: cmd.item_type,
            unit: cmd.unit,
            min_level,
            max_level,
            cost_per_base_unit: normalize_cost(cmd.cost, cmd.unit),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })];

        // The opening balance goes through the ledger like any other movement.
        let initial = checked_to_base_unit(cmd.initial_quantity, cmd.unit)?;
        if initial > Decimal::ZERO {
            events.push(InventoryEvent::StockAdjusted(StockAdjusted {
                item_id: cmd.item_id,
                adjustment_id: cmd.initial_adjustment_id,
                amount: initial,
                kind: AdjustmentKind::Initial,
                reason: Some("initial stock".to_string()),
                created_by: cmd.created_by,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_update(
        &self,
        item_id: InventoryItemId,
        changes: &UpdateItem,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists(item_id)?;

        let name = match &changes.name {
            Some(name) if name.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(name) => name.trim().to_string(),
            None => self.name.clone(),
        };

        let unit = changes.unit.unwrap_or(self.unit);
        if unit.base_unit() != self.unit.base_unit() {
            return Err(DomainError::validation(format!(
                "cannot change unit from {} to {}: stored quantities are in {}",
                self.unit,
                unit,
                self.unit.base_unit()
            )));
        }

        let min_level = match changes.min_level {
            Some(v) => checked_to_base_unit(v, unit)?,
            None => self.min_level,
        };
        let max_level = match changes.max_level {
            Some(v) => checked_to_base_unit(v, unit)?,
            None => self.max_level,
        };
        validate_levels(min_level, max_level)?;

        let cost_per_base_unit = match changes.cost {
            Some(cost) => {
                validate_cost(cost)?;
                normalize_cost(cost, unit)
            }
            None => self.cost_per_base_unit,
        };

        Ok(vec![InventoryEvent::ItemUpdated(ItemUpdated {
            item_id,
            name,
            unit,
            min_level,
            max_level,
            cost_per_base_unit,
            occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists(cmd.item_id)?;

        if cmd.amount.is_zero() {
            return Err(DomainError::validation("adjustment amount cannot be zero"));
        }
        if cmd.kind == AdjustmentKind::Initial {
            return Err(DomainError::validation(
                "initial stock is only recorded when the item is created",
            ));
        }
        self.ensure_not_backdated(cmd.occurred_at)?;

        let new_quantity = self
            .current_quantity
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::validation("amount out of range"))?;
        if new_quantity < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "insufficient stock for {}: on hand {} {}, adjustment {}",
                self.name,
                self.current_quantity,
                self.base_unit(),
                cmd.amount
            )));
        }

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            item_id: cmd.item_id,
            adjustment_id: cmd.adjustment_id,
            amount: cmd.amount,
            kind: cmd.kind,
            reason: cmd.reason.clone(),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_write_off(&self, cmd: &WriteOff) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists(cmd.item_id)?;

        if !cmd.kind.is_write_off() {
            return Err(DomainError::validation(format!(
                "'{}' adjustments cannot write off stock",
                cmd.kind.label()
            )));
        }
        if self.current_quantity <= Decimal::ZERO {
            return Err(DomainError::validation("nothing to write off: stock is empty"));
        }
        self.ensure_not_backdated(cmd.occurred_at)?;

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            item_id: cmd.item_id,
            adjustment_id: cmd.adjustment_id,
            amount: -self.current_quantity,
            kind: cmd.kind,
            reason: cmd.reason.clone(),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakeops_events::execute;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn test_item_id() -> InventoryItemId {
        InventoryItemId::new(AggregateId::new())
    }

    fn create_cmd(item_id: InventoryItemId, unit: Unit, quantity: Decimal, cost: Decimal) -> CreateItem {
        CreateItem {
            item_id,
            name: "Bread Flour".to_string(),
            item_type: ItemType::RawMaterial,
            unit,
            initial_quantity: quantity,
            min_level: dec!(2),
            max_level: dec!(50),
            cost,
            initial_adjustment_id: AdjustmentId::new(),
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        }
    }

    fn created(unit: Unit, quantity: Decimal) -> InventoryItem {
        let item_id = test_item_id();
        let mut item = InventoryItem::empty(item_id);
        execute(
            &mut item,
            &InventoryCommand::CreateItem(create_cmd(item_id, unit, quantity, dec!(10))),
        )
        .unwrap();
        item
    }

    fn adjust(item: &InventoryItem, amount: Decimal) -> InventoryCommand {
        InventoryCommand::AdjustStock(AdjustStock {
            item_id: item.id_typed(),
            adjustment_id: AdjustmentId::new(),
            amount,
            kind: AdjustmentKind::Manual,
            reason: Some("stock count".to_string()),
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn kilogram_item_is_stored_in_grams() {
        let item_id = test_item_id();
        let item = InventoryItem::empty(item_id);
        let events = item
            .handle(&InventoryCommand::CreateItem(create_cmd(
                item_id,
                Unit::Kilogram,
                dec!(5),
                dec!(12000),
            )))
            .unwrap();
        assert_eq!(events.len(), 2);

        match &events[0] {
            InventoryEvent::ItemCreated(e) => {
                assert_eq!(e.cost_per_base_unit, dec!(12));
                assert_eq!(e.min_level, dec!(2000));
                assert_eq!(e.max_level, dec!(50000));
            }
            other => panic!("Expected ItemCreated, got {other:?}"),
        }
        match &events[1] {
            InventoryEvent::StockAdjusted(e) => {
                assert_eq!(e.amount, dec!(5000));
                assert_eq!(e.kind, AdjustmentKind::Initial);
            }
            other => panic!("Expected StockAdjusted, got {other:?}"),
        }

        let mut item = item;
        for e in &events {
            item.apply(e);
        }
        assert_eq!(item.current_quantity(), dec!(5000));
        assert_eq!(item.display_quantity(), dec!(5));
        assert_eq!(item.display_cost(), dec!(12000));
        assert_eq!(item.stock_value(), dec!(60000));
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn zero_initial_quantity_emits_no_ledger_entry() {
        let item = created(Unit::Gram, dec!(0));
        assert_eq!(item.current_quantity(), dec!(0));
        assert_eq!(item.version(), 1);
    }

    #[test]
    fn create_rejects_invalid_input() {
        let item_id = test_item_id();
        let item = InventoryItem::empty(item_id);

        let mut zero_cost = create_cmd(item_id, Unit::Gram, dec!(1), dec!(0));
        zero_cost.cost = dec!(0);
        let mut negative_qty = create_cmd(item_id, Unit::Gram, dec!(-1), dec!(1));
        negative_qty.initial_quantity = dec!(-1);
        let mut inverted = create_cmd(item_id, Unit::Gram, dec!(1), dec!(1));
        inverted.min_level = dec!(50);
        inverted.max_level = dec!(50);
        let mut blank = create_cmd(item_id, Unit::Gram, dec!(1), dec!(1));
        blank.name = "  ".to_string();

        for cmd in [zero_cost, negative_qty, inverted, blank] {
            let err = item.handle(&InventoryCommand::CreateItem(cmd)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "got {err:?}");
        }
    }

    #[test]
    fn create_twice_is_a_conflict() {
        let item = created(Unit::Gram, dec!(1));
        let err = item
            .handle(&InventoryCommand::CreateItem(create_cmd(
                item.id_typed(),
                Unit::Gram,
                dec!(1),
                dec!(1),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn negative_result_is_rejected_and_state_unchanged() {
        let mut item = created(Unit::Gram, dec!(100));
        let before = item.clone();

        let err = execute(&mut item, &adjust(&before, dec!(-150))).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(item, before);
        assert_eq!(item.current_quantity(), dec!(100));
    }

    #[test]
    fn oversized_adjustment_is_rejected_without_overflow() {
        let mut item = created(Unit::Kilogram, dec!(1));
        let before = item.clone();

        let err = execute(&mut item, &adjust(&before, Decimal::MAX)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(item, before);

        let cmd = adjust(&item, dec!(5));
        execute(&mut item, &cmd).unwrap();
        assert_eq!(item.current_quantity(), dec!(1005));
    }

    #[test]
    fn adjustment_to_exactly_zero_is_allowed() {
        let mut item = created(Unit::Gram, dec!(100));
        let cmd = adjust(&item, dec!(-100));
        execute(&mut item, &cmd).unwrap();
        assert_eq!(item.current_quantity(), dec!(0));
        assert_eq!(item.status(), StockStatus::Critical);
    }

    #[test]
    fn zero_and_initial_adjustments_are_rejected() {
        let item = created(Unit::Gram, dec!(100));
        assert!(matches!(
            item.handle(&adjust(&item, dec!(0))),
            Err(DomainError::Validation(_))
        ));

        let mut cmd = adjust(&item, dec!(5));
        if let InventoryCommand::AdjustStock(ref mut c) = cmd {
            c.kind = AdjustmentKind::Initial;
        }
        assert!(matches!(item.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn backdated_adjustment_is_rejected() {
        let mut item = created(Unit::Gram, dec!(100));
        let cmd = adjust(&item, dec!(5));
        execute(&mut item, &cmd).unwrap();

        let mut late = adjust(&item, dec!(5));
        if let InventoryCommand::AdjustStock(ref mut c) = late {
            c.occurred_at = c.occurred_at - Duration::days(1);
        }
        assert!(matches!(item.handle(&late), Err(DomainError::Validation(_))));
    }

    #[test]
    fn adjust_missing_item_is_not_found() {
        let item = InventoryItem::empty(test_item_id());
        let err = item.handle(&adjust(&item, dec!(5))).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn write_off_removes_exact_quantity() {
        let mut item = created(Unit::Kilogram, dec!(1.25));
        let cmd = InventoryCommand::WriteOff(WriteOff {
            item_id: item.id_typed(),
            adjustment_id: AdjustmentId::new(),
            kind: AdjustmentKind::Expiration,
            reason: Some("past best-before".to_string()),
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        let events = execute(&mut item, &cmd).unwrap();
        match &events[0] {
            InventoryEvent::StockAdjusted(e) => assert_eq!(e.amount, dec!(-1250)),
            other => panic!("Expected StockAdjusted, got {other:?}"),
        }
        assert_eq!(item.current_quantity(), dec!(0));

        // Nothing left to write off.
        assert!(matches!(item.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn write_off_requires_waste_or_expiration() {
        let item = created(Unit::Gram, dec!(10));
        let cmd = InventoryCommand::WriteOff(WriteOff {
            item_id: item.id_typed(),
            adjustment_id: AdjustmentId::new(),
            kind: AdjustmentKind::Manual,
            reason: None,
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(item.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn update_converts_levels_and_cost_in_new_unit() {
        let mut item = created(Unit::Gram, dec!(500));
        let cmd = InventoryCommand::UpdateItem {
            item_id: item.id_typed(),
            changes: UpdateItem {
                unit: Some(Unit::Kilogram),
                min_level: Some(dec!(1)),
                max_level: Some(dec!(10)),
                cost: Some(dec!(9000)),
                ..UpdateItem::default()
            },
            occurred_at: Utc::now(),
        };
        execute(&mut item, &cmd).unwrap();
        assert_eq!(item.unit(), Unit::Kilogram);
        assert_eq!(item.min_level(), dec!(1000));
        assert_eq!(item.max_level(), dec!(10000));
        assert_eq!(item.cost_per_base_unit(), dec!(9));
        // Stored quantity is untouched; only its presentation changes.
        assert_eq!(item.current_quantity(), dec!(500));
        assert_eq!(item.display_quantity(), dec!(0.5));
        assert_eq!(item.status(), StockStatus::Critical);
        assert_eq!(item.reorder_quantity(), Some(dec!(9500)));
    }

    #[test]
    fn update_rejects_dimension_change() {
        let item = created(Unit::Gram, dec!(500));
        let cmd = InventoryCommand::UpdateItem {
            item_id: item.id_typed(),
            changes: UpdateItem {
                unit: Some(Unit::Liter),
                ..UpdateItem::default()
            },
            occurred_at: Utc::now(),
        };
        assert!(matches!(item.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn name_key_ignores_case_and_spacing() {
        assert_eq!(name_key("  Bread   FLOUR "), "bread flour");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: after any sequence of attempted adjustments, the quantity equals
            /// the sum of the accepted deltas and never drops below zero.
            #[test]
            fn quantity_is_sum_of_accepted_deltas(
                deltas in prop::collection::vec(-500i64..500i64, 1..40)
            ) {
                let mut item = created(Unit::Gram, dec!(0));
                let mut accepted = Decimal::ZERO;

                for raw in deltas {
                    let cmd = adjust(&item, Decimal::new(raw, 1));
                    if execute(&mut item, &cmd).is_ok() {
                        accepted += Decimal::new(raw, 1);
                    }
                    prop_assert_eq!(item.current_quantity(), accepted);
                    prop_assert!(item.current_quantity() >= Decimal::ZERO);
                }
            }
        }
    }
}
