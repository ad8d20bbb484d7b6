//! Production service: plan a run, then commit its deductions and the run record
//! as one atomic append across every ingredient stream and the journal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use bakeops_core::{AggregateId, AggregateRoot, DomainError, ErrorKind, UserId};
use bakeops_inventory::{
    AdjustStock, AdjustmentId, AdjustmentKind, InventoryCommand, InventoryItem, InventoryItemId,
};
use bakeops_production::{
    Ingredient, JournalCommand, JournalEvent, ProductCost, ProductionJournal, ProductionJournalId,
    ProductionPlan, ProductionRun, ProductionRunId, plan_production, product_cost,
};
use bakeops_products::{Product, ProductId};

use crate::catalog::ProductCatalog;
use crate::command_dispatcher::{DispatchError, prepare};
use crate::event_store::{EventStore, StoredEvent};
use crate::ledger::{InventoryLedger, ledger_timestamp, make_item};

fn make_journal(id: AggregateId) -> ProductionJournal {
    ProductionJournal::empty(ProductionJournalId::new(id))
}

pub struct ProductionService<S> {
    ledger: Arc<InventoryLedger<S>>,
    catalog: Arc<ProductCatalog<S>>,
    journal_id: ProductionJournalId,
}

impl<S> ProductionService<S>
where
    S: EventStore,
{
    pub fn new(
        ledger: Arc<InventoryLedger<S>>,
        catalog: Arc<ProductCatalog<S>>,
        journal_id: ProductionJournalId,
    ) -> Self {
        Self {
            ledger,
            catalog,
            journal_id,
        }
    }

    pub fn journal_id(&self) -> ProductionJournalId {
        self.journal_id
    }

    /// Plan `quantity` finished units of a product against current stock.
    pub fn plan(&self, product_id: ProductId, quantity: u32) -> Result<ProductionPlan, DispatchError> {
        let product = self.catalog.product(product_id)?;
        let ingredients = self.ingredients(&product)?;

        let plan = plan_production(&product, quantity, &ingredients).inspect_err(|err| {
            if err.kind() == ErrorKind::Validation {
                tracing::warn!(product_id = %product_id, quantity, error = %err, "production plan rejected");
            }
        })?;

        tracing::debug!(
            product_id = %product_id,
            quantity,
            batches = plan.batches,
            total_cost = %plan.total_cost,
            "production planned"
        );
        Ok(plan)
    }

    /// Commit a plan: one `Production` adjustment per ingredient plus the run record,
    /// all or nothing.
    ///
    /// Fails with a conflict when the product or any ingredient's stream moved
    /// since planning.
    pub fn commit(
        &self,
        plan: &ProductionPlan,
        date: NaiveDate,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<ProductionRun, DispatchError> {
        if plan.deductions.is_empty() {
            return Err(DomainError::validation("a production run must consume at least one ingredient").into());
        }

        let stream_ids = plan
            .deductions
            .iter()
            .map(|d| d.item_id.0)
            .chain([plan.product_id.0, self.journal_id.0]);
        let locks = self.ledger.locks().set(stream_ids)?;
        let _guards = locks.acquire()?;

        let product = self.catalog.product(plan.product_id)?;
        if !product.can_be_produced() {
            return Err(DomainError::validation(format!(
                "{} is archived and cannot be produced",
                product.name()
            ))
            .into());
        }
        if product.version() != plan.product_version {
            tracing::warn!(
                product_id = %plan.product_id,
                expected = plan.product_version,
                found = product.version(),
                "product changed since planning"
            );
            return Err(DomainError::conflict(format!(
                "{} changed since the run was planned; re-plan and try again",
                product.name()
            ))
            .into());
        }

        let dispatcher = self.ledger.dispatcher();
        let journal = dispatcher.load(self.journal_id.0, make_journal)?;
        let number = journal.next_run_number();
        let reason = self.ledger.config().production_reason(number);

        let mut items = Vec::with_capacity(plan.deductions.len());
        for deduction in &plan.deductions {
            let item: InventoryItem = dispatcher.load(deduction.item_id.0, make_item)?;
            if item.version() != deduction.expected_version {
                tracing::warn!(
                    item_id = %deduction.item_id,
                    expected = deduction.expected_version,
                    found = item.version(),
                    "ingredient changed since planning"
                );
                return Err(DomainError::conflict(format!(
                    "{} changed since the run was planned; re-plan and try again",
                    deduction.item_name
                ))
                .into());
            }
            items.push(item);
        }

        let occurred_at = ledger_timestamp(items.iter().filter_map(InventoryItem::last_adjusted_at).max());
        let mut appends = Vec::with_capacity(items.len() + 1);
        for (deduction, item) in plan.deductions.iter().zip(&items) {
            let command = InventoryCommand::AdjustStock(AdjustStock {
                item_id: deduction.item_id,
                adjustment_id: AdjustmentId::new(),
                amount: -deduction.amount,
                kind: AdjustmentKind::Production,
                reason: Some(reason.clone()),
                created_by: actor,
                occurred_at,
            });
            appends.push(prepare(
                item,
                deduction.item_id.0,
                bakeops_inventory::AGGREGATE_TYPE,
                &command,
            )?);
        }

        let record = plan.to_run_command(
            self.journal_id,
            ProductionRunId::new(),
            date,
            notes,
            actor,
            occurred_at,
        );
        appends.push(prepare(
            &journal,
            self.journal_id.0,
            bakeops_production::AGGREGATE_TYPE,
            &JournalCommand::RecordProductionRun(record),
        )?);

        let committed = dispatcher.store().append_atomic(appends)?;
        self.ledger.project(&committed)?;

        let run = recorded_run(&committed)?;
        tracing::info!(
            run_number = run.number,
            product_id = %run.product_id,
            quantity = run.quantity_produced,
            batches = run.batches,
            cost = %run.cost,
            "production run committed"
        );
        Ok(run)
    }

    /// Plan and commit in one call.
    pub fn produce(
        &self,
        product_id: ProductId,
        quantity: u32,
        date: NaiveDate,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<ProductionRun, DispatchError> {
        let plan = self.plan(product_id, quantity)?;
        self.commit(&plan, date, notes, actor)
    }

    /// Recorded runs, oldest first.
    pub fn runs(&self) -> Result<Vec<ProductionRun>, DispatchError> {
        let journal = self.ledger.dispatcher().load(self.journal_id.0, make_journal)?;
        Ok(journal.runs().to_vec())
    }

    pub fn run(&self, run_id: ProductionRunId) -> Result<ProductionRun, DispatchError> {
        self.runs()?
            .into_iter()
            .find(|r| r.id == run_id)
            .ok_or_else(|| DomainError::not_found(format!("production run {}", run_id.0)).into())
    }

    /// Current batch cost, unit cost and margin of a product.
    pub fn product_cost(&self, product_id: ProductId) -> Result<ProductCost, DispatchError> {
        let product = self.catalog.product(product_id)?;
        let ingredients = self.ingredients(&product)?;
        Ok(product_cost(&product, &ingredients)?)
    }

    /// Snapshots of the product's ingredients; unknown items are left out so the
    /// planner reports them as not found.
    fn ingredients(&self, product: &Product) -> Result<HashMap<InventoryItemId, Ingredient>, DispatchError> {
        let mut out = HashMap::new();
        for line in product.recipe() {
            match self.ledger.item(line.item_id) {
                Ok(item) => {
                    out.insert(line.item_id, Ingredient::from(&item));
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}

fn recorded_run(committed: &[StoredEvent]) -> Result<ProductionRun, DispatchError> {
    committed
        .iter()
        .filter(|e| e.aggregate_type == bakeops_production::AGGREGATE_TYPE)
        .find_map(|e| serde_json::from_value::<JournalEvent>(e.payload.clone()).ok())
        .map(|event| match event {
            JournalEvent::ProductionRunRecorded(e) => e.run,
        })
        .ok_or_else(|| DispatchError::Deserialize("committed batch holds no production run".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use bakeops_inventory::{AdjustmentFilter, ItemType, Unit};
    use bakeops_products::RecipeEntry;

    use crate::catalog::ProductChanges;
    use crate::config::Config;
    use crate::event_store::InMemoryEventStore;
    use crate::ledger::NewItem;

    type Store = Arc<InMemoryEventStore>;

    fn service() -> ProductionService<Store> {
        let store = Arc::new(InMemoryEventStore::new());
        let ledger = Arc::new(InventoryLedger::new(store.clone(), Config::default()));
        let catalog = Arc::new(ProductCatalog::new(store, ledger.clone()));
        ProductionService::new(ledger, catalog, ProductionJournalId::new(AggregateId::new()))
    }

    fn stock(service: &ProductionService<Store>, name: &str, grams: Decimal, cost_per_kg: Decimal) -> InventoryItemId {
        service
            .ledger
            .create_item(
                NewItem {
                    name: name.to_string(),
                    item_type: ItemType::RawMaterial,
                    unit: Unit::Kilogram,
                    quantity: grams / dec!(1000),
                    min_level: dec!(1),
                    max_level: dec!(50),
                    cost: cost_per_kg,
                },
                UserId::new(),
            )
            .unwrap()
            .id_typed()
    }

    fn bread(service: &ProductionService<Store>, lines: &[(InventoryItemId, Decimal)]) -> ProductId {
        let product = service.catalog.create_product("Bread", 10, dec!(1.5)).unwrap();
        for (item_id, grams) in lines {
            service
                .catalog
                .set_recipe_line(
                    product.id_typed(),
                    RecipeEntry {
                        item_id: *item_id,
                        amount: *grams,
                        unit: Unit::Gram,
                    },
                )
                .unwrap();
        }
        product.id_typed()
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn commit_deducts_and_records_run() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let product_id = bread(&service, &[(flour, dec!(200))]);

        let run = service.produce(product_id, 30, today(), None, UserId::new()).unwrap();
        assert_eq!(run.number, 1);
        assert_eq!(run.batches, 3);
        assert_eq!(run.ingredients_deducted.len(), 1);
        assert_eq!(run.ingredients_deducted[0].amount, dec!(600));
        assert_eq!(run.cost, dec!(7.2));

        assert_eq!(service.ledger.current_quantity(flour).unwrap(), dec!(4400));
        let production = service
            .ledger
            .list_adjustments(flour, &AdjustmentFilter::Text("production run #1".to_string()))
            .unwrap();
        assert_eq!(production.len(), 1);
        assert_eq!(production[0].amount, dec!(-600));
        assert_eq!(production[0].kind, AdjustmentKind::Production);
    }

    #[test]
    fn runs_are_numbered_in_order() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let product_id = bread(&service, &[(flour, dec!(100))]);

        for _ in 0..3 {
            service.produce(product_id, 10, today(), None, UserId::new()).unwrap();
        }
        let runs = service.runs().unwrap();
        assert_eq!(runs.iter().map(|r| r.number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(service.run(runs[1].id).unwrap().number, 2);
    }

    #[test]
    fn shortage_on_any_ingredient_applies_nothing() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let yeast = stock(&service, "Yeast", dec!(10), dec!(40));
        let product_id = bread(&service, &[(flour, dec!(200)), (yeast, dec!(5))]);

        let err = service.produce(product_id, 30, today(), None, UserId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(service.ledger.current_quantity(flour).unwrap(), dec!(5000));
        assert_eq!(service.ledger.current_quantity(yeast).unwrap(), dec!(10));
        assert!(service.runs().unwrap().is_empty());
    }

    #[test]
    fn stock_moved_since_planning_is_a_conflict() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let product_id = bread(&service, &[(flour, dec!(200))]);

        let plan = service.plan(product_id, 10).unwrap();
        service
            .ledger
            .record_adjustment(flour, dec!(-100), AdjustmentKind::Manual, None, UserId::new())
            .unwrap();

        let err = service.commit(&plan, today(), None, UserId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
        assert_eq!(service.ledger.current_quantity(flour).unwrap(), dec!(4900));

        let replanned = service.plan(product_id, 10).unwrap();
        assert!(service.commit(&replanned, today(), None, UserId::new()).is_ok());
    }

    #[test]
    fn batch_size_changed_since_planning_is_a_conflict() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let product_id = bread(&service, &[(flour, dec!(200))]);

        let plan = service.plan(product_id, 30).unwrap();
        service
            .catalog
            .update_product(
                product_id,
                ProductChanges {
                    batch_size: Some(7),
                    ..ProductChanges::default()
                },
            )
            .unwrap();

        let err = service.commit(&plan, today(), None, UserId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(service.ledger.current_quantity(flour).unwrap(), dec!(5000));
        assert!(service.runs().unwrap().is_empty());

        let err = service.plan(product_id, 30).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn recipe_changed_since_planning_is_a_conflict() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let product_id = bread(&service, &[(flour, dec!(200))]);

        let plan = service.plan(product_id, 30).unwrap();
        service
            .catalog
            .set_recipe_line(
                product_id,
                RecipeEntry {
                    item_id: flour,
                    amount: dec!(300),
                    unit: Unit::Gram,
                },
            )
            .unwrap();

        let err = service.commit(&plan, today(), None, UserId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(service.ledger.current_quantity(flour).unwrap(), dec!(5000));

        let run = service.produce(product_id, 30, today(), None, UserId::new()).unwrap();
        assert_eq!(run.ingredients_deducted[0].amount, dec!(900));
        assert_eq!(service.ledger.current_quantity(flour).unwrap(), dec!(4100));
    }

    #[test]
    fn archived_between_plan_and_commit_is_rejected() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let product_id = bread(&service, &[(flour, dec!(200))]);

        let plan = service.plan(product_id, 10).unwrap();
        service.catalog.archive_product(product_id).unwrap();
        let err = service.commit(&plan, today(), None, UserId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn non_multiple_quantity_is_rejected() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let product_id = bread(&service, &[(flour, dec!(200))]);

        let err = service.plan(product_id, 15).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.kind().severity(), bakeops_core::Severity::Warning);
    }

    #[test]
    fn historical_cost_survives_price_change() {
        let service = service();
        let flour = stock(&service, "Flour", dec!(5000), dec!(12));
        let product_id = bread(&service, &[(flour, dec!(200))]);

        let run = service.produce(product_id, 10, today(), None, UserId::new()).unwrap();
        assert_eq!(run.cost, dec!(2.4));

        service
            .ledger
            .update_item(
                flour,
                bakeops_inventory::UpdateItem {
                    cost: Some(dec!(24)),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(service.run(run.id).unwrap().cost, dec!(2.4));
        let cost = service.product_cost(product_id).unwrap();
        assert_eq!(cost.total_cost, dec!(4.8));
        assert_eq!(cost.per_unit_cost, dec!(0.48));
        assert_eq!(cost.margin, dec!(1.02));
    }
}
