//! Product catalog service: products, batch sizes, prices and recipes.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;

use bakeops_core::{AggregateId, DomainError};
use bakeops_inventory::InventoryItemId;
use bakeops_products::{
    AGGREGATE_TYPE, ArchiveProduct, CreateProduct, Product, ProductCommand, ProductId,
    RecipeEntry, RemoveRecipeLine, SetRecipeLine, UpdateProduct,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::ledger::InventoryLedger;

fn make_product(id: AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

/// Optional product edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub batch_size: Option<u32>,
    pub selling_price: Option<Decimal>,
}

pub struct ProductCatalog<S> {
    dispatcher: CommandDispatcher<S>,
    ledger: Arc<InventoryLedger<S>>,
    products: RwLock<BTreeSet<ProductId>>,
}

impl<S> ProductCatalog<S>
where
    S: EventStore,
{
    /// `store` must be the store backing `ledger`.
    pub fn new(store: S, ledger: Arc<InventoryLedger<S>>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
            ledger,
            products: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger<S>> {
        &self.ledger
    }

    pub fn create_product(
        &self,
        name: impl Into<String>,
        batch_size: u32,
        selling_price: Decimal,
    ) -> Result<Product, DispatchError> {
        let product_id = ProductId::new(AggregateId::new());
        self.run(
            product_id,
            ProductCommand::CreateProduct(CreateProduct {
                product_id,
                name: name.into(),
                batch_size,
                selling_price,
                occurred_at: Utc::now(),
            }),
        )?;

        self.products
            .write()
            .map_err(|_| DispatchError::LockPoisoned("product index".to_string()))?
            .insert(product_id);

        let product = self.product(product_id)?;
        tracing::info!(product_id = %product_id, name = product.name(), "product created");
        Ok(product)
    }

    pub fn update_product(&self, product_id: ProductId, changes: ProductChanges) -> Result<Product, DispatchError> {
        self.run(
            product_id,
            ProductCommand::UpdateProduct(UpdateProduct {
                product_id,
                name: changes.name,
                batch_size: changes.batch_size,
                selling_price: changes.selling_price,
                occurred_at: Utc::now(),
            }),
        )?;
        self.product(product_id)
    }

    /// Set (insert or replace) one recipe line from an amount in any unit of the
    /// ingredient's dimension; stored in the ingredient's base unit.
    pub fn set_recipe_line(&self, product_id: ProductId, entry: RecipeEntry) -> Result<Product, DispatchError> {
        let ingredient = self.ledger.item(entry.item_id)?;
        let line = entry.normalize(ingredient.unit())?;

        self.run(
            product_id,
            ProductCommand::SetRecipeLine(SetRecipeLine {
                product_id,
                line,
                occurred_at: Utc::now(),
            }),
        )?;

        tracing::info!(
            product_id = %product_id,
            item_id = %line.item_id,
            amount = %line.amount_required,
            unit = %ingredient.base_unit(),
            "recipe line set"
        );
        self.product(product_id)
    }

    pub fn remove_recipe_line(&self, product_id: ProductId, item_id: InventoryItemId) -> Result<Product, DispatchError> {
        self.run(
            product_id,
            ProductCommand::RemoveRecipeLine(RemoveRecipeLine {
                product_id,
                item_id,
                occurred_at: Utc::now(),
            }),
        )?;
        self.product(product_id)
    }

    pub fn archive_product(&self, product_id: ProductId) -> Result<Product, DispatchError> {
        self.run(
            product_id,
            ProductCommand::ArchiveProduct(ArchiveProduct {
                product_id,
                occurred_at: Utc::now(),
            }),
        )?;
        tracing::info!(product_id = %product_id, "product archived");
        self.product(product_id)
    }

    /// Product rehydrated from its stream.
    pub fn product(&self, product_id: ProductId) -> Result<Product, DispatchError> {
        let product = self.dispatcher.load(product_id.0, make_product)?;
        if !product.is_created() {
            return Err(DomainError::not_found(format!("product {product_id}")).into());
        }
        Ok(product)
    }

    /// Every product created through this catalog, in id order.
    pub fn products(&self) -> Result<Vec<Product>, DispatchError> {
        let ids: Vec<ProductId> = self
            .products
            .read()
            .map_err(|_| DispatchError::LockPoisoned("product index".to_string()))?
            .iter()
            .copied()
            .collect();
        ids.into_iter().map(|id| self.product(id)).collect()
    }

    fn run(&self, product_id: ProductId, command: ProductCommand) -> Result<(), DispatchError> {
        // Same lock a production commit holds while it checks the product revision.
        let locks = self.ledger.locks().one(product_id.0)?;
        let _guards = locks.acquire()?;

        self.dispatcher
            .dispatch(product_id.0, AGGREGATE_TYPE, command, make_product)
            .map(|_| ())
            .inspect_err(|err| {
                tracing::warn!(product_id = %product_id, error = %err, "product command rejected");
            })
    }
}
