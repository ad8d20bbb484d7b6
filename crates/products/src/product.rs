use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bakeops_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use bakeops_events::Event;
use bakeops_inventory::InventoryItemId;

use crate::recipe::RecipeLine;

/// Aggregate type tag used for product streams.
pub const AGGREGATE_TYPE: &str = "products.product";

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

/// Aggregate root: Product (a finished good baked from a recipe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    /// Finished units yielded by one batch of the recipe.
    batch_size: u32,
    /// Selling price per finished unit.
    selling_price: Decimal,
    status: ProductStatus,
    recipe: BTreeMap<InventoryItemId, Decimal>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            batch_size: 1,
            selling_price: Decimal::ZERO,
            status: ProductStatus::Active,
            recipe: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn selling_price(&self) -> Decimal {
        self.selling_price
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    /// Archived products stay readable (for history) but are no longer baked.
    pub fn can_be_produced(&self) -> bool {
        self.created && self.status == ProductStatus::Active
    }

    /// Recipe lines ordered by ingredient id.
    pub fn recipe(&self) -> Vec<RecipeLine> {
        self.recipe
            .iter()
            .map(|(item_id, amount)| RecipeLine {
                item_id: *item_id,
                amount_required: *amount,
            })
            .collect()
    }

    pub fn recipe_amount(&self, item_id: &InventoryItemId) -> Option<Decimal> {
        self.recipe.get(item_id).copied()
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub batch_size: u32,
    pub selling_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub batch_size: Option<u32>,
    pub selling_price: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetRecipeLine (insert or replace the amount for one ingredient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRecipeLine {
    pub product_id: ProductId,
    pub line: RecipeLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveRecipeLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRecipeLine {
    pub product_id: ProductId,
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    SetRecipeLine(SetRecipeLine),
    RemoveRecipeLine(RemoveRecipeLine),
    ArchiveProduct(ArchiveProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub batch_size: u32,
    pub selling_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated (post-update snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub batch_size: u32,
    pub selling_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecipeLineSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLineSet {
    pub product_id: ProductId,
    pub line: RecipeLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecipeLineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLineRemoved {
    pub product_id: ProductId,
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    RecipeLineSet(RecipeLineSet),
    RecipeLineRemoved(RecipeLineRemoved),
    ProductArchived(ProductArchived),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductUpdated(_) => "products.product.updated",
            ProductEvent::RecipeLineSet(_) => "products.product.recipe_line_set",
            ProductEvent::RecipeLineRemoved(_) => "products.product.recipe_line_removed",
            ProductEvent::ProductArchived(_) => "products.product.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::RecipeLineSet(e) => e.occurred_at,
            ProductEvent::RecipeLineRemoved(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.batch_size = e.batch_size;
                self.selling_price = e.selling_price;
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.name = e.name.clone();
                self.batch_size = e.batch_size;
                self.selling_price = e.selling_price;
            }
            ProductEvent::RecipeLineSet(e) => {
                self.recipe.insert(e.line.item_id, e.line.amount_required);
            }
            ProductEvent::RecipeLineRemoved(e) => {
                self.recipe.remove(&e.item_id);
            }
            ProductEvent::ProductArchived(_) => {
                self.status = ProductStatus::Archived;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::SetRecipeLine(cmd) => self.handle_set_line(cmd),
            ProductCommand::RemoveRecipeLine(cmd) => self.handle_remove_line(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
        }
    }
}

fn validate_batch_size(batch_size: u32) -> Result<(), DomainError> {
    if batch_size == 0 {
        return Err(DomainError::validation("batch size must be greater than zero"));
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), DomainError> {
    if price < Decimal::ZERO {
        return Err(DomainError::validation("selling price cannot be negative"));
    }
    Ok(())
}

impl Product {
    fn ensure_exists(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("product {product_id}")));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_editable(&self, product_id: ProductId) -> Result<(), DomainError> {
        self.ensure_exists(product_id)?;
        if self.status == ProductStatus::Archived {
            return Err(DomainError::validation("archived products cannot be edited"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        validate_batch_size(cmd.batch_size)?;
        validate_price(cmd.selling_price)?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            batch_size: cmd.batch_size,
            selling_price: cmd.selling_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.product_id)?;

        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let batch_size = cmd.batch_size.unwrap_or(self.batch_size);
        validate_batch_size(batch_size)?;
        let selling_price = cmd.selling_price.unwrap_or(self.selling_price);
        validate_price(selling_price)?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            name,
            batch_size,
            selling_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_line(&self, cmd: &SetRecipeLine) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.product_id)?;

        if cmd.line.amount_required <= Decimal::ZERO {
            return Err(DomainError::validation(
                "recipe amount must be greater than zero",
            ));
        }

        Ok(vec![ProductEvent::RecipeLineSet(RecipeLineSet {
            product_id: cmd.product_id,
            line: cmd.line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveRecipeLine) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.product_id)?;

        if !self.recipe.contains_key(&cmd.item_id) {
            return Err(DomainError::not_found(format!(
                "recipe line for ingredient {}",
                cmd.item_id
            )));
        }

        Ok(vec![ProductEvent::RecipeLineRemoved(RecipeLineRemoved {
            product_id: cmd.product_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;

        if self.status == ProductStatus::Archived {
            return Err(DomainError::conflict("product is already archived"));
        }

        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakeops_events::execute;
    use rust_decimal_macros::dec;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_item_id() -> InventoryItemId {
        InventoryItemId::new(AggregateId::new())
    }

    fn create_cmd(product_id: ProductId, batch_size: u32) -> ProductCommand {
        ProductCommand::CreateProduct(CreateProduct {
            product_id,
            name: "Sourdough Loaf".to_string(),
            batch_size,
            selling_price: dec!(6.50),
            occurred_at: Utc::now(),
        })
    }

    fn created(batch_size: u32) -> Product {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);
        execute(&mut product, &create_cmd(product_id, batch_size)).unwrap();
        product
    }

    fn set_line(product: &Product, item_id: InventoryItemId, amount: Decimal) -> ProductCommand {
        ProductCommand::SetRecipeLine(SetRecipeLine {
            product_id: product.id_typed(),
            line: RecipeLine {
                item_id,
                amount_required: amount,
            },
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let events = product.handle(&create_cmd(product_id, 10)).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.batch_size, 10);
                assert_eq!(e.selling_price, dec!(6.50));
            }
            other => panic!("Expected ProductCreated, got {other:?}"),
        }
    }

    #[test]
    fn create_rejects_zero_batch_size_and_negative_price() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        assert!(matches!(
            product.handle(&create_cmd(product_id, 0)),
            Err(DomainError::Validation(_))
        ));

        let cmd = ProductCommand::CreateProduct(CreateProduct {
            product_id,
            name: "Baguette".to_string(),
            batch_size: 4,
            selling_price: dec!(-1),
            occurred_at: Utc::now(),
        });
        assert!(matches!(product.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn recipe_lines_upsert_and_remove() {
        let mut product = created(10);
        let flour = test_item_id();
        let salt = test_item_id();

        let cmd = set_line(&product, flour, dec!(200));
        execute(&mut product, &cmd).unwrap();
        let cmd = set_line(&product, salt, dec!(4));
        execute(&mut product, &cmd).unwrap();
        let cmd = set_line(&product, flour, dec!(250));
        execute(&mut product, &cmd).unwrap();
        assert_eq!(product.recipe().len(), 2);
        assert_eq!(product.recipe_amount(&flour), Some(dec!(250)));

        let remove = ProductCommand::RemoveRecipeLine(RemoveRecipeLine {
            product_id: product.id_typed(),
            item_id: salt,
            occurred_at: Utc::now(),
        });
        execute(&mut product, &remove).unwrap();
        assert_eq!(product.recipe_amount(&salt), None);

        // Removing again: the line no longer exists.
        assert!(matches!(product.handle(&remove), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn non_positive_recipe_amount_is_rejected() {
        let product = created(10);
        let err = product
            .handle(&set_line(&product, test_item_id(), dec!(0)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let mut product = created(10);
        let cmd = ProductCommand::UpdateProduct(UpdateProduct {
            product_id: product.id_typed(),
            name: None,
            batch_size: Some(12),
            selling_price: None,
            occurred_at: Utc::now(),
        });
        execute(&mut product, &cmd).unwrap();
        assert_eq!(product.batch_size(), 12);
        assert_eq!(product.name(), "Sourdough Loaf");
        assert_eq!(product.selling_price(), dec!(6.50));
    }

    #[test]
    fn archived_products_cannot_be_produced_or_edited() {
        let mut product = created(10);
        let archive = ProductCommand::ArchiveProduct(ArchiveProduct {
            product_id: product.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut product, &archive).unwrap();
        assert_eq!(product.status(), ProductStatus::Archived);
        assert!(!product.can_be_produced());

        let err = product
            .handle(&set_line(&product, test_item_id(), dec!(1)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(matches!(product.handle(&archive), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn commands_on_missing_product_are_not_found() {
        let product = Product::empty(test_product_id());
        let err = product
            .handle(&set_line(&product, test_item_id(), dec!(1)))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let product = created(10);
        let before = product.clone();
        let _ = product.handle(&set_line(&product, test_item_id(), dec!(3)));
        assert_eq!(product, before);
    }

    #[test]
    fn version_increments_on_apply() {
        let mut product = created(10);
        assert_eq!(product.version(), 1);
        let cmd = set_line(&product, test_item_id(), dec!(3));
        execute(&mut product, &cmd).unwrap();
        assert_eq!(product.version(), 2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: the recipe holds exactly the last amount set per ingredient.
            #[test]
            fn recipe_keeps_last_amount_per_ingredient(
                writes in prop::collection::vec((0usize..4, 1i64..100_000i64), 1..30)
            ) {
                let mut product = created(10);
                let ingredients: Vec<InventoryItemId> = (0..4).map(|_| test_item_id()).collect();
                let mut expected = BTreeMap::new();

                for (slot, raw) in writes {
                    let amount = Decimal::new(raw, 2);
                    let cmd = set_line(&product, ingredients[slot], amount);
                    execute(&mut product, &cmd).unwrap();
                    expected.insert(ingredients[slot], amount);
                }

                prop_assert_eq!(product.recipe().len(), expected.len());
                for line in product.recipe() {
                    prop_assert_eq!(Some(&line.amount_required), expected.get(&line.item_id));
                }
            }
        }
    }
}
