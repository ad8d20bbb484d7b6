//! Production planning: recipe scaling, batch divisibility and stock sufficiency.
//!
//! A plan is a pure computation over a product and ingredient snapshots. It
//! records the stream revision of the product and of every ingredient it read,
//! so committing it later can detect that the recipe or stock moved in between.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bakeops_core::{AggregateRoot, DomainError, DomainResult, UserId};
use bakeops_inventory::{InventoryItemId, Unit};
use bakeops_products::{Product, ProductId};

use crate::ingredient::IngredientSource;
use crate::journal::{IngredientDeduction, ProductionJournalId, ProductionRunId, RecordProductionRun};

/// One ingredient deduction as planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDeduction {
    pub item_id: InventoryItemId,
    pub item_name: String,
    pub unit: Unit,
    /// Positive base-unit amount to remove from stock.
    pub amount: Decimal,
    pub cost_per_base_unit: Decimal,
    pub line_cost: Decimal,
    /// Stock on hand when planned.
    pub available: Decimal,
    /// Item stream revision when planned.
    pub expected_version: u64,
}

impl PlannedDeduction {
    pub fn remaining(&self) -> Decimal {
        self.available - self.amount
    }
}

/// Result of [`plan_production`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionPlan {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub batch_size: u32,
    pub batches: u32,
    /// Product stream revision when planned.
    pub product_version: u64,
    pub deductions: Vec<PlannedDeduction>,
    pub total_cost: Decimal,
}

impl ProductionPlan {
    /// Ingredient cost per finished unit.
    pub fn cost_per_unit(&self) -> Decimal {
        self.total_cost / Decimal::from(self.quantity)
    }

    /// Build the journal command recording this plan as run `run_id`.
    pub fn to_run_command(
        &self,
        journal_id: ProductionJournalId,
        run_id: ProductionRunId,
        date: NaiveDate,
        notes: Option<String>,
        recorded_by: UserId,
        occurred_at: DateTime<Utc>,
    ) -> RecordProductionRun {
        RecordProductionRun {
            journal_id,
            run_id,
            product_id: self.product_id,
            product_name: self.product_name.clone(),
            quantity_produced: self.quantity,
            batches: self.batches,
            date,
            ingredients_deducted: self
                .deductions
                .iter()
                .map(|d| IngredientDeduction {
                    item_id: d.item_id,
                    item_name: d.item_name.clone(),
                    amount: d.amount,
                    unit: d.unit.base_unit(),
                    cost_per_base_unit: d.cost_per_base_unit,
                    line_cost: d.line_cost,
                })
                .collect(),
            notes,
            recorded_by,
            occurred_at,
        }
    }
}

/// Number of batches `quantity` finished units take.
///
/// Rejects zero and anything that is not a whole number of batches.
pub fn batches_for(quantity: u32, batch_size: u32) -> DomainResult<u32> {
    if batch_size == 0 {
        return Err(DomainError::validation("batch size must be greater than zero"));
    }
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    if quantity % batch_size != 0 {
        return Err(DomainError::validation(format!(
            "quantity must be a multiple of batch size ({batch_size})"
        )));
    }
    Ok(quantity / batch_size)
}

pub(crate) fn out_of_range() -> DomainError {
    DomainError::validation("amount out of range")
}

pub(crate) fn scaled(amount: Decimal, factor: Decimal) -> DomainResult<Decimal> {
    amount.checked_mul(factor).ok_or_else(out_of_range)
}

pub(crate) fn checked_total(values: impl IntoIterator<Item = Decimal>) -> DomainResult<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(out_of_range)
}

/// Plan a production run of `quantity` finished units.
///
/// Each recipe line is scaled by `quantity / batch_size`; the plan is rejected if
/// any ingredient lacks stock for its share.
pub fn plan_production(
    product: &Product,
    quantity: u32,
    ingredients: &impl IngredientSource,
) -> DomainResult<ProductionPlan> {
    if !product.is_created() {
        return Err(DomainError::not_found(format!("product {}", product.id_typed())));
    }
    if !product.can_be_produced() {
        return Err(DomainError::validation(format!(
            "{} is archived and cannot be produced",
            product.name()
        )));
    }

    let batches = batches_for(quantity, product.batch_size())?;

    let recipe = product.recipe();
    if recipe.is_empty() {
        return Err(DomainError::validation(format!(
            "{} has no recipe",
            product.name()
        )));
    }

    let scale = Decimal::from(batches);
    let mut deductions = Vec::with_capacity(recipe.len());
    let mut shortages = Vec::new();

    for line in &recipe {
        let ingredient = ingredients.ingredient(&line.item_id).ok_or_else(|| {
            DomainError::not_found(format!("ingredient {} of {}", line.item_id, product.name()))
        })?;

        let amount = scaled(line.amount_required, scale)?;
        if amount > ingredient.current_quantity {
            shortages.push(format!(
                "{} (needs {} {}, has {})",
                ingredient.name,
                amount,
                ingredient.unit.base_unit(),
                ingredient.current_quantity
            ));
        }

        deductions.push(PlannedDeduction {
            item_id: line.item_id,
            item_name: ingredient.name,
            unit: ingredient.unit,
            amount,
            cost_per_base_unit: ingredient.cost_per_base_unit,
            line_cost: scaled(amount, ingredient.cost_per_base_unit)?,
            available: ingredient.current_quantity,
            expected_version: ingredient.version,
        });
    }

    if !shortages.is_empty() {
        return Err(DomainError::validation(format!(
            "insufficient stock: {}",
            shortages.join(", ")
        )));
    }

    let total_cost = checked_total(deductions.iter().map(|d| d.line_cost))?;

    Ok(ProductionPlan {
        product_id: product.id_typed(),
        product_name: product.name().to_string(),
        quantity,
        batch_size: product.batch_size(),
        batches,
        product_version: product.version(),
        deductions,
        total_cost,
    })
}
