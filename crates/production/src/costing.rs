//! Cost rollup: one batch's ingredient cost, per-unit cost and margin.
//!
//! Always computed from current recipe and ingredient costs; recorded runs keep
//! the cost they were produced at.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bakeops_core::{DomainError, DomainResult};
use bakeops_inventory::InventoryItemId;
use bakeops_products::{Product, ProductId};

use crate::ingredient::IngredientSource;
use crate::plan::{checked_total, out_of_range, scaled};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLine {
    pub item_id: InventoryItemId,
    pub item_name: String,
    pub amount_required: Decimal,
    pub cost_per_base_unit: Decimal,
    pub line_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCost {
    pub product_id: ProductId,
    pub batch_size: u32,
    pub lines: Vec<CostLine>,
    /// Ingredient cost of one batch.
    pub total_cost: Decimal,
    pub per_unit_cost: Decimal,
    pub selling_price: Decimal,
    /// Selling price minus per-unit cost.
    pub margin: Decimal,
    /// `None` when the selling price is zero.
    pub margin_percent: Option<Decimal>,
}

impl ProductCost {
    /// Margin percentage for reports: two decimals, or "N/A" without a price.
    pub fn margin_percent_label(&self) -> String {
        match self.margin_percent {
            Some(pct) => format!("{:.2}%", pct.round_dp(2)),
            None => "N/A".to_string(),
        }
    }
}

/// Roll a product's recipe up into batch cost, per-unit cost and margin.
pub fn product_cost(product: &Product, ingredients: &impl IngredientSource) -> DomainResult<ProductCost> {
    if !product.is_created() {
        return Err(DomainError::not_found(format!("product {}", product.id_typed())));
    }

    let lines = product
        .recipe()
        .into_iter()
        .map(|line| {
            let ingredient = ingredients.ingredient(&line.item_id).ok_or_else(|| {
                DomainError::not_found(format!("ingredient {} of {}", line.item_id, product.name()))
            })?;
            Ok(CostLine {
                item_id: line.item_id,
                item_name: ingredient.name,
                amount_required: line.amount_required,
                cost_per_base_unit: ingredient.cost_per_base_unit,
                line_cost: scaled(line.amount_required, ingredient.cost_per_base_unit)?,
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;

    let total_cost = checked_total(lines.iter().map(|l| l.line_cost))?;
    let per_unit_cost = total_cost / Decimal::from(product.batch_size());
    let selling_price = product.selling_price();
    let margin = selling_price.checked_sub(per_unit_cost).ok_or_else(out_of_range)?;
    let margin_percent = if selling_price.is_zero() {
        None
    } else {
        Some(scaled(margin / selling_price, Decimal::ONE_HUNDRED)?)
    };

    Ok(ProductCost {
        product_id: product.id_typed(),
        batch_size: product.batch_size(),
        lines,
        total_cost,
        per_unit_cost,
        selling_price,
        margin,
        margin_percent,
    })
}
