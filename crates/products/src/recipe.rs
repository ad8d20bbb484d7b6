//! Recipe lines (bill of materials) and recipe-entry normalization.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bakeops_core::{DomainError, ValueObject};
use bakeops_inventory::{InventoryItemId, Unit, checked_to_base_unit};

/// Amount of one ingredient needed for one batch, in the ingredient's base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub item_id: InventoryItemId,
    pub amount_required: Decimal,
}

impl ValueObject for RecipeLine {}

/// A recipe amount as typed into the recipe editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeEntry {
    pub item_id: InventoryItemId,
    pub amount: Decimal,
    pub unit: Unit,
}

impl RecipeEntry {
    /// Normalize to a base-unit recipe line for an ingredient stocked in `ingredient_unit`.
    ///
    /// 0.2 kg of an ingredient stocked in kg and 200 g of it both store 200.
    pub fn normalize(&self, ingredient_unit: Unit) -> Result<RecipeLine, DomainError> {
        if self.unit.base_unit() != ingredient_unit.base_unit() {
            return Err(DomainError::validation(format!(
                "recipe amount in {} does not match ingredient unit {}",
                self.unit, ingredient_unit
            )));
        }
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::validation(
                "recipe amount must be greater than zero",
            ));
        }
        Ok(RecipeLine {
            item_id: self.item_id,
            amount_required: checked_to_base_unit(self.amount, self.unit)?,
        })
    }
}
