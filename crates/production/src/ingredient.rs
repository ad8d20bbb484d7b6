//! Point-in-time view of an inventory item as seen by planning and costing.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bakeops_core::AggregateRoot;
use bakeops_inventory::{InventoryItem, InventoryItemId, Unit};

/// Ingredient state captured when a plan or cost breakdown is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub item_id: InventoryItemId,
    pub name: String,
    /// Display unit of the item; amounts below are in its base unit.
    pub unit: Unit,
    pub current_quantity: Decimal,
    pub cost_per_base_unit: Decimal,
    /// Stream revision the snapshot was taken at.
    pub version: u64,
}

impl From<&InventoryItem> for Ingredient {
    fn from(item: &InventoryItem) -> Self {
        Self {
            item_id: item.id_typed(),
            name: item.name().to_string(),
            unit: item.unit(),
            current_quantity: item.current_quantity(),
            cost_per_base_unit: item.cost_per_base_unit(),
            version: item.version(),
        }
    }
}

/// Lookup of ingredient snapshots by item id.
pub trait IngredientSource {
    fn ingredient(&self, item_id: &InventoryItemId) -> Option<Ingredient>;
}

impl IngredientSource for HashMap<InventoryItemId, Ingredient> {
    fn ingredient(&self, item_id: &InventoryItemId) -> Option<Ingredient> {
        self.get(item_id).cloned()
    }
}

impl<S> IngredientSource for &S
where
    S: IngredientSource + ?Sized,
{
    fn ingredient(&self, item_id: &InventoryItemId) -> Option<Ingredient> {
        (**self).ingredient(item_id)
    }
}
