//! Products domain module (event-sourced).
//!
//! Finished goods, their batch size and selling price, and the recipe (bill of
//! materials) that says how much of each ingredient one batch consumes.

pub mod product;
pub mod recipe;

pub use product::{
    AGGREGATE_TYPE, ArchiveProduct, CreateProduct, Product, ProductArchived, ProductCommand,
    ProductCreated, ProductEvent, ProductId, ProductStatus, ProductUpdated, RecipeLineRemoved,
    RecipeLineSet, RemoveRecipeLine, SetRecipeLine, UpdateProduct,
};
pub use recipe::{RecipeEntry, RecipeLine};
