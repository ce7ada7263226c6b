//! Data Models
//!
//! This module contains the core data structures used throughout Orcaplan:
//!
//! - `BudgetItem` - Node of the budget tree (stage, composition or search placeholder)
//! - `ItemId` - Durable or transient item identifier
//! - `BudgetHeader` / `BudgetTotals` - Budget aggregate header and derived totals
//! - `Candidate` - Catalog price record offered by the composition search

mod budget;
mod budget_item;
mod catalog;
mod item_id;


pub use budget::{BudgetHeader, BudgetId, BudgetTotals};
pub use budget_item::{
    validate_bdi_rate, validate_quantity, BudgetItem, ItemKind, ValidationError,
};
pub use catalog::Candidate;
pub use item_id::{ItemId, TRANSIENT_PREFIX};
