//! Storage Layer
//!
//! This module defines the two external collaborators the engine depends on:
//!
//! - [`BudgetStore`] - budget header and item rows (load + batch upsert)
//! - [`CatalogLookup`] - composition price catalog (fuzzy search + exact code)
//!
//! # Architecture
//!
//! Both collaborators are async traits so the surrounding application can bind
//! them to any network or storage protocol. In-memory implementations are
//! provided for tests, benchmarks and development tooling.

mod budget_store;
mod catalog;
mod error;
mod memory_catalog;
mod memory_store;

pub use budget_store::{BudgetRecord, BudgetStore, ItemBatch, RowRef, StoredItem, StoredKind};
pub use catalog::CatalogLookup;
pub use error::StoreError;
pub use memory_catalog::InMemoryCatalog;
pub use memory_store::{BudgetSnapshot, InMemoryBudgetStore};
