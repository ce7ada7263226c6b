//! BudgetStore Trait - Persistence Abstraction Layer
//!
//! This module defines the `BudgetStore` trait that abstracts the remote
//! storage service holding budgets and their flat item rows. The editing
//! session only ever talks to storage through this trait, so the surrounding
//! application can bind it to whatever network or database protocol it uses.
//!
//! # Architecture
//!
//! - **Two operations**: a budget read (header + rows) and a single batch write
//! - **All-or-nothing writes**: a batch is applied completely or not at all
//! - **Client keys**: rows created in the same batch can reference each other
//!   through the transient key of the item they were created from
//! - **Version token**: every write names the budget version it was based on
//!
//! # Row Shape
//!
//! ```json
//! {
//!   "id": null,
//!   "clientKey": "tmp-1718000000000",
//!   "parent": { "clientKey": "tmp-1717999999000" },
//!   "kind": "COMPOSITION",
//!   "code": "87292",
//!   "description": "Concrete slab",
//!   "unit": "m3",
//!   "quantity": 2.0,
//!   "frozenUnitPrice": 100.0,
//!   "laborUnitPrice": 20.0
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::StoreError;
use crate::models::BudgetId;

/// Kind of a persisted row (search placeholders are never stored)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoredKind {
    Stage,
    Composition,
}

/// Reference from one stored row to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowRef {
    /// Durable row id
    Id(i64),

    /// Client key of a row created in the same batch
    ClientKey(String),
}

/// Storage representation of a budget item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    /// Durable id; `None` asks storage to create a new row
    #[serde(default)]
    pub id: Option<i64>,

    /// Transient key of the client item this row was created from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,

    #[serde(default)]
    pub parent: Option<RowRef>,

    pub kind: StoredKind,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub source_base: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub quantity: Option<f64>,

    /// Unit price frozen into the budget when the composition was added
    #[serde(default)]
    pub frozen_unit_price: Option<f64>,

    /// Current catalog unit price, used when no frozen price exists
    #[serde(default)]
    pub catalog_unit_price: Option<f64>,

    #[serde(default)]
    pub labor_unit_price: Option<f64>,

    #[serde(default)]
    pub catalog_item_id: Option<i64>,
}

/// A budget as returned by storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRecord {
    pub id: BudgetId,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: String,

    /// Markup percentage; `None` when the budget never had one set
    #[serde(default)]
    pub bdi_rate_percent: Option<f64>,

    /// Optimistic concurrency token, bumped on every accepted write
    #[serde(default)]
    pub version: i64,

    #[serde(default)]
    pub items: Vec<StoredItem>,
}

/// One all-or-nothing write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBatch {
    /// Version the client observed on load
    pub expected_version: i64,

    pub bdi_rate_percent: f64,

    /// Rows to create (id `None`) or update (id `Some`)
    pub upserts: Vec<StoredItem>,

    /// Durable ids of rows removed since the last load
    #[serde(default)]
    pub deletions: Vec<i64>,
}

/// Abstraction over the storage service that holds budgets
///
/// Implementations must be `Send + Sync` so sessions can be driven from any
/// async context.
///
/// # Errors
///
/// Every failure is reported as a [`StoreError`]; implementations must not
/// apply any part of a batch that fails.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Fetch the budget header and all of its item rows
    ///
    /// Returns `StoreError::BudgetNotFound` when the id is unknown.
    async fn load_budget(&self, budget_id: BudgetId) -> Result<BudgetRecord, StoreError>;

    /// Apply a batch of upserts and deletions
    ///
    /// # Returns
    ///
    /// The upserted rows with durable ids assigned and client-key parent
    /// references resolved to durable ids.
    ///
    /// # Errors
    ///
    /// - `BudgetNotFound` if the budget does not exist
    /// - `VersionConflict` if `expected_version` is stale
    /// - `UnresolvedReference` if a client-key parent is not part of the batch
    async fn upsert_items(
        &self,
        budget_id: BudgetId,
        batch: ItemBatch,
    ) -> Result<Vec<StoredItem>, StoreError>;
}
