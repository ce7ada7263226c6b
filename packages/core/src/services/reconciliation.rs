//! Reconciliation / Persistence Adapter
//!
//! Translates between the in-memory item list and the storage row shape.
//!
//! - **Load** replaces items, markup rate and header wholesale with what
//!   storage returns, filling defaults for missing fields.
//! - **Save** writes every stage and composition (never search placeholders)
//!   in one all-or-nothing batch. Transient items are sent without an id and
//!   with their client key; parent references to transient items use the
//!   parent's client key so storage can resolve them inside the batch.
//!
//! The adapter never mutates the caller's items. After a successful save the
//! caller reloads to obtain canonical ids; [`SaveReceipt::id_map`] tells it
//! which durable id each transient item received.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::{BudgetRecord, BudgetStore, ItemBatch, RowRef, StoreError, StoredItem, StoredKind};
use crate::models::{BudgetHeader, BudgetId, BudgetItem, ItemId, ItemKind};

/// Description used for stored rows that carry none
pub const MISSING_DESCRIPTION: &str = "Description not found";

/// A budget as the session holds it after a load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBudget {
    pub header: BudgetHeader,
    pub bdi_rate_percent: f64,
    pub items: Vec<BudgetItem>,
}

/// Result of an accepted save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReceipt {
    /// Durable id assigned to each transient item that was written
    pub id_map: HashMap<ItemId, ItemId>,
    pub rows_written: usize,
    pub rows_deleted: usize,
}

pub struct Reconciler {
    store: Arc<dyn BudgetStore>,
    default_bdi_rate_percent: f64,
    default_source_base: String,
}

impl Reconciler {
    pub fn new(store: Arc<dyn BudgetStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            default_bdi_rate_percent: config.default_bdi_rate_percent,
            default_source_base: config.default_source_base.clone(),
        }
    }

    /// Fetch a budget and map its rows to items
    pub async fn load(&self, budget_id: BudgetId) -> Result<LoadedBudget, StoreError> {
        let record = self.store.load_budget(budget_id).await?;
        let loaded = self.budget_from_record(record)?;
        tracing::info!(
            "Loaded budget {} (version {}, {} item(s))",
            budget_id,
            loaded.header.version,
            loaded.items.len()
        );
        Ok(loaded)
    }

    fn budget_from_record(&self, record: BudgetRecord) -> Result<LoadedBudget, StoreError> {
        let items = record
            .items
            .iter()
            .map(|row| self.item_from_stored(row))
            .collect::<Result<Vec<_>, _>>()?;

        let bdi_rate_percent = match record.bdi_rate_percent {
            Some(rate) => rate,
            None => {
                tracing::debug!(
                    "Budget {} has no markup rate, using default {}%",
                    record.id,
                    self.default_bdi_rate_percent
                );
                self.default_bdi_rate_percent
            }
        };

        Ok(LoadedBudget {
            header: BudgetHeader {
                id: record.id,
                description: record.description,
                status: record.status,
                version: record.version,
            },
            bdi_rate_percent,
            items,
        })
    }

    /// Map one stored row to an item
    ///
    /// Rows coming back from storage must carry a durable id and durable
    /// parent references.
    pub fn item_from_stored(&self, row: &StoredItem) -> Result<BudgetItem, StoreError> {
        let id = row
            .id
            .map(ItemId::Durable)
            .ok_or_else(|| StoreError::invalid_row("stored row without an id"))?;

        let parent_id = match &row.parent {
            None => None,
            Some(RowRef::Id(parent)) => Some(ItemId::Durable(*parent)),
            Some(RowRef::ClientKey(key)) => {
                return Err(StoreError::invalid_row(format!(
                    "row {} references unresolved client key '{}'",
                    id, key
                )))
            }
        };

        let description = row
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| MISSING_DESCRIPTION.to_string());

        let item = match row.kind {
            StoredKind::Stage => BudgetItem {
                id,
                parent_id,
                kind: ItemKind::Stage,
                code: row.code.clone(),
                source_base: row.source_base.clone(),
                description,
                unit: row.unit.clone(),
                quantity: row.quantity,
                unit_price: None,
                labor_unit_price: None,
                catalog_item_id: None,
            },
            StoredKind::Composition => BudgetItem {
                id,
                parent_id,
                kind: ItemKind::Composition,
                code: row.code.clone(),
                source_base: Some(
                    row.source_base
                        .clone()
                        .unwrap_or_else(|| self.default_source_base.clone()),
                ),
                description,
                unit: row.unit.clone(),
                quantity: row.quantity,
                unit_price: Some(
                    row.frozen_unit_price
                        .or(row.catalog_unit_price)
                        .unwrap_or(0.0),
                ),
                labor_unit_price: Some(row.labor_unit_price.unwrap_or(0.0)),
                catalog_item_id: row.catalog_item_id,
            },
        };
        Ok(item)
    }

    /// Map one item to the storage row shape
    ///
    /// Returns `None` for search placeholders. `persisted` holds the ids of
    /// every item being written; a parent outside it is dropped so the row
    /// lands at root level, where it is displayed anyway.
    pub fn to_stored(item: &BudgetItem, persisted: &HashSet<ItemId>) -> Option<StoredItem> {
        let kind = match item.kind {
            ItemKind::Stage => StoredKind::Stage,
            ItemKind::Composition => StoredKind::Composition,
            ItemKind::SearchPlaceholder => return None,
        };

        let parent = item.parent_id.and_then(|parent| {
            if !persisted.contains(&parent) {
                tracing::debug!(
                    "Item {} references missing parent {}, storing at root level",
                    item.id,
                    parent
                );
                return None;
            }
            Some(match parent {
                ItemId::Durable(id) => RowRef::Id(id),
                ItemId::Transient(_) => RowRef::ClientKey(parent.client_key()),
            })
        });

        let (id, client_key) = match item.id {
            ItemId::Durable(id) => (Some(id), None),
            ItemId::Transient(_) => (None, Some(item.id.client_key())),
        };

        Some(StoredItem {
            id,
            client_key,
            parent,
            kind,
            code: item.code.clone(),
            source_base: item.source_base.clone(),
            description: Some(item.description.clone()),
            unit: item.unit.clone(),
            quantity: item.quantity,
            frozen_unit_price: item.unit_price,
            catalog_unit_price: None,
            labor_unit_price: item.labor_unit_price,
            catalog_item_id: item.catalog_item_id,
        })
    }

    /// Build the write batch for the current in-memory state
    pub fn build_batch(
        header: &BudgetHeader,
        bdi_rate_percent: f64,
        items: &[BudgetItem],
        deletions: &[i64],
    ) -> ItemBatch {
        let persisted: HashSet<ItemId> = items
            .iter()
            .filter(|item| item.kind.is_persistable())
            .map(|item| item.id)
            .collect();

        ItemBatch {
            expected_version: header.version,
            bdi_rate_percent,
            upserts: items
                .iter()
                .filter_map(|item| Self::to_stored(item, &persisted))
                .collect(),
            deletions: deletions.to_vec(),
        }
    }

    /// Write the budget in a single batch
    ///
    /// Nothing in memory is touched; on failure the caller's state is exactly
    /// what it was before the call. Items that have never been stored must
    /// pass [`BudgetItem::validate`]; rows that came from storage are written
    /// back as they are.
    pub async fn save(
        &self,
        header: &BudgetHeader,
        bdi_rate_percent: f64,
        items: &[BudgetItem],
        deletions: &[i64],
    ) -> Result<SaveReceipt, StoreError> {
        for item in items
            .iter()
            .filter(|item| item.id.is_transient() && item.kind.is_persistable())
        {
            item.validate()?;
        }

        let batch = Self::build_batch(header, bdi_rate_percent, items, deletions);
        let rows_deleted = batch.deletions.len();
        tracing::debug!(
            "Saving budget {}: {} row(s), {} deletion(s), expected version {}",
            header.id,
            batch.upserts.len(),
            rows_deleted,
            batch.expected_version
        );

        let written = self.store.upsert_items(header.id, batch).await?;

        let mut id_map = HashMap::new();
        for row in &written {
            if let (Some(key), Some(durable)) = (&row.client_key, row.id) {
                match key.parse::<ItemId>() {
                    Ok(transient) => {
                        id_map.insert(transient, ItemId::Durable(durable));
                    }
                    Err(e) => tracing::warn!("Ignoring unparseable client key '{}': {}", key, e),
                }
            }
        }

        tracing::info!(
            "Saved budget {}: {} row(s) written, {} new id(s)",
            header.id,
            written.len(),
            id_map.len()
        );

        Ok(SaveReceipt {
            id_map,
            rows_written: written.len(),
            rows_deleted,
        })
    }
}
