//! In-memory BudgetStore
//!
//! A complete [`BudgetStore`] backed by a `tokio::sync::RwLock`-guarded map.
//! Used by tests, benchmarks and the `budget-dump` dev tool, and as the
//! reference for how a real storage binding must treat batches:
//!
//! 1. Check the version token
//! 2. Assign durable ids to new rows and index them by client key
//! 3. Resolve client-key parent references
//! 4. Only then replace the stored rows and bump the version
//!
//! Any failure in steps 1-3 leaves the stored budget untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;

use crate::db::{BudgetRecord, BudgetStore, ItemBatch, RowRef, StoreError, StoredItem};
use crate::models::BudgetId;

/// Serialized form of a set of budgets, used to seed the store from a file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    #[serde(default)]
    pub budgets: Vec<BudgetRecord>,
}

pub struct InMemoryBudgetStore {
    budgets: RwLock<HashMap<BudgetId, BudgetRecord>>,
    next_row_id: AtomicI64,
    unavailable: AtomicBool,
}

impl Default for InMemoryBudgetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBudgetStore {
    pub fn new() -> Self {
        Self {
            budgets: RwLock::new(HashMap::new()),
            next_row_id: AtomicI64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Create a store pre-populated with the budgets of a snapshot
    pub fn from_snapshot(snapshot: BudgetSnapshot) -> Self {
        let max_row_id = snapshot
            .budgets
            .iter()
            .flat_map(|b| b.items.iter())
            .filter_map(|row| row.id)
            .max()
            .unwrap_or(0);

        let budgets = snapshot
            .budgets
            .into_iter()
            .map(|budget| (budget.id, budget))
            .collect();

        Self {
            budgets: RwLock::new(budgets),
            next_row_id: AtomicI64::new(max_row_id + 1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Read a JSON snapshot file and build a store from it
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        let snapshot: BudgetSnapshot = serde_json::from_str(&contents)?;
        tracing::debug!(
            "Seeded in-memory store with {} budget(s) from {:?}",
            snapshot.budgets.len(),
            path.as_ref()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Insert or replace a budget
    pub async fn insert_budget(&self, record: BudgetRecord) {
        if let Some(max_id) = record.items.iter().filter_map(|row| row.id).max() {
            self.next_row_id.fetch_max(max_id + 1, Ordering::SeqCst);
        }
        self.budgets.write().await.insert(record.id, record);
    }

    /// Simulate a transport outage: every call fails with `StoreError::Backend`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current stored state of a budget
    pub async fn snapshot_of(&self, budget_id: BudgetId) -> Option<BudgetRecord> {
        self.budgets.read().await.get(&budget_id).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::backend("storage service unavailable"));
        }
        Ok(())
    }

    fn allocate_row_id(&self) -> i64 {
        self.next_row_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl BudgetStore for InMemoryBudgetStore {
    async fn load_budget(&self, budget_id: BudgetId) -> Result<BudgetRecord, StoreError> {
        self.check_available()?;
        self.budgets
            .read()
            .await
            .get(&budget_id)
            .cloned()
            .ok_or_else(|| StoreError::budget_not_found(budget_id))
    }

    async fn upsert_items(
        &self,
        budget_id: BudgetId,
        batch: ItemBatch,
    ) -> Result<Vec<StoredItem>, StoreError> {
        self.check_available()?;

        let mut budgets = self.budgets.write().await;
        let record = budgets
            .get_mut(&budget_id)
            .ok_or_else(|| StoreError::budget_not_found(budget_id))?;

        if record.version != batch.expected_version {
            tracing::warn!(
                "Rejecting batch for budget {}: expected version {}, stored version {}",
                budget_id,
                batch.expected_version,
                record.version
            );
            return Err(StoreError::version_conflict(
                budget_id,
                batch.expected_version,
                record.version,
            ));
        }

        // Pass 1: assign durable ids and index client keys
        let mut key_to_id: HashMap<String, i64> = HashMap::new();
        let mut upserted: Vec<StoredItem> = Vec::with_capacity(batch.upserts.len());
        for mut row in batch.upserts {
            let id = match row.id {
                Some(id) => id,
                None => self.allocate_row_id(),
            };
            if let Some(key) = &row.client_key {
                key_to_id.insert(key.clone(), id);
            }
            row.id = Some(id);
            upserted.push(row);
        }

        // Pass 2: resolve parent references created in this batch
        for row in upserted.iter_mut() {
            if let Some(RowRef::ClientKey(key)) = &row.parent {
                let parent_id = key_to_id
                    .get(key)
                    .copied()
                    .ok_or_else(|| StoreError::unresolved_reference(key.clone()))?;
                row.parent = Some(RowRef::Id(parent_id));
            }
        }

        // Commit: deletions, updates in place, inserts appended
        let mut rows: Vec<StoredItem> = record
            .items
            .iter()
            .filter(|row| row.id.map_or(true, |id| !batch.deletions.contains(&id)))
            .cloned()
            .collect();

        for row in &upserted {
            let stored = StoredItem {
                client_key: None,
                ..row.clone()
            };
            match rows.iter_mut().find(|existing| existing.id == stored.id) {
                Some(existing) => *existing = stored,
                None => rows.push(stored),
            }
        }

        record.items = rows;
        record.bdi_rate_percent = Some(batch.bdi_rate_percent);
        record.version += 1;

        tracing::info!(
            "Applied batch to budget {}: {} upsert(s), {} deletion(s), now at version {}",
            budget_id,
            upserted.len(),
            batch.deletions.len(),
            record.version
        );

        Ok(upserted)
    }
}
