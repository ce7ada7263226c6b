//! Store Error Types
//!
//! This module defines error types for persistence operations, providing
//! clear error handling for missing budgets, stale writes and malformed batches.

use crate::models::{BudgetId, ValidationError};
use thiserror::Error;

/// Persistence operation errors
///
/// Returned by every [`BudgetStore`](crate::db::BudgetStore) implementation.
/// Any of these aborts a save before the in-memory tree is touched.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Budget does not exist in storage
    #[error("Budget not found: {budget_id}")]
    BudgetNotFound { budget_id: BudgetId },

    /// The stored budget changed since it was loaded
    #[error("Version conflict for budget {budget_id}: expected version {expected_version}, found {actual_version}")]
    VersionConflict {
        budget_id: BudgetId,
        expected_version: i64,
        actual_version: i64,
    },

    /// A row in the batch referenced an id or client key that does not resolve
    #[error("Unresolved reference in batch: {reference}")]
    UnresolvedReference { reference: String },

    /// A stored row could not be mapped to a budget item
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    /// An item in the batch failed validation; nothing was written
    #[error("Invalid item in batch: {0}")]
    InvalidItem(#[from] ValidationError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport or backend failure reported by the storage service
    #[error("Storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a budget not found error
    pub fn budget_not_found(budget_id: BudgetId) -> Self {
        Self::BudgetNotFound { budget_id }
    }

    /// Create a version conflict error
    pub fn version_conflict(budget_id: BudgetId, expected_version: i64, actual_version: i64) -> Self {
        Self::VersionConflict {
            budget_id,
            expected_version,
            actual_version,
        }
    }

    /// Create an unresolved reference error
    pub fn unresolved_reference(reference: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            reference: reference.into(),
        }
    }

    /// Create an invalid row error
    pub fn invalid_row(msg: impl Into<String>) -> Self {
        Self::InvalidRow(msg.into())
    }

    /// Create a backend failure error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
