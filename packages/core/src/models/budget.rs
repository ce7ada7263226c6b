//! Budget aggregate header and derived totals

use serde::{Deserialize, Serialize};

/// Storage identifier of a budget
pub type BudgetId = i64;

/// Descriptive header of the budget being edited
///
/// `version` is the optimistic concurrency token observed when the budget was
/// loaded; it is sent back on save so the store can reject stale writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetHeader {
    pub id: BudgetId,
    pub description: String,
    pub status: String,
    pub version: i64,
}

impl BudgetHeader {
    /// Header used before the first load completes
    pub fn placeholder(id: BudgetId) -> Self {
        Self {
            id,
            description: String::new(),
            status: String::new(),
            version: 0,
        }
    }
}

/// Budget-level totals, derived on every recomputation and never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetTotals {
    /// Σ quantity × unit price over all compositions
    pub total_without_markup: f64,

    /// `total_without_markup × rate / 100`
    pub total_markup_amount: f64,

    /// `total_without_markup + total_markup_amount`
    pub total_with_markup: f64,

    /// Σ quantity × labor unit price over all compositions (not marked up)
    pub total_labor: f64,
}
