//! Budget Item Data Structures
//!
//! A budget is stored as a flat collection of [`BudgetItem`] records. The
//! hierarchy (stages containing compositions, compositions containing
//! compositions) is reconstructed from `parent_id` by the tree builder.
//!
//! # Kinds
//!
//! - **Stage**: pure container, carries only a description
//! - **Composition**: cost-bearing item referencing a catalog price record
//! - **SearchPlaceholder**: transient row shown while a composition search is
//!   in progress, never persisted
//!
//! # Examples
//!
//! ```rust
//! use orcaplan_core::models::{BudgetItem, Candidate};
//!
//! let stage = BudgetItem::stage("Foundations");
//! let candidate = Candidate::new("87292", "Concrete slab", "m3", 100.0, 20.0);
//! let slab = BudgetItem::composition(Some(stage.id), &candidate, 2.0, "SINAPI");
//!
//! assert_eq!(slab.direct_cost(), 200.0);
//! assert_eq!(slab.labor_cost(), 40.0);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Candidate, ItemId};

/// Validation errors for budget data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field '{field}' on item {id}")]
    MissingField { id: String, field: &'static str },

    #[error("Invalid item id: {0}")]
    InvalidId(String),

    #[error("Invalid quantity {value} on item {id}: must be a finite number greater than zero")]
    InvalidQuantity { id: String, value: f64 },

    #[error("Invalid price {value} for '{field}' on item {id}: must be a finite, non-negative number")]
    InvalidPrice {
        id: String,
        field: &'static str,
        value: f64,
    },

    #[error("Invalid markup rate {0}: must be a finite, non-negative percentage")]
    InvalidMarkupRate(f64),
}

/// Kind of a budget tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Stage,
    Composition,
    SearchPlaceholder,
}

impl ItemKind {
    /// Whether items of this kind are written to storage
    pub fn is_persistable(&self) -> bool {
        matches!(self, ItemKind::Stage | ItemKind::Composition)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Stage => "stage",
            ItemKind::Composition => "composition",
            ItemKind::SearchPlaceholder => "search-placeholder",
        }
    }
}

/// A node of the budget tree
///
/// Descriptive and cost fields are optional because their meaning depends on
/// `kind`: they are required for compositions, decorative for stages and
/// absent on search placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItem {
    pub id: ItemId,

    /// Parent item; `None` for root-level items
    pub parent_id: Option<ItemId>,

    pub kind: ItemKind,

    #[serde(default)]
    pub code: Option<String>,

    /// Price base the composition was taken from (e.g. "SINAPI")
    #[serde(default)]
    pub source_base: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub quantity: Option<f64>,

    /// Unit cost without markup
    #[serde(default)]
    pub unit_price: Option<f64>,

    /// Labor share of the unit cost (never marked up)
    #[serde(default)]
    pub labor_unit_price: Option<f64>,

    /// Catalog record this composition was created from
    #[serde(default)]
    pub catalog_item_id: Option<i64>,
}

impl BudgetItem {
    /// Create a new root-level stage with a transient id
    pub fn stage(description: impl Into<String>) -> Self {
        Self {
            id: ItemId::next_transient(),
            parent_id: None,
            kind: ItemKind::Stage,
            code: None,
            source_base: None,
            description: description.into(),
            unit: None,
            quantity: None,
            unit_price: None,
            labor_unit_price: None,
            catalog_item_id: None,
        }
    }

    /// Create a search placeholder under `parent_id`
    pub fn placeholder(parent_id: Option<ItemId>) -> Self {
        Self {
            id: ItemId::next_transient(),
            parent_id,
            kind: ItemKind::SearchPlaceholder,
            code: None,
            source_base: None,
            description: String::new(),
            unit: None,
            quantity: None,
            unit_price: None,
            labor_unit_price: None,
            catalog_item_id: None,
        }
    }

    /// Create a composition from a catalog candidate with a transient id
    ///
    /// `default_base` is used when the candidate does not name its price base.
    pub fn composition(
        parent_id: Option<ItemId>,
        candidate: &Candidate,
        quantity: f64,
        default_base: &str,
    ) -> Self {
        Self {
            id: ItemId::next_transient(),
            parent_id,
            kind: ItemKind::Composition,
            code: Some(candidate.code.clone()),
            source_base: Some(
                candidate
                    .source_base
                    .clone()
                    .unwrap_or_else(|| default_base.to_string()),
            ),
            description: candidate.description.clone(),
            unit: Some(candidate.unit.clone()),
            quantity: Some(quantity),
            unit_price: Some(candidate.unit_cost),
            labor_unit_price: Some(candidate.labor_unit_cost),
            catalog_item_id: candidate.catalog_id,
        }
    }

    pub fn is_stage(&self) -> bool {
        self.kind == ItemKind::Stage
    }

    pub fn is_composition(&self) -> bool {
        self.kind == ItemKind::Composition
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == ItemKind::SearchPlaceholder
    }

    /// `quantity × unit_price` for compositions, zero for every other kind
    pub fn direct_cost(&self) -> f64 {
        if !self.is_composition() {
            return 0.0;
        }
        self.quantity.unwrap_or(0.0) * self.unit_price.unwrap_or(0.0)
    }

    /// `quantity × labor_unit_price` for compositions, zero for every other kind
    pub fn labor_cost(&self) -> f64 {
        if !self.is_composition() {
            return 0.0;
        }
        self.quantity.unwrap_or(0.0) * self.labor_unit_price.unwrap_or(0.0)
    }

    /// Unit price with the budget markup applied; `None` unless this is a composition
    pub fn markup_unit_cost(&self, bdi_rate_percent: f64) -> Option<f64> {
        if !self.is_composition() {
            return None;
        }
        Some(self.unit_price.unwrap_or(0.0) * (1.0 + bdi_rate_percent / 100.0))
    }

    /// Check kind-specific field requirements
    ///
    /// Compositions must carry a code, a unit, a finite positive quantity and
    /// finite non-negative prices. Stages and placeholders are always valid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.is_composition() {
            return Ok(());
        }

        let id = self.id.to_string();
        if self.code.as_deref().map_or(true, str::is_empty) {
            return Err(ValidationError::MissingField { id, field: "code" });
        }
        if self.unit.is_none() {
            return Err(ValidationError::MissingField { id, field: "unit" });
        }

        let quantity = self.quantity.ok_or_else(|| ValidationError::MissingField {
            id: id.clone(),
            field: "quantity",
        })?;
        validate_quantity(&self.id, quantity)?;

        for (field, value) in [
            ("unitPrice", self.unit_price),
            ("laborUnitPrice", self.labor_unit_price),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(ValidationError::InvalidPrice {
                        id: id.clone(),
                        field,
                        value,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Quantities must be finite and strictly positive
pub fn validate_quantity(id: &ItemId, quantity: f64) -> Result<(), ValidationError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ValidationError::InvalidQuantity {
            id: id.to_string(),
            value: quantity,
        });
    }
    Ok(())
}

/// Markup rates are finite, non-negative percentages
pub fn validate_bdi_rate(rate_percent: f64) -> Result<(), ValidationError> {
    if !rate_percent.is_finite() || rate_percent < 0.0 {
        return Err(ValidationError::InvalidMarkupRate(rate_percent));
    }
    Ok(())
}
