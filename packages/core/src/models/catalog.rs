//! Catalog price records as returned by the catalog lookup collaborator

use serde::{Deserialize, Serialize};

/// A composition price record that can be added to a budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Catalog row id of the composition, when the catalog exposes one
    #[serde(default)]
    pub catalog_id: Option<i64>,

    pub code: String,

    pub description: String,

    pub unit: String,

    /// Total unit cost of the composition (material + labor)
    pub unit_cost: f64,

    /// Labor share of the unit cost
    #[serde(default)]
    pub labor_unit_cost: f64,

    /// Price base the record belongs to (e.g. "SINAPI")
    #[serde(default)]
    pub source_base: Option<String>,
}

impl Candidate {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        unit_cost: f64,
        labor_unit_cost: f64,
    ) -> Self {
        Self {
            catalog_id: None,
            code: code.into(),
            description: description.into(),
            unit: unit.into(),
            unit_cost,
            labor_unit_cost,
            source_base: None,
        }
    }

    pub fn with_catalog_id(mut self, catalog_id: i64) -> Self {
        self.catalog_id = Some(catalog_id);
        self
    }

    pub fn with_source_base(mut self, base: impl Into<String>) -> Self {
        self.source_base = Some(base.into());
        self
    }
}
