//! CatalogLookup Trait - Composition Price Catalog
//!
//! The catalog service resolves a free-text query or an exact composition
//! code to price records. It is an external collaborator: the engine only
//! consumes it, and every failure is recovered by the caller as "no results".

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Candidate;

/// Abstraction over the composition catalog
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Fuzzy search by description, returning at most `limit` candidates
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>>;

    /// Look up a composition by its exact code
    ///
    /// Returns `Ok(None)` when no record carries the code (not an error).
    async fn exact_match(&self, code: &str) -> Result<Option<Candidate>>;
}
