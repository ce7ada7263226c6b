//! In-memory CatalogLookup
//!
//! Case-insensitive substring search over a fixed list of price records,
//! with an optional artificial latency to exercise out-of-order responses.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::db::CatalogLookup;
use crate::models::Candidate;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    records: Vec<Candidate>,
    latency: Option<Duration>,
}

impl InMemoryCatalog {
    pub fn new(records: Vec<Candidate>) -> Self {
        Self {
            records,
            latency: None,
        }
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>> {
        self.simulate_latency().await;

        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .records
            .iter()
            .filter(|c| c.description.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn exact_match(&self, code: &str) -> Result<Option<Candidate>> {
        self.simulate_latency().await;

        let code = code.trim();
        Ok(self.records.iter().find(|c| c.code == code).cloned())
    }
}
