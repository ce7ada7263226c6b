//! Catalog Search Sequencing
//!
//! Every query the user types is issued as a [`SearchTicket`] carrying a
//! monotonically increasing sequence number. Only the outcome of the latest
//! ticket is ever applied; a response that arrives after a newer ticket was
//! issued is dropped, whatever order the catalog answers in.
//!
//! Description queries are debounced: the ticket waits for the configured
//! interval and is abandoned without calling the catalog if a newer ticket
//! was issued meanwhile. Exact-code lookups run immediately.
//!
//! Catalog failures never propagate: they are logged and surface as an empty
//! result list.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::db::CatalogLookup;
use crate::models::Candidate;

/// Which catalog operation a ticket targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    /// Fuzzy search on the description
    Description,
    /// Exact match on the composition code
    ExactCode,
}

/// A query issued to the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub sequence: u64,
    pub mode: SearchMode,
    /// Trimmed query text
    pub text: String,
}

impl SearchTicket {
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

/// Catalog response tagged with the ticket it answers
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub sequence: u64,
    pub mode: SearchMode,
    pub candidates: Vec<Candidate>,
}

/// Issues tickets and runs them against a [`CatalogLookup`]
///
/// Cheap to clone; clones share the sequence counter so a ticket issued
/// through any clone supersedes the others.
#[derive(Clone)]
pub struct CatalogSearch {
    catalog: Arc<dyn CatalogLookup>,
    latest: Arc<AtomicU64>,
    debounce: Duration,
    limit: usize,
}

impl CatalogSearch {
    pub fn new(catalog: Arc<dyn CatalogLookup>, debounce: Duration, limit: usize) -> Self {
        Self {
            catalog,
            latest: Arc::new(AtomicU64::new(0)),
            debounce,
            limit,
        }
    }

    pub fn from_config(catalog: Arc<dyn CatalogLookup>, config: &EngineConfig) -> Self {
        Self::new(catalog, config.search_debounce(), config.search_result_limit)
    }

    /// Issue a new ticket, superseding every earlier one
    pub fn issue(&self, text: &str, mode: SearchMode) -> SearchTicket {
        let sequence = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        SearchTicket {
            sequence,
            mode,
            text: text.trim().to_string(),
        }
    }

    /// Whether no newer ticket has been issued since `ticket`
    pub fn is_latest(&self, ticket: &SearchTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.sequence
    }

    /// Run a ticket with the behavior its mode calls for
    ///
    /// Returns `None` when the ticket is blank or was superseded before the
    /// catalog was called.
    pub async fn run(&self, ticket: SearchTicket) -> Option<SearchOutcome> {
        match ticket.mode {
            SearchMode::Description => self.search_debounced(ticket).await,
            SearchMode::ExactCode => self.lookup_exact(ticket).await,
        }
    }

    /// Wait out the debounce interval, then search by description
    pub async fn search_debounced(&self, ticket: SearchTicket) -> Option<SearchOutcome> {
        if ticket.is_blank() {
            return None;
        }

        tokio::time::sleep(self.debounce).await;
        if !self.is_latest(&ticket) {
            tracing::trace!(
                "Search #{} superseded during debounce, not querying catalog",
                ticket.sequence
            );
            return None;
        }

        let candidates = match self.catalog.search(&ticket.text, self.limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Catalog search for '{}' failed: {:#}", ticket.text, e);
                Vec::new()
            }
        };

        Some(SearchOutcome {
            sequence: ticket.sequence,
            mode: ticket.mode,
            candidates,
        })
    }

    /// Look up an exact composition code without debouncing
    pub async fn lookup_exact(&self, ticket: SearchTicket) -> Option<SearchOutcome> {
        if ticket.is_blank() {
            return None;
        }

        let candidates = match self.catalog.exact_match(&ticket.text).await {
            Ok(found) => found.into_iter().collect(),
            Err(e) => {
                tracing::warn!("Catalog lookup for code '{}' failed: {:#}", ticket.text, e);
                Vec::new()
            }
        };

        Some(SearchOutcome {
            sequence: ticket.sequence,
            mode: ticket.mode,
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCatalog;
    use async_trait::async_trait;

    struct FailingCatalog;

    #[async_trait]
    impl CatalogLookup for FailingCatalog {
        async fn search(&self, _text: &str, _limit: usize) -> anyhow::Result<Vec<Candidate>> {
            anyhow::bail!("catalog offline")
        }

        async fn exact_match(&self, _code: &str) -> anyhow::Result<Option<Candidate>> {
            anyhow::bail!("catalog offline")
        }
    }

    fn search() -> CatalogSearch {
        let catalog = InMemoryCatalog::new(vec![
            Candidate::new("87292", "Concrete slab", "m3", 480.0, 120.0),
            Candidate::new("10001", "Ceramic brick wall", "m2", 75.0, 30.0),
        ]);
        CatalogSearch::new(Arc::new(catalog), Duration::from_millis(500), 10)
    }

    #[test]
    fn test_issue_trims_and_sequences() {
        let search = search();
        let first = search.issue("  slab ", SearchMode::Description);
        let second = search.issue("wall", SearchMode::Description);

        assert_eq!(first.text, "slab");
        assert!(second.sequence > first.sequence);
        assert!(!search.is_latest(&first));
        assert!(search.is_latest(&second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_ticket_skips_catalog() {
        let search = search();
        let first = search.issue("slab", SearchMode::Description);
        let second = search.issue("brick", SearchMode::Description);

        let (a, b) = tokio::join!(
            search.search_debounced(first),
            search.search_debounced(second.clone())
        );

        assert!(a.is_none());
        let outcome = b.unwrap();
        assert_eq!(outcome.sequence, second.sequence);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].code, "10001");
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_ticket_does_not_run() {
        let search = search();
        let ticket = search.issue("   ", SearchMode::Description);
        assert!(ticket.is_blank());
        assert!(search.run(ticket).await.is_none());
    }

    #[tokio::test]
    async fn test_exact_lookup_hit_and_miss() {
        let search = search();

        let hit = search
            .run(search.issue("87292", SearchMode::ExactCode))
            .await
            .unwrap();
        assert_eq!(hit.candidates.len(), 1);

        let miss = search
            .run(search.issue("00000", SearchMode::ExactCode))
            .await
            .unwrap();
        assert!(miss.candidates.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_failure_yields_empty_results() {
        let search = CatalogSearch::new(Arc::new(FailingCatalog), Duration::from_millis(10), 5);

        let fuzzy = search
            .run(search.issue("slab", SearchMode::Description))
            .await
            .unwrap();
        assert!(fuzzy.candidates.is_empty());

        let exact = search
            .run(search.issue("87292", SearchMode::ExactCode))
            .await
            .unwrap();
        assert!(exact.candidates.is_empty());
    }
}
