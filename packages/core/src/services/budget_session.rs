//! Budget Editing Session
//!
//! A `BudgetSession` owns everything one user needs to edit one budget: the
//! flat item list, the markup rate, the expansion and selection state, the
//! interactive editor, and the derived tree and totals.
//!
//! # Flow
//!
//! ```text
//! open ──► load ──► build tree ──► rollup ──► rows()/totals()
//!                      ▲                          │
//!                      └──── mutate items ◄───────┘   (user actions)
//! save ──► upsert batch ──► reload ──► remap view/selection
//! ```
//!
//! Every mutation rebuilds the tree and the rollup from scratch and emits
//! [`BudgetEvent`]s to subscribers. Loads and saves are the only operations
//! that await storage; a failed save leaves the items exactly as they were.
//!
//! # Examples
//!
//! ```no_run
//! # use orcaplan_core::config::EngineConfig;
//! # use orcaplan_core::db::{InMemoryBudgetStore, InMemoryCatalog};
//! # use orcaplan_core::services::BudgetSession;
//! # use std::sync::Arc;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryBudgetStore::from_json_file("budgets.json").await?);
//! let catalog = Arc::new(InMemoryCatalog::default());
//! let mut session = BudgetSession::open(1, store, catalog, EngineConfig::default()).await?;
//!
//! session.begin_stage()?;
//! session.set_stage_draft("Foundations")?;
//! session.commit_stage()?;
//! session.save().await?;
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::{BudgetStore, CatalogLookup};
use crate::models::{
    validate_bdi_rate, validate_quantity, BudgetHeader, BudgetId, BudgetItem, BudgetTotals,
    Candidate, ItemId, ItemKind,
};
use crate::services::catalog_search::{CatalogSearch, SearchMode, SearchOutcome, SearchTicket};
use crate::services::cost_rollup::CostRollup;
use crate::services::error::{EditorError, SessionError};
use crate::services::events::{
    BudgetEvent, Notice, SessionEvent, SESSION_EVENT_CHANNEL_CAPACITY,
};
use crate::services::node_editor::{EditorPhase, NodeEditor, StageKey};
use crate::services::reconciliation::{LoadedBudget, Reconciler, SaveReceipt};
use crate::services::tree_builder::{BudgetTree, NodeKey, ViewState};

/// One row of the rendered budget table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedRow {
    pub key: NodeKey,
    /// `None` for the synthetic unassigned stage
    pub id: Option<ItemId>,
    pub kind: ItemKind,
    pub sequence_number: String,
    pub depth: usize,
    pub code: Option<String>,
    pub source_base: Option<String>,
    pub description: String,
    pub unit: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    /// `None` for stages and placeholders
    pub unit_price_with_markup: Option<f64>,
    pub node_total: f64,
    pub has_children: bool,
    pub expanded: bool,
    pub selected: bool,
    pub synthetic: bool,
}

/// Editing session over a single budget
pub struct BudgetSession {
    session_id: String,
    config: EngineConfig,
    reconciler: Reconciler,
    search: CatalogSearch,

    header: BudgetHeader,
    bdi_rate_percent: f64,
    items: Vec<BudgetItem>,
    /// Durable ids removed since the last load
    pending_deletions: Vec<i64>,
    dirty: bool,

    view: ViewState,
    selected: Option<ItemId>,
    editor: NodeEditor,

    tree: BudgetTree,
    rollup: CostRollup,

    event_tx: broadcast::Sender<SessionEvent>,
}

impl BudgetSession {
    /// Load a budget and start editing it
    ///
    /// A load failure is returned to the caller; no session exists yet to
    /// report it through.
    pub async fn open(
        budget_id: BudgetId,
        store: Arc<dyn BudgetStore>,
        catalog: Arc<dyn CatalogLookup>,
        config: EngineConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let session_id = Uuid::new_v4().to_string();
        let reconciler = Reconciler::new(store, &config);
        let search = CatalogSearch::from_config(catalog, &config);
        let editor = NodeEditor::new(config.default_quantity, config.default_source_base.clone());

        let loaded = reconciler.load(budget_id).await?;
        let tree = BudgetTree::build(&loaded.items, &config.orphan_stage_description);
        let rollup = CostRollup::compute(&tree, loaded.bdi_rate_percent);
        let (event_tx, _) = broadcast::channel(SESSION_EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            session_id = %session_id,
            "Opened budget {} '{}' with {} item(s)",
            budget_id,
            loaded.header.description,
            loaded.items.len()
        );

        Ok(Self {
            session_id,
            reconciler,
            search,
            header: loaded.header,
            bdi_rate_percent: loaded.bdi_rate_percent,
            items: loaded.items,
            pending_deletions: Vec::new(),
            dirty: false,
            view: ViewState::new(),
            selected: None,
            editor,
            tree,
            rollup,
            event_tx,
            config,
        })
    }

    /// End the session, discarding any in-progress editing
    pub fn close(mut self) {
        let before = self.editor.phase();
        self.editor.reset(&mut self.items);
        if before != EditorPhase::Idle {
            tracing::debug!(session_id = %self.session_id, "Closing while {}", before);
        }
        if self.dirty {
            tracing::warn!(
                session_id = %self.session_id,
                "Closing budget {} with unsaved changes",
                self.header.id
            );
        }
        tracing::info!(session_id = %self.session_id, "Closed budget {}", self.header.id);
    }

    //
    // ACCESSORS
    //

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn header(&self) -> &BudgetHeader {
        &self.header
    }

    pub fn bdi_rate_percent(&self) -> f64 {
        self.bdi_rate_percent
    }

    pub fn items(&self) -> &[BudgetItem] {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&BudgetItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn tree(&self) -> &BudgetTree {
        &self.tree
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn editor(&self) -> &NodeEditor {
        &self.editor
    }

    pub fn phase(&self) -> EditorPhase {
        self.editor.phase()
    }

    pub fn selected(&self) -> Option<ItemId> {
        self.selected
    }

    pub fn pending_deletions(&self) -> &[i64] {
        &self.pending_deletions
    }

    /// Whether items or the markup rate changed since the last load
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// Shared handle for running search tickets outside of `&mut self`
    pub fn catalog_search(&self) -> CatalogSearch {
        self.search.clone()
    }

    pub fn totals(&self) -> BudgetTotals {
        self.rollup.totals()
    }

    pub fn node_total(&self, key: &NodeKey) -> f64 {
        self.rollup.node_total(key)
    }

    /// Render-ready rows honoring expansion state
    pub fn rows(&self) -> Vec<RenderedRow> {
        self.tree
            .flatten(&self.view)
            .into_iter()
            .map(|row| {
                let item = self.tree.item(row.node_index);
                let cost = self.rollup.node_cost(&row.key).unwrap_or_default();
                let id = row.key.item_id();
                RenderedRow {
                    key: row.key,
                    id,
                    kind: self.tree.nodes()[row.node_index].kind,
                    sequence_number: row.sequence_number,
                    depth: row.depth,
                    code: item.and_then(|i| i.code.clone()),
                    source_base: item.and_then(|i| i.source_base.clone()),
                    description: self.tree.description(row.node_index).to_string(),
                    unit: item.and_then(|i| i.unit.clone()),
                    quantity: item.and_then(|i| i.quantity),
                    unit_price: item.and_then(|i| i.unit_price),
                    unit_price_with_markup: cost.unit_price_with_markup,
                    node_total: cost.total,
                    has_children: row.has_children,
                    expanded: row.expanded,
                    selected: id.is_some() && id == self.selected,
                    synthetic: row.key == NodeKey::Unassigned,
                }
            })
            .collect()
    }

    /// Subscribe to session events
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: BudgetEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(SessionEvent {
            session_id: self.session_id.clone(),
            event,
        });
    }

    fn notify(&self, notice: Notice) {
        self.emit(BudgetEvent::Notice(notice));
    }

    /// Rebuild tree and totals after `items` or the rate changed
    fn recompute(&mut self) {
        self.tree = BudgetTree::build(&self.items, &self.config.orphan_stage_description);
        self.rollup = CostRollup::compute(&self.tree, self.bdi_rate_percent);
        self.view.retain_existing(&self.tree);
        if let Some(id) = self.selected {
            if !self.items.iter().any(|item| item.id == id) {
                self.selected = None;
            }
        }
        self.emit(BudgetEvent::ItemsChanged);
        self.emit(BudgetEvent::TotalsRecomputed {
            totals: self.rollup.totals(),
        });
    }

    fn mark_changed(&mut self) {
        self.dirty = true;
        self.recompute();
    }

    /// Report an editor outcome, emitting phase changes and rejections
    fn editor_outcome<T>(
        &self,
        before: EditorPhase,
        result: Result<T, EditorError>,
    ) -> Result<T, SessionError> {
        match result {
            Ok(value) => {
                let after = self.editor.phase();
                if after != before {
                    self.emit(BudgetEvent::EditorStateChanged { phase: after });
                }
                Ok(value)
            }
            Err(e) => self.reject(e),
        }
    }

    /// Inform the user of a rejected action and return the error
    fn reject<T, E>(&self, error: E) -> Result<T, SessionError>
    where
        E: Into<SessionError> + std::fmt::Display,
    {
        tracing::debug!(session_id = %self.session_id, "Rejected action: {}", error);
        self.notify(Notice::warning(error.to_string()));
        Err(error.into())
    }

    //
    // SELECTION AND EXPANSION
    //

    /// Select a node; selecting never toggles
    pub fn select(&mut self, id: ItemId) -> Result<(), SessionError> {
        if self.item(id).is_none() {
            return Err(SessionError::item_not_found(id));
        }
        self.selected = Some(id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Expand every container, e.g. for printing the whole budget
    pub fn expand_all(&mut self) {
        for node in self.tree.nodes() {
            if !node.children.is_empty() {
                self.view.expand(node.key);
            }
        }
    }

    /// Flip a node's expansion, returning the new state
    pub fn toggle_expanded(&mut self, key: NodeKey) -> Result<bool, SessionError> {
        if !self.tree.contains(&key) {
            return Err(SessionError::item_not_found(format!("{:?}", key)));
        }
        Ok(self.view.toggle(key))
    }

    //
    // STAGE EDITING
    //

    pub fn begin_stage(&mut self) -> Result<(), SessionError> {
        let before = self.editor.phase();
        let result = self.editor.begin_stage();
        self.editor_outcome(before, result)
    }

    pub fn set_stage_draft(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        let before = self.editor.phase();
        let result = self.editor.set_stage_draft(text);
        self.editor_outcome(before, result)
    }

    /// Append the drafted stage at root level and select it
    pub fn commit_stage(&mut self) -> Result<ItemId, SessionError> {
        let before = self.editor.phase();
        let result = self.editor.commit_stage(&mut self.items);
        let id = self.editor_outcome(before, result)?;
        self.selected = Some(id);
        self.mark_changed();
        tracing::debug!(session_id = %self.session_id, "Added stage {}", id);
        Ok(id)
    }

    /// Keyboard handling of the stage field: Enter commits, Escape cancels
    pub fn handle_stage_key(&mut self, key: StageKey) -> Result<Option<ItemId>, SessionError> {
        match key {
            StageKey::Enter => self.commit_stage().map(Some),
            StageKey::Escape => self.cancel_stage().map(|_| None),
            StageKey::Other => Ok(None),
        }
    }

    pub fn cancel_stage(&mut self) -> Result<(), SessionError> {
        let before = self.editor.phase();
        let result = self.editor.cancel_stage();
        self.editor_outcome(before, result)
    }

    //
    // COMPOSITION SEARCH
    //

    /// Whether the "new composition" action is currently available
    pub fn can_begin_composition(&self) -> bool {
        self.editor.can_begin_composition(&self.items)
    }

    /// Start a composition search under the selected node
    pub fn begin_composition(&mut self) -> Result<ItemId, SessionError> {
        let selected = self.selected.and_then(|id| self.item(id).cloned());
        let before = self.editor.phase();
        let result = self
            .editor
            .begin_composition(selected.as_ref(), &mut self.items, &mut self.view);
        let id = self.editor_outcome(before, result)?;
        self.recompute();
        Ok(id)
    }

    fn issue(&mut self, text: &str, mode: SearchMode) -> Result<Option<SearchTicket>, SessionError> {
        let ticket = self.search.issue(text, mode);
        let before = self.editor.phase();
        let result = self.editor.track_ticket(&ticket);
        self.editor_outcome(before, result)?;
        if ticket.is_blank() {
            self.emit(BudgetEvent::SearchResultsChanged { count: 0 });
            return Ok(None);
        }
        Ok(Some(ticket))
    }

    /// Record a new description query
    ///
    /// Returns the ticket to run through [`CatalogSearch::run`], or `None`
    /// when the query is blank and the results were simply cleared.
    pub fn issue_query(&mut self, text: &str) -> Result<Option<SearchTicket>, SessionError> {
        self.issue(text, SearchMode::Description)
    }

    /// Record a new exact-code lookup
    pub fn issue_exact_lookup(&mut self, code: &str) -> Result<Option<SearchTicket>, SessionError> {
        self.issue(code, SearchMode::ExactCode)
    }

    /// Apply a catalog outcome; stale outcomes are dropped
    pub fn accept_search_outcome(&mut self, outcome: SearchOutcome) -> bool {
        let applied = self.editor.accept_search_outcome(outcome);
        if applied {
            let count = self.editor.search().map_or(0, |search| search.results.len());
            self.emit(BudgetEvent::SearchResultsChanged { count });
        }
        applied
    }

    /// Issue, run and apply a description query in one step
    ///
    /// Holds the session for the debounce interval; event loops that must
    /// stay responsive should use [`issue_query`](Self::issue_query) and run
    /// the ticket on a [`catalog_search`](Self::catalog_search) handle.
    pub async fn run_query(&mut self, text: &str) -> Result<bool, SessionError> {
        let Some(ticket) = self.issue_query(text)? else {
            return Ok(false);
        };
        match self.search.run(ticket).await {
            Some(outcome) => Ok(self.accept_search_outcome(outcome)),
            None => Ok(false),
        }
    }

    /// Issue, run and apply an exact-code lookup in one step
    pub async fn lookup_code(&mut self, code: &str) -> Result<bool, SessionError> {
        let Some(ticket) = self.issue_exact_lookup(code)? else {
            return Ok(false);
        };
        match self.search.run(ticket).await {
            Some(outcome) => Ok(self.accept_search_outcome(outcome)),
            None => Ok(false),
        }
    }

    /// Choose one of the current results by position
    pub fn choose_result(&mut self, index: usize) -> Result<Candidate, SessionError> {
        let before = self.editor.phase();
        let result = self.editor.choose_result(index).cloned();
        self.editor_outcome(before, result)
    }

    pub fn choose_candidate(&mut self, candidate: Candidate) -> Result<(), SessionError> {
        let before = self.editor.phase();
        let result = self.editor.choose_candidate(candidate);
        self.editor_outcome(before, result)
    }

    pub fn set_quantity(&mut self, quantity: f64) -> Result<(), SessionError> {
        let before = self.editor.phase();
        let result = self.editor.set_quantity(quantity);
        self.editor_outcome(before, result)
    }

    /// Replace the placeholder with the chosen composition
    pub fn commit_composition(&mut self) -> Result<ItemId, SessionError> {
        let before = self.editor.phase();
        let result = self.editor.commit_composition(&mut self.items);
        let id = self.editor_outcome(before, result)?;

        // Root-level compositions live under the unassigned stage
        if self.item(id).map_or(false, |item| item.parent_id.is_none()) {
            self.view.expand(NodeKey::Unassigned);
        }
        self.mark_changed();
        tracing::debug!(session_id = %self.session_id, "Added composition {}", id);
        Ok(id)
    }

    pub fn cancel_composition(&mut self) -> Result<(), SessionError> {
        let before = self.editor.phase();
        let result = self.editor.cancel_composition(&mut self.items);
        self.editor_outcome(before, result)?;
        self.recompute();
        Ok(())
    }

    //
    // ITEM EDITS
    //

    /// Remove one item; its children become orphans
    ///
    /// Removing the active search placeholder cancels the search.
    pub fn remove_item(&mut self, id: ItemId) -> Result<(), SessionError> {
        let position = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| SessionError::item_not_found(id))?;

        if self.items[position].is_placeholder() {
            return self.cancel_composition();
        }

        let removed = self.items.remove(position);
        if let Some(durable) = removed.id.as_durable() {
            self.pending_deletions.push(durable);
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        tracing::debug!(
            session_id = %self.session_id,
            "Removed {} {}",
            removed.kind.as_str(),
            id
        );
        self.mark_changed();
        Ok(())
    }

    /// Change the quantity of a composition
    pub fn update_quantity(&mut self, id: ItemId, quantity: f64) -> Result<(), SessionError> {
        let Some(position) = self.items.iter().position(|item| item.id == id) else {
            return self.reject(SessionError::item_not_found(id));
        };
        let kind = self.items[position].kind;
        if kind != ItemKind::Composition {
            return self.reject(SessionError::invalid_update(format!(
                "{} {} has no quantity",
                kind.as_str(),
                id
            )));
        }
        if let Err(e) = validate_quantity(&id, quantity) {
            return self.reject(e);
        }
        self.items[position].quantity = Some(quantity);
        self.mark_changed();
        Ok(())
    }

    /// Change the budget-wide markup percentage
    pub fn set_bdi_rate(&mut self, rate_percent: f64) -> Result<(), SessionError> {
        if let Err(e) = validate_bdi_rate(rate_percent) {
            return self.reject(e);
        }
        self.bdi_rate_percent = rate_percent;
        self.mark_changed();
        Ok(())
    }

    //
    // PERSISTENCE
    //

    /// Write the budget and reload the canonical state
    ///
    /// On failure the items are left exactly as they were and a blocking
    /// notice is emitted. After an accepted write the search placeholder is
    /// discarded along with every other transient state.
    pub async fn save(&mut self) -> Result<SaveReceipt, SessionError> {
        let receipt = match self
            .reconciler
            .save(
                &self.header,
                self.bdi_rate_percent,
                &self.items,
                &self.pending_deletions,
            )
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "Save failed: {}", e);
                self.notify(Notice::blocking(format!("Could not save the budget: {}", e)));
                return Err(e.into());
            }
        };
        self.pending_deletions.clear();

        match self.reconciler.load(self.header.id).await {
            Ok(loaded) => {
                self.apply_loaded(loaded, Some(&receipt.id_map));
                self.emit(BudgetEvent::Saved {
                    version: self.header.version,
                });
                self.notify(Notice::info("Budget saved"));
                Ok(receipt)
            }
            Err(e) => {
                // The write went through; adopt the new ids so a retry updates
                // instead of inserting twice. The stale version forces a reload.
                self.adopt_ids(&receipt.id_map);
                self.dirty = false;
                self.recompute();
                tracing::warn!(
                    session_id = %self.session_id,
                    "Saved budget {} but reload failed: {}",
                    self.header.id,
                    e
                );
                self.notify(Notice::blocking(format!(
                    "The budget was saved but could not be reloaded: {}",
                    e
                )));
                Err(e.into())
            }
        }
    }

    /// Discard local state and load the budget again
    pub async fn reload(&mut self) -> Result<(), SessionError> {
        match self.reconciler.load(self.header.id).await {
            Ok(loaded) => {
                self.pending_deletions.clear();
                self.apply_loaded(loaded, None);
                self.emit(BudgetEvent::Loaded {
                    version: self.header.version,
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "Reload failed: {}", e);
                self.notify(Notice::blocking(format!("Could not load the budget: {}", e)));
                Err(e.into())
            }
        }
    }

    /// Drop an open composition search together with its placeholder
    fn discard_search(&mut self) {
        if self.editor.phase() == EditorPhase::CompositionSearching {
            self.editor.reset(&mut self.items);
            self.emit(BudgetEvent::EditorStateChanged {
                phase: self.editor.phase(),
            });
        }
    }

    fn apply_loaded(&mut self, loaded: LoadedBudget, id_map: Option<&HashMap<ItemId, ItemId>>) {
        self.discard_search();

        self.header = loaded.header;
        self.bdi_rate_percent = loaded.bdi_rate_percent;
        self.items = loaded.items;
        self.dirty = false;

        if let Some(map) = id_map {
            self.view.remap(map);
            self.selected = self.selected.map(|id| map.get(&id).copied().unwrap_or(id));
        }
        self.recompute();
    }

    /// Rewrite transient ids to the durable ids a save assigned
    ///
    /// An open search is discarded; its parent may be one of the remapped ids.
    fn adopt_ids(&mut self, id_map: &HashMap<ItemId, ItemId>) {
        self.discard_search();
        let remap = |id: ItemId| id_map.get(&id).copied().unwrap_or(id);
        for item in &mut self.items {
            item.id = remap(item.id);
            item.parent_id = item.parent_id.map(remap);
        }
        self.view.remap(id_map);
        self.selected = self.selected.map(remap);
    }
}
