//! Interactive Node Editor
//!
//! State machine governing how stages and compositions are added to a budget.
//!
//! ```text
//!            begin_stage                    begin_composition
//!   ┌──────────────────────┐   Idle   ┌───────────────────────────────┐
//!   ▼                      │ ◄──────► │                               ▼
//! StageEditing ── commit / cancel ──► Idle ◄── commit / cancel ── CompositionSearching
//! ```
//!
//! - **StageEditing** shows a transient text field; no item exists until the
//!   stage is committed (save action or Enter).
//! - **CompositionSearching** inserts exactly one search placeholder under the
//!   selected node and force-expands that node. Catalog results are accepted
//!   only for the latest search ticket. Commit replaces the placeholder in place
//!   with a composition; cancel removes it.
//!
//! The editor mutates the flat item list handed to it and never touches
//! storage. Rejected actions leave both the editor and the items unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{BudgetItem, Candidate, ItemId, ItemKind};
use crate::services::catalog_search::{SearchMode, SearchOutcome, SearchTicket};
use crate::services::error::EditorError;
use crate::services::tree_builder::{NodeKey, ViewState};

/// Observable phase of the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditorPhase {
    Idle,
    StageEditing,
    CompositionSearching,
}

impl fmt::Display for EditorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EditorPhase::Idle => "idle",
            EditorPhase::StageEditing => "editing a stage",
            EditorPhase::CompositionSearching => "searching for a composition",
        };
        f.write_str(label)
    }
}

/// Keys the inline stage field reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKey {
    Enter,
    Escape,
    Other,
}

/// State of an in-progress composition search
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionSearch {
    pub placeholder_id: ItemId,
    pub parent_id: Option<ItemId>,
    /// Description query typed by the user
    pub query: String,
    /// Exact code typed by the user
    pub code: String,
    pub results: Vec<Candidate>,
    pub chosen: Option<Candidate>,
    pub quantity: f64,
    /// Sequence of the latest ticket; only its outcome is accepted
    pub pending_sequence: Option<u64>,
}

impl CompositionSearch {
    pub fn is_loading(&self) -> bool {
        self.pending_sequence.is_some()
    }

    /// Whether a commit would currently be accepted
    pub fn can_commit(&self) -> bool {
        self.chosen.is_some() && self.quantity.is_finite() && self.quantity > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
enum EditorState {
    Idle,
    StageEditing { draft: String },
    CompositionSearching(CompositionSearch),
}

/// The interactive add-node state machine
#[derive(Debug, Clone)]
pub struct NodeEditor {
    state: EditorState,
    default_quantity: f64,
    default_source_base: String,
}

impl NodeEditor {
    pub fn new(default_quantity: f64, default_source_base: impl Into<String>) -> Self {
        Self {
            state: EditorState::Idle,
            default_quantity,
            default_source_base: default_source_base.into(),
        }
    }

    pub fn phase(&self) -> EditorPhase {
        match self.state {
            EditorState::Idle => EditorPhase::Idle,
            EditorState::StageEditing { .. } => EditorPhase::StageEditing,
            EditorState::CompositionSearching(_) => EditorPhase::CompositionSearching,
        }
    }

    /// Text currently typed in the stage field
    pub fn stage_draft(&self) -> Option<&str> {
        match &self.state {
            EditorState::StageEditing { draft } => Some(draft),
            _ => None,
        }
    }

    pub fn search(&self) -> Option<&CompositionSearch> {
        match &self.state {
            EditorState::CompositionSearching(search) => Some(search),
            _ => None,
        }
    }

    fn search_mut(&mut self, action: &'static str) -> Result<&mut CompositionSearch, EditorError> {
        let phase = self.phase();
        match &mut self.state {
            EditorState::CompositionSearching(search) => Ok(search),
            _ => Err(EditorError::invalid_state(action, phase)),
        }
    }

    //
    // STAGE EDITING
    //

    /// `Idle → StageEditing`
    pub fn begin_stage(&mut self) -> Result<(), EditorError> {
        if self.phase() != EditorPhase::Idle {
            return Err(EditorError::invalid_state("new stage", self.phase()));
        }
        self.state = EditorState::StageEditing {
            draft: String::new(),
        };
        tracing::debug!("Editor: idle -> stage editing");
        Ok(())
    }

    pub fn set_stage_draft(&mut self, text: impl Into<String>) -> Result<(), EditorError> {
        let phase = self.phase();
        match &mut self.state {
            EditorState::StageEditing { draft } => {
                *draft = text.into();
                Ok(())
            }
            _ => Err(EditorError::invalid_state("edit stage", phase)),
        }
    }

    /// `StageEditing → Idle`, appending a new root stage
    ///
    /// Returns the transient id of the created stage. A blank description is
    /// rejected and the editor stays in `StageEditing`.
    pub fn commit_stage(&mut self, items: &mut Vec<BudgetItem>) -> Result<ItemId, EditorError> {
        let description = match &self.state {
            EditorState::StageEditing { draft } => draft.trim().to_string(),
            _ => return Err(EditorError::invalid_state("save stage", self.phase())),
        };
        if description.is_empty() {
            return Err(EditorError::EmptyStageDescription);
        }

        let stage = BudgetItem::stage(description);
        let id = stage.id;
        items.push(stage);
        self.state = EditorState::Idle;
        tracing::debug!("Editor: stage {} committed, back to idle", id);
        Ok(id)
    }

    /// `StageEditing → Idle` without creating anything
    pub fn cancel_stage(&mut self) -> Result<(), EditorError> {
        if self.phase() != EditorPhase::StageEditing {
            return Err(EditorError::invalid_state("cancel stage", self.phase()));
        }
        self.state = EditorState::Idle;
        tracing::debug!("Editor: stage cancelled, back to idle");
        Ok(())
    }

    /// Keyboard handling of the stage field: Enter commits, Escape cancels
    pub fn handle_stage_key(
        &mut self,
        key: StageKey,
        items: &mut Vec<BudgetItem>,
    ) -> Result<Option<ItemId>, EditorError> {
        match key {
            StageKey::Enter => self.commit_stage(items).map(Some),
            StageKey::Escape => self.cancel_stage().map(|_| None),
            StageKey::Other => Ok(None),
        }
    }

    //
    // COMPOSITION SEARCH
    //

    /// Whether the "new composition" action should be enabled
    pub fn can_begin_composition(&self, items: &[BudgetItem]) -> bool {
        self.phase() == EditorPhase::Idle && !items.iter().any(BudgetItem::is_placeholder)
    }

    /// `Idle → CompositionSearching`
    ///
    /// Appends one search placeholder under `selected` (or at root level when
    /// nothing is selected) and expands the parent so the placeholder shows.
    pub fn begin_composition(
        &mut self,
        selected: Option<&BudgetItem>,
        items: &mut Vec<BudgetItem>,
        view: &mut ViewState,
    ) -> Result<ItemId, EditorError> {
        if self.phase() == EditorPhase::CompositionSearching
            || items.iter().any(BudgetItem::is_placeholder)
        {
            return Err(EditorError::SearchAlreadyActive);
        }
        if self.phase() != EditorPhase::Idle {
            return Err(EditorError::invalid_state("new composition", self.phase()));
        }
        if let Some(item) = selected {
            if !matches!(item.kind, ItemKind::Stage | ItemKind::Composition) {
                return Err(EditorError::InvalidSelection { kind: item.kind });
            }
        }

        let parent_id = selected.map(|item| item.id);
        let placeholder = BudgetItem::placeholder(parent_id);
        let placeholder_id = placeholder.id;
        items.push(placeholder);

        if let Some(parent) = parent_id {
            view.expand(NodeKey::Item(parent));
        }

        self.state = EditorState::CompositionSearching(CompositionSearch {
            placeholder_id,
            parent_id,
            query: String::new(),
            code: String::new(),
            results: Vec::new(),
            chosen: None,
            quantity: self.default_quantity,
            pending_sequence: None,
        });
        tracing::debug!(
            "Editor: idle -> composition searching (placeholder {} under {:?})",
            placeholder_id,
            parent_id
        );
        Ok(placeholder_id)
    }

    /// Record a newly issued search ticket
    ///
    /// Any earlier ticket becomes stale. A blank query clears the results and
    /// leaves nothing pending.
    pub fn track_ticket(&mut self, ticket: &SearchTicket) -> Result<(), EditorError> {
        let search = self.search_mut("search")?;
        match ticket.mode {
            SearchMode::Description => search.query = ticket.text.clone(),
            SearchMode::ExactCode => search.code = ticket.text.clone(),
        }
        if ticket.is_blank() {
            search.results.clear();
            search.pending_sequence = None;
        } else {
            search.pending_sequence = Some(ticket.sequence);
        }
        Ok(())
    }

    /// Apply a catalog outcome if it answers the latest ticket
    ///
    /// Returns `true` when the outcome was applied. An exact-code hit selects
    /// the candidate immediately; an exact-code miss leaves the results as
    /// they were.
    pub fn accept_search_outcome(&mut self, outcome: SearchOutcome) -> bool {
        let search = match &mut self.state {
            EditorState::CompositionSearching(search) => search,
            _ => {
                tracing::debug!(
                    "Dropping search outcome #{}: editor is not searching",
                    outcome.sequence
                );
                return false;
            }
        };

        if search.pending_sequence != Some(outcome.sequence) {
            tracing::debug!(
                "Dropping stale search outcome #{} (latest is {:?})",
                outcome.sequence,
                search.pending_sequence
            );
            return false;
        }
        search.pending_sequence = None;

        match outcome.mode {
            SearchMode::Description => {
                search.results = outcome.candidates;
            }
            SearchMode::ExactCode => {
                if let Some(candidate) = outcome.candidates.into_iter().next() {
                    Self::apply_choice(search, candidate);
                }
            }
        }
        true
    }

    /// Choose one of the current results by position
    pub fn choose_result(&mut self, index: usize) -> Result<&Candidate, EditorError> {
        let search = self.search_mut("choose composition")?;
        let candidate = search
            .results
            .get(index)
            .cloned()
            .ok_or(EditorError::NoCandidateSelected)?;
        Self::apply_choice(search, candidate);
        search.chosen.as_ref().ok_or(EditorError::NoCandidateSelected)
    }

    /// Choose an explicit candidate
    pub fn choose_candidate(&mut self, candidate: Candidate) -> Result<(), EditorError> {
        let search = self.search_mut("choose composition")?;
        Self::apply_choice(search, candidate);
        Ok(())
    }

    fn apply_choice(search: &mut CompositionSearch, candidate: Candidate) {
        search.code = candidate.code.clone();
        search.query = candidate.description.clone();
        search.results.clear();
        search.chosen = Some(candidate);
    }

    /// Update the pending quantity; validated on commit
    pub fn set_quantity(&mut self, quantity: f64) -> Result<(), EditorError> {
        self.search_mut("set quantity")?.quantity = quantity;
        Ok(())
    }

    /// `CompositionSearching → Idle`, replacing the placeholder in place
    ///
    /// The new composition takes the placeholder's position in `items` and its
    /// parent, with a fresh transient id.
    pub fn commit_composition(
        &mut self,
        items: &mut Vec<BudgetItem>,
    ) -> Result<ItemId, EditorError> {
        let default_base = self.default_source_base.clone();
        let search = self.search_mut("save composition")?;
        let candidate = search
            .chosen
            .clone()
            .ok_or(EditorError::NoCandidateSelected)?;
        if !search.quantity.is_finite() || search.quantity <= 0.0 {
            return Err(EditorError::InvalidQuantity(search.quantity));
        }

        let composition = BudgetItem::composition(
            search.parent_id,
            &candidate,
            search.quantity,
            &default_base,
        );
        let id = composition.id;
        let placeholder_id = search.placeholder_id;

        match items.iter().position(|item| item.id == placeholder_id) {
            Some(position) => items[position] = composition,
            None => items.push(composition),
        }

        self.state = EditorState::Idle;
        tracing::debug!(
            "Editor: placeholder {} replaced by composition {}, back to idle",
            placeholder_id,
            id
        );
        Ok(id)
    }

    /// `CompositionSearching → Idle`, removing the placeholder
    pub fn cancel_composition(&mut self, items: &mut Vec<BudgetItem>) -> Result<(), EditorError> {
        let placeholder_id = self.search_mut("cancel composition")?.placeholder_id;
        items.retain(|item| item.id != placeholder_id);
        self.state = EditorState::Idle;
        tracing::debug!("Editor: search {} cancelled, back to idle", placeholder_id);
        Ok(())
    }

    /// Return to `Idle` from any state, removing a placeholder if there is one
    pub fn reset(&mut self, items: &mut Vec<BudgetItem>) {
        if let EditorState::CompositionSearching(search) = &self.state {
            let placeholder_id = search.placeholder_id;
            items.retain(|item| item.id != placeholder_id);
        }
        self.state = EditorState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> NodeEditor {
        NodeEditor::new(1.0, "SINAPI")
    }

    fn stage(id: i64) -> BudgetItem {
        let mut item = BudgetItem::stage("Foundations");
        item.id = ItemId::Durable(id);
        item
    }

    fn candidate() -> Candidate {
        Candidate::new("87292", "Concrete slab", "m3", 100.0, 20.0)
    }

    fn ticket(sequence: u64, mode: SearchMode, text: &str) -> SearchTicket {
        SearchTicket {
            sequence,
            mode,
            text: text.to_string(),
        }
    }

    fn outcome(sequence: u64, mode: SearchMode, candidates: Vec<Candidate>) -> SearchOutcome {
        SearchOutcome {
            sequence,
            mode,
            candidates,
        }
    }

    #[test]
    fn test_stage_commit_appends_root_stage() {
        let mut editor = editor();
        let mut items = Vec::new();

        editor.begin_stage().unwrap();
        editor.set_stage_draft("  Masonry ").unwrap();
        let id = editor.commit_stage(&mut items).unwrap();

        assert_eq!(editor.phase(), EditorPhase::Idle);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].description, "Masonry");
        assert!(items[0].parent_id.is_none());
        assert!(id.is_transient());
    }

    #[test]
    fn test_stage_enter_commits_and_escape_cancels() {
        let mut editor = editor();
        let mut items = Vec::new();

        editor.begin_stage().unwrap();
        editor.set_stage_draft("Roof").unwrap();
        assert_eq!(editor.handle_stage_key(StageKey::Other, &mut items).unwrap(), None);
        assert!(editor.handle_stage_key(StageKey::Enter, &mut items).unwrap().is_some());
        assert_eq!(items.len(), 1);

        editor.begin_stage().unwrap();
        editor.set_stage_draft("Discarded").unwrap();
        assert_eq!(editor.handle_stage_key(StageKey::Escape, &mut items).unwrap(), None);
        assert_eq!(items.len(), 1);
        assert_eq!(editor.phase(), EditorPhase::Idle);
    }

    #[test]
    fn test_blank_stage_rejected_and_state_kept() {
        let mut editor = editor();
        let mut items = Vec::new();
        editor.begin_stage().unwrap();
        editor.set_stage_draft("   ").unwrap();

        assert_eq!(
            editor.commit_stage(&mut items),
            Err(EditorError::EmptyStageDescription)
        );
        assert_eq!(editor.phase(), EditorPhase::StageEditing);
        assert!(items.is_empty());
    }

    #[test]
    fn test_begin_composition_inserts_placeholder_and_expands_parent() {
        let mut editor = editor();
        let parent = stage(1);
        let mut items = vec![parent.clone()];
        let mut view = ViewState::new();

        let placeholder = editor
            .begin_composition(Some(&parent), &mut items, &mut view)
            .unwrap();

        assert_eq!(editor.phase(), EditorPhase::CompositionSearching);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, placeholder);
        assert_eq!(items[1].kind, ItemKind::SearchPlaceholder);
        assert_eq!(items[1].parent_id, Some(parent.id));
        assert!(view.is_expanded(&NodeKey::Item(parent.id)));
        assert_eq!(editor.search().unwrap().quantity, 1.0);
    }

    #[test]
    fn test_begin_composition_rejects_placeholder_selection() {
        let mut editor = editor();
        let placeholder = BudgetItem::placeholder(None);
        let mut items = Vec::new();
        let mut view = ViewState::new();

        let err = editor
            .begin_composition(Some(&placeholder), &mut items, &mut view)
            .unwrap_err();
        assert_eq!(
            err,
            EditorError::InvalidSelection {
                kind: ItemKind::SearchPlaceholder
            }
        );
        assert!(items.is_empty());
        assert_eq!(editor.phase(), EditorPhase::Idle);
    }

    #[test]
    fn test_second_placeholder_is_prevented() {
        let mut editor = editor();
        let parent = stage(1);
        let mut items = vec![parent.clone()];
        let mut view = ViewState::new();

        editor
            .begin_composition(Some(&parent), &mut items, &mut view)
            .unwrap();
        assert!(!editor.can_begin_composition(&items));

        let before = items.clone();
        assert_eq!(
            editor.begin_composition(Some(&parent), &mut items, &mut view),
            Err(EditorError::SearchAlreadyActive)
        );
        assert_eq!(items, before);
    }

    #[test]
    fn test_stale_outcomes_are_dropped() {
        let mut editor = editor();
        let mut items = vec![stage(1)];
        let mut view = ViewState::new();
        let selected = items[0].clone();
        editor
            .begin_composition(Some(&selected), &mut items, &mut view)
            .unwrap();

        editor
            .track_ticket(&ticket(1, SearchMode::Description, "conc"))
            .unwrap();
        editor
            .track_ticket(&ticket(2, SearchMode::Description, "concrete"))
            .unwrap();

        assert!(!editor.accept_search_outcome(outcome(1, SearchMode::Description, vec![candidate()])));
        assert!(editor.search().unwrap().results.is_empty());
        assert!(editor.search().unwrap().is_loading());

        assert!(editor.accept_search_outcome(outcome(2, SearchMode::Description, vec![candidate()])));
        assert_eq!(editor.search().unwrap().results.len(), 1);
        assert!(!editor.search().unwrap().is_loading());
        assert_eq!(editor.search().unwrap().query, "concrete");
    }

    #[test]
    fn test_blank_query_clears_results() {
        let mut editor = editor();
        let mut items = Vec::new();
        let mut view = ViewState::new();
        editor.begin_composition(None, &mut items, &mut view).unwrap();

        editor
            .track_ticket(&ticket(1, SearchMode::Description, "slab"))
            .unwrap();
        editor.accept_search_outcome(outcome(1, SearchMode::Description, vec![candidate()]));
        editor
            .track_ticket(&ticket(2, SearchMode::Description, ""))
            .unwrap();

        let search = editor.search().unwrap();
        assert!(search.results.is_empty());
        assert!(!search.is_loading());
    }

    #[test]
    fn test_exact_code_hit_selects_candidate() {
        let mut editor = editor();
        let mut items = Vec::new();
        let mut view = ViewState::new();
        editor.begin_composition(None, &mut items, &mut view).unwrap();

        editor
            .track_ticket(&ticket(1, SearchMode::ExactCode, "87292"))
            .unwrap();
        assert!(editor.accept_search_outcome(outcome(1, SearchMode::ExactCode, vec![candidate()])));

        let search = editor.search().unwrap();
        assert_eq!(search.chosen.as_ref().unwrap().code, "87292");
        assert_eq!(search.query, "Concrete slab");
        assert!(search.can_commit());
    }

    #[test]
    fn test_commit_replaces_placeholder_in_place() {
        let mut editor = editor();
        let parent = stage(1);
        let mut items = vec![parent.clone(), stage(2)];
        let mut view = ViewState::new();

        let placeholder = editor
            .begin_composition(Some(&parent), &mut items, &mut view)
            .unwrap();
        // Move the placeholder to the middle to check positional replacement
        let ph = items.pop().unwrap();
        items.insert(1, ph);

        editor.choose_candidate(candidate()).unwrap();
        editor.set_quantity(2.0).unwrap();
        let id = editor.commit_composition(&mut items).unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[1].id, id);
        assert_ne!(id, placeholder);
        assert_eq!(items[1].kind, ItemKind::Composition);
        assert_eq!(items[1].parent_id, Some(parent.id));
        assert_eq!(items[1].quantity, Some(2.0));
        assert_eq!(items[0].id, ItemId::Durable(1));
        assert_eq!(items[2].id, ItemId::Durable(2));
        assert_eq!(editor.phase(), EditorPhase::Idle);
    }

    #[test]
    fn test_commit_falls_back_to_default_source_base() {
        let mut editor = NodeEditor::new(1.0, "SICRO");
        let mut items = vec![stage(1)];
        let mut view = ViewState::new();

        let parent = items[0].clone();
        editor
            .begin_composition(Some(&parent), &mut items, &mut view)
            .unwrap();
        editor.choose_candidate(candidate()).unwrap();
        let plain = editor.commit_composition(&mut items).unwrap();

        editor
            .begin_composition(Some(&parent), &mut items, &mut view)
            .unwrap();
        editor
            .choose_candidate(candidate().with_source_base("ORSE"))
            .unwrap();
        let tagged = editor.commit_composition(&mut items).unwrap();

        let base_of = |id: ItemId| {
            items
                .iter()
                .find(|item| item.id == id)
                .and_then(|item| item.source_base.clone())
        };
        assert_eq!(base_of(plain).as_deref(), Some("SICRO"));
        assert_eq!(base_of(tagged).as_deref(), Some("ORSE"));
    }

    #[test]
    fn test_commit_validation() {
        let mut editor = editor();
        let mut items = Vec::new();
        let mut view = ViewState::new();
        editor.begin_composition(None, &mut items, &mut view).unwrap();

        assert_eq!(
            editor.commit_composition(&mut items),
            Err(EditorError::NoCandidateSelected)
        );

        editor.choose_candidate(candidate()).unwrap();
        editor.set_quantity(0.0).unwrap();
        assert_eq!(
            editor.commit_composition(&mut items),
            Err(EditorError::InvalidQuantity(0.0))
        );
        assert_eq!(editor.phase(), EditorPhase::CompositionSearching);
        assert_eq!(items.len(), 1);
        assert!(items[0].is_placeholder());
    }

    #[test]
    fn test_cancel_removes_placeholder() {
        let mut editor = editor();
        let mut items = vec![stage(1)];
        let mut view = ViewState::new();
        let selected = items[0].clone();
        editor
            .begin_composition(Some(&selected), &mut items, &mut view)
            .unwrap();
        editor
            .track_ticket(&ticket(3, SearchMode::Description, "slab"))
            .unwrap();

        editor.cancel_composition(&mut items).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(editor.phase(), EditorPhase::Idle);

        // Late outcome after cancel is ignored
        assert!(!editor.accept_search_outcome(outcome(3, SearchMode::Description, vec![candidate()])));
    }

    #[test]
    fn test_undefined_transitions_are_rejected() {
        let mut editor = editor();
        let mut items = Vec::new();
        let mut view = ViewState::new();

        assert!(matches!(
            editor.cancel_stage(),
            Err(EditorError::InvalidState { .. })
        ));
        assert!(matches!(
            editor.commit_composition(&mut items),
            Err(EditorError::InvalidState { .. })
        ));

        editor.begin_stage().unwrap();
        assert!(matches!(
            editor.begin_composition(None, &mut items, &mut view),
            Err(EditorError::InvalidState { .. })
        ));
        assert!(matches!(
            editor.begin_stage(),
            Err(EditorError::InvalidState { .. })
        ));
    }
}
