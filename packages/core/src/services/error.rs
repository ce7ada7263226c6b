//! Service Layer Error Types
//!
//! This module defines error types for editor and session operations,
//! separating synchronous validation rejections from persistence failures.

use crate::config::ConfigError;
use crate::db::StoreError;
use crate::models::{ItemKind, ValidationError};
use crate::services::node_editor::EditorPhase;
use thiserror::Error;

/// Rejections raised by the interactive node editor
///
/// A rejected action never changes editor state or budget items.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    /// A composition can only be added under a stage or a composition
    #[error("Cannot add a composition under a {} node", .kind.as_str())]
    InvalidSelection { kind: ItemKind },

    /// A search placeholder already exists
    #[error("A composition search is already in progress")]
    SearchAlreadyActive,

    /// The action is not defined in the current state
    #[error("Action '{action}' is not allowed while {phase}")]
    InvalidState {
        action: &'static str,
        phase: EditorPhase,
    },

    /// Commit attempted before a catalog candidate was chosen
    #[error("No catalog composition has been selected")]
    NoCandidateSelected,

    /// Commit attempted with a non-positive quantity
    #[error("Invalid quantity {0}: must be greater than zero")]
    InvalidQuantity(f64),

    /// Stage commit with a blank description
    #[error("Stage description cannot be empty")]
    EmptyStageDescription,
}

impl EditorError {
    pub fn invalid_state(action: &'static str, phase: EditorPhase) -> Self {
        Self::InvalidState { action, phase }
    }
}

/// Budget editing session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Item not found by ID
    #[error("Item not found: {id}")]
    ItemNotFound { id: String },

    /// Invalid update operation
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// Editor rejected the action
    #[error("Editor rejected action: {0}")]
    Editor(#[from] EditorError),

    /// Item or header validation failed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Load or save failed
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Engine configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Create an item not found error
    pub fn item_not_found(id: impl ToString) -> Self {
        Self::ItemNotFound { id: id.to_string() }
    }

    /// Create an invalid update error
    pub fn invalid_update(msg: impl Into<String>) -> Self {
        Self::InvalidUpdate(msg.into())
    }

    /// Whether the failure came from the persistence layer
    pub fn is_persistence(&self) -> bool {
        matches!(self, SessionError::Persistence(_))
    }
}
