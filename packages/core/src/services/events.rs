//! Budget Session Events
//!
//! Events emitted by a [`BudgetSession`](crate::services::BudgetSession)
//! whenever its observable state changes. They follow the observer pattern:
//! the rendering layer subscribes and re-reads rows or totals instead of
//! polling.
//!
//! # Event Flow
//!
//! 1. A session operation mutates the item list, the editor or the header
//! 2. Tree and totals are recomputed
//! 3. One event per observable change is sent on the broadcast channel
//! 4. Every subscriber receives it asynchronously
//!
//! Failures the user must see (a rejected save, a version conflict) are
//! reported as [`Notice`]s.

use serde::{Deserialize, Serialize};

use crate::models::BudgetTotals;
use crate::services::node_editor::EditorPhase;

/// Subscriber capacity of the session event channel
pub const SESSION_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Info,
    Warning,
    /// Must be acknowledged before the user continues
    Blocking,
}

/// A message for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Blocking,
            message: message.into(),
        }
    }
}

/// Observable changes of a budget session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BudgetEvent {
    /// Items were added, removed, replaced or edited
    ItemsChanged,

    /// Totals were recomputed
    TotalsRecomputed { totals: BudgetTotals },

    /// The editor moved to another phase
    EditorStateChanged { phase: EditorPhase },

    /// The active search received the results of its latest query
    SearchResultsChanged { count: usize },

    /// The budget was (re)loaded from storage
    Loaded { version: i64 },

    /// A save was accepted by storage
    Saved { version: i64 },

    /// Something the user has to be told
    Notice(Notice),
}

impl BudgetEvent {
    pub fn event_type(&self) -> &str {
        match self {
            BudgetEvent::ItemsChanged => "items:changed",
            BudgetEvent::TotalsRecomputed { .. } => "totals:recomputed",
            BudgetEvent::EditorStateChanged { .. } => "editor:state-changed",
            BudgetEvent::SearchResultsChanged { .. } => "search:results-changed",
            BudgetEvent::Loaded { .. } => "budget:loaded",
            BudgetEvent::Saved { .. } => "budget:saved",
            BudgetEvent::Notice(_) => "notice",
        }
    }
}

/// An event tagged with the session that emitted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session_id: String,
    pub event: BudgetEvent,
}
