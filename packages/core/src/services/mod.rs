//! Budget Services
//!
//! The engine proper, layered bottom-up:
//!
//! - `tree_builder` - Forest reconstruction, numbering and flattening
//! - `cost_rollup` - Per-node and budget-level totals
//! - `catalog_search` - Debounced, sequenced catalog queries
//! - `node_editor` - The add-stage / add-composition state machine
//! - `reconciliation` - Mapping to and from the storage row shape
//! - `budget_session` - One user's editing session over one budget
//!
//! The session coordinates the others; everything below it is synchronous
//! except catalog queries and storage calls.

pub mod budget_session;
pub mod catalog_search;
pub mod cost_rollup;
pub mod error;
pub mod events;
pub mod node_editor;
pub mod reconciliation;
pub mod tree_builder;


pub use budget_session::{BudgetSession, RenderedRow};
pub use catalog_search::{CatalogSearch, SearchMode, SearchOutcome, SearchTicket};
pub use cost_rollup::{CostRollup, NodeCost};
pub use error::{EditorError, SessionError};
pub use events::{BudgetEvent, Notice, NoticeLevel, SessionEvent};
pub use node_editor::{CompositionSearch, EditorPhase, NodeEditor, StageKey};
pub use reconciliation::{LoadedBudget, Reconciler, SaveReceipt, MISSING_DESCRIPTION};
pub use tree_builder::{BudgetTree, NodeKey, TreeNode, TreeRow, ViewState};
