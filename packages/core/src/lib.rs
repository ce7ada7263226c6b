//! Orcaplan Core - Budget Composition Tree & Cost Rollup Engine
//!
//! Represents a construction budget as a hierarchy of stages and priced
//! compositions, numbers it ("2.1.3"), rolls quantities and unit prices up
//! into totals under a markup rate (BDI), and drives the interactive
//! search-then-commit workflow for adding nodes.
//!
//! # Architecture
//!
//! - **Flat storage, derived tree**: items are kept as a flat list linked by
//!   `parent_id`; the tree and all totals are rebuilt after every change
//! - **Local-first edits**: new items get transient ids and live only in
//!   memory until an explicit save
//! - **All-or-nothing saves**: one batch per save, guarded by a version token
//! - **Collaborators behind traits**: storage and the price catalog are
//!   reached through [`db::BudgetStore`] and [`db::CatalogLookup`]
//!
//! # Modules
//!
//! - [`models`] - Items, ids, headers, totals and catalog candidates
//! - [`db`] - Storage and catalog traits with in-memory implementations
//! - [`services`] - Tree builder, rollup, editor, reconciliation, sessions
//! - [`config`] - Engine tunables

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::EngineConfig;
pub use models::*;
pub use services::*;
