//! Budget Snapshot Inspector
//!
//! Loads a budget snapshot file into the in-memory store, opens an editing
//! session on one budget and prints the fully expanded table with its totals.
//! Useful for checking numbering and rollup against real data without the UI.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin budget-dump -- budgets.json          # first budget in the file
//! cargo run --bin budget-dump -- budgets.json 42       # budget 42
//! cargo run --bin budget-dump -- budgets.json 42 --json
//! cargo run --bin budget-dump -- --help
//! ```
//!
//! # Configuration
//!
//! Reads `~/.orcaplan/config.json` when present, then applies the
//! `ORCAPLAN_SEARCH_DEBOUNCE_MS` / `ORCAPLAN_SEARCH_RESULT_LIMIT` overrides.
//! Log verbosity follows `RUST_LOG` (default `budget_dump=info,orcaplan_core=info`).

use anyhow::{bail, Context};
use clap::Parser;
use orcaplan_core::{
    config::EngineConfig,
    db::{BudgetSnapshot, InMemoryBudgetStore, InMemoryCatalog},
    services::{BudgetSession, RenderedRow},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "budget-dump")]
#[command(version, about = "Print a budget snapshot as a numbered table with totals", long_about = None)]
struct Args {
    /// Budget snapshot file (JSON)
    snapshot: PathBuf,

    /// Budget to open (default: first budget in the snapshot)
    budget_id: Option<i64>,

    /// Output rows and totals as JSON
    #[arg(long)]
    json: bool,
}

fn load_config() -> anyhow::Result<EngineConfig> {
    let config = match EngineConfig::default_path() {
        Ok(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        Err(e) => {
            tracing::warn!("Using default configuration: {}", e);
            EngineConfig::default()
        }
    };
    Ok(config.from_env()?)
}

fn print_table(rows: &[RenderedRow]) {
    println!(
        "{:<10} {:<10} {:<48} {:<6} {:>10} {:>12} {:>12} {:>14}",
        "Item", "Code", "Description", "Unit", "Qty", "Unit price", "w/ markup", "Total"
    );
    for row in rows {
        let indent = "  ".repeat(row.depth);
        let description = format!("{}{}", indent, row.description);
        println!(
            "{:<10} {:<10} {:<48} {:<6} {:>10} {:>12} {:>12} {:>14.2}",
            row.sequence_number,
            row.code.as_deref().unwrap_or(""),
            description,
            row.unit.as_deref().unwrap_or(""),
            row.quantity.map(|q| format!("{:.2}", q)).unwrap_or_default(),
            row.unit_price.map(|p| format!("{:.2}", p)).unwrap_or_default(),
            row.unit_price_with_markup
                .map(|p| format!("{:.2}", p))
                .unwrap_or_default(),
            row.node_total,
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("budget_dump=info,orcaplan_core=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let snapshot_path = args.snapshot.display().to_string();

    let contents = tokio::fs::read_to_string(&args.snapshot)
        .await
        .with_context(|| format!("Failed to read snapshot {}", snapshot_path))?;
    let snapshot: BudgetSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse snapshot {}", snapshot_path))?;

    let budget_id = match args.budget_id {
        Some(id) => id,
        None => match snapshot.budgets.first() {
            Some(budget) => budget.id,
            None => bail!("Snapshot {} contains no budgets", snapshot_path),
        },
    };

    let config = load_config()?;
    let store = Arc::new(InMemoryBudgetStore::from_snapshot(snapshot));
    let catalog = Arc::new(InMemoryCatalog::default());

    let mut session = match BudgetSession::open(budget_id, store, catalog, config).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to open budget {}: {}", budget_id, e);
            return Err(e.into());
        }
    };
    session.expand_all();

    let rows = session.rows();
    let totals = session.totals();

    if args.json {
        let output = serde_json::json!({
            "budget": session.header(),
            "bdiRatePercent": session.bdi_rate_percent(),
            "rows": rows,
            "totals": totals,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let header = session.header();
        println!(
            "Budget {} - {} [{}] (version {}, markup {}%)\n",
            header.id,
            header.description,
            header.status,
            header.version,
            session.bdi_rate_percent()
        );
        print_table(&rows);
        println!();
        println!("Total without markup: {:>14.2}", totals.total_without_markup);
        println!("Markup amount:        {:>14.2}", totals.total_markup_amount);
        println!("Total with markup:    {:>14.2}", totals.total_with_markup);
        println!("Labor total:          {:>14.2}", totals.total_labor);
    }

    session.close();
    Ok(())
}
