//! stockbook - operator tool for a persisted stock ledger snapshot.
//!
//! # Usage
//!
//! ```bash
//! stockbook reconcile --state state.json                      # report only
//! stockbook reconcile --state state.json --repair             # repair with the configured strategy
//! stockbook reconcile --state state.json --repair --strategy rebuild-cache
//! stockbook balance --state state.json --item SOAP-40G        # ledger vs cache for one item
//! stockbook valuation --state state.json
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;

use stockbook_accounting::InMemoryChartOfAccounts;
use stockbook_core::{ActorId, Entity, ItemId, LocationId};
use stockbook_infra::{InMemoryStockStore, RepairStrategy, StockBook, StockbookConfig};

type Book = StockBook<InMemoryStockStore, InMemoryChartOfAccounts>;

/// Inspect and repair a stock ledger snapshot.
#[derive(Parser, Debug)]
#[command(name = "stockbook")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to config/stockbook.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare stock caches with the ledger and optionally repair drift
    Reconcile {
        /// Snapshot file to load (and overwrite on repair)
        #[arg(long, value_name = "FILE")]
        state: PathBuf,
        /// Apply the repair instead of only reporting
        #[arg(long)]
        repair: bool,
        /// adjust-ledger or rebuild-cache; defaults to the configured strategy
        #[arg(long)]
        strategy: Option<RepairStrategy>,
    },

    /// Show ledger balance and cached quantity for one item
    Balance {
        #[arg(long, value_name = "FILE")]
        state: PathBuf,
        /// Item id or SKU
        #[arg(long)]
        item: String,
        /// Restrict to one location
        #[arg(long)]
        location: Option<LocationId>,
    },

    /// Value every active item at its weighted-average cost
    Valuation {
        #[arg(long, value_name = "FILE")]
        state: PathBuf,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = StockbookConfig::load_from(args.config.as_deref())
        .context("failed to load configuration")?;
    stockbook_observability::init(&config.logging);

    match args.command {
        Command::Reconcile {
            state,
            repair,
            strategy,
        } => {
            let strategy = strategy.unwrap_or(config.reconciliation.strategy);
            let book = open(&state, config)?;
            let report = if repair {
                book.reconcile_repair(strategy, ActorId::new())?
            } else {
                book.reconcile_report()?
            };
            print_json(&report)?;
            if repair {
                book.store()
                    .save_to(&state)
                    .with_context(|| format!("failed to save {}", state.display()))?;
                tracing::info!(path = %state.display(), "snapshot saved");
            }
            // Non-zero when an unrepaired report found drift, for scripting.
            if !repair && !report.is_clean() {
                return Ok(ExitCode::from(1));
            }
        }
        Command::Balance {
            state,
            item,
            location,
        } => {
            let book = open(&state, config)?;
            let item = resolve_item(&book, &item)?;
            let ledger = book.balance_of(item, location)?;
            let cached = match location {
                Some(location) => book.stock_at(item, location)?,
                None => book.global_quantity(item)?,
            };
            print_json(&json!({
                "item_id": item,
                "location_id": location,
                "ledger": ledger,
                "cached": cached,
                "in_sync": ledger == cached,
            }))?;
        }
        Command::Valuation { state } => {
            let book = open(&state, config)?;
            print_json(&book.valuation_summary()?)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn open(path: &Path, config: StockbookConfig) -> Result<Book> {
    let store = InMemoryStockStore::load_from(path)
        .with_context(|| format!("failed to load snapshot {}", path.display()))?;
    let chart = config.accounts.chart();
    Ok(StockBook::new(store, chart, config))
}

fn resolve_item(book: &Book, needle: &str) -> Result<ItemId> {
    if let Ok(id) = needle.parse::<ItemId>() {
        return Ok(id);
    }
    match book.items()?.into_iter().find(|i| i.sku() == needle) {
        Some(item) => Ok(item.id()),
        None => bail!("no item with id or SKU '{needle}'"),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
