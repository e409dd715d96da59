//! Inventory domain module.
//!
//! Items, locations, the stock-ledger taxonomy, weighted-average costing and
//! the movement/disposal documents, implemented purely as deterministic domain
//! logic (no IO, no storage). The engines in `stockbook-infra` drive them.

pub mod costing;
pub mod disposal;
pub mod item;
pub mod ledger;
pub mod movement;
pub mod reference;

pub use costing::{cost_after_cancellation, weighted_average_cost};
pub use disposal::{DisposalReason, DisposalRecord, DisposalRequest, DisposalSubject};
pub use item::{Item, ItemFlags, Location, LocationKind, StockCacheEntry};
pub use ledger::{
    AdjustmentDirection, LedgerEntry, LedgerEntryDraft, LocationRole, StockEffect,
    TransactionKind, replay_balance, replay_distribution, stock_effect,
};
pub use movement::{
    CommitMovement, MovementCommand, MovementEvent, MovementLine, MovementStatus, RejectMovement,
    RequestMovement, Shortfall, SourceAvailability, StockMovement, ValidateMovement,
    requested_per_item,
};
pub use reference::{DocumentKind, format_reference, parse_reference};
