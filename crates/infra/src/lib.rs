//! Infrastructure layer: state store, engines, reconciliation, configuration.
//!
//! [`StockBook`] is the entry point. Every mutating operation it exposes
//! (receive/cancel, issue/transfer, consume, dispose, adjust, repair) runs as
//! one unit of work over a [`StockStore`]; the ledger is the system of record
//! and the stock cache is its projection.

pub mod accounting_bridge;
pub mod adjustment;
pub mod config;
pub mod cost_engine;
pub mod disposal_engine;
pub mod error;
pub mod ledger;
pub mod movement_engine;
pub mod receiving;
pub mod reconciliation;
pub mod references;
pub mod stock_book;
pub mod stock_cache;
pub mod store;


pub use accounting_bridge::AccountingBridge;
pub use adjustment::{AdjustmentRecord, AdjustmentRequest};
pub use config::StockbookConfig;
pub use error::{EngineError, EngineResult, StoreError};
pub use movement_engine::{ConsumptionRecord, ConsumptionRequest, MovementRequest};
pub use receiving::{NewReceipt, NewReceiptLine, ReceiptPosting};
pub use reconciliation::{
    Discrepancy, DiscrepancyKind, ReconciliationReport, RepairStrategy, RepairSummary,
    ValuationSummary,
};
pub use stock_book::StockBook;
pub use stock_cache::CacheCorrection;
pub use store::{InMemoryStockStore, StockState, StockStore, StockView, UnitOfWork};
