//! State store and unit of work.
//!
//! The whole stock book (catalog, cache, ledger, documents, journal and
//! reference sequences) lives in one [`StockState`]. Engines never touch it
//! directly: every mutating operation runs as a closure over a
//! [`UnitOfWork`], which stages writes on top of the committed state.
//!
//! ## Atomicity
//!
//! [`StockStore::transact`] runs the closure under the store's writer lock and
//! applies the staged changes only when the closure returns `Ok`. Any error
//! discards everything the closure staged: ledger entries, cache deltas, cost
//! updates, journal entries and reference sequence bumps. Stock, cost and
//! journal effects therefore commit together or not at all.
//!
//! ## Reads
//!
//! [`StockStore::read`] runs a closure against the committed state under the
//! reader lock, giving a consistent snapshot. Both [`StockState`] and
//! [`UnitOfWork`] implement [`StockView`], so read-side logic (replay,
//! availability, reconciliation) is written once and works inside or outside a
//! unit of work.

mod in_memory;
mod state;
mod unit_of_work;

use std::sync::Arc;

use stockbook_accounting::{Journal, JournalEntry, PostingKey};
use stockbook_core::{DisposalId, ItemId, LocationId, MovementId, ReceiptId};
use stockbook_inventory::{
    DisposalRecord, Item, LedgerEntry, Location, StockCacheEntry, StockMovement,
};
use stockbook_purchasing::PurchaseReceipt;

pub use in_memory::InMemoryStockStore;
pub use state::StockState;
pub use unit_of_work::{StagedChanges, UnitOfWork};

use crate::error::StoreError;

/// Read access to a stock book, committed or staged.
pub trait StockView {
    fn item(&self, id: ItemId) -> Option<&Item>;

    /// All items in id order (creation order for v7 ids).
    fn items(&self) -> Vec<&Item>;

    fn location(&self, id: LocationId) -> Option<&Location>;

    /// All locations in id order.
    fn locations(&self) -> Vec<&Location>;

    fn cache_entry(&self, item: ItemId, location: LocationId) -> Option<&StockCacheEntry>;

    fn cache_entries_for(&self, item: ItemId) -> Vec<&StockCacheEntry>;

    /// Ledger entries in append order.
    fn ledger_entries(&self) -> Vec<&LedgerEntry>;

    fn receipt(&self, id: ReceiptId) -> Option<&PurchaseReceipt>;

    fn movement(&self, id: MovementId) -> Option<&StockMovement>;

    fn disposal(&self, id: DisposalId) -> Option<&DisposalRecord>;

    fn journal(&self) -> &Journal;

    fn journal_entry(&self, key: &PostingKey) -> Option<&JournalEntry>;

    fn journal_entries(&self) -> Vec<&JournalEntry>;

    /// Last value handed out for a reference prefix (0 if none).
    fn last_sequence(&self, prefix: &str) -> u64;
}

/// Transactional state store.
pub trait StockStore: Send + Sync {
    /// Run `f` against a consistent snapshot of the committed state.
    fn read<R>(&self, f: impl FnOnce(&StockState) -> R) -> Result<R, StoreError>;

    /// Run `f` as one unit of work under the writer lock.
    ///
    /// Staged changes are applied only if `f` returns `Ok`.
    fn transact<R, E>(
        &self,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore,
{
    fn read<R>(&self, f: impl FnOnce(&StockState) -> R) -> Result<R, StoreError> {
        (**self).read(f)
    }

    fn transact<R, E>(
        &self,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        (**self).transact(f)
    }
}
