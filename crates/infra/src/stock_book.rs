//! Application facade over the stock store.
//!
//! `StockBook` composes a [`StockStore`], a chart of accounts (through the
//! [`AccountingBridge`]) and the loaded [`StockbookConfig`]. Each mutating
//! operation runs as exactly one unit of work:
//!
//! ```text
//! operation(request, actor)
//!   ↓
//! 1. store.transact(|uow| ...)       writer lock, staged writes
//!   ↓
//! 2. validate against the staged view (items, locations, availability)
//!   ↓
//! 3. allocate reference code         sequence bump, staged
//!   ↓
//! 4. cost engine → ledger::record    cache effects, staged
//!   ↓
//! 5. accounting bridge               journal posting, staged
//!   ↓
//! 6. Ok → staged changes applied | Err → everything discarded
//! ```
//!
//! The engines live in their own modules (`receiving`, `movement_engine`,
//! `disposal_engine`, `adjustment`, `reconciliation`) as further `impl`
//! blocks on this type. This module holds construction, catalog seeding and
//! the read-side queries.

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use stockbook_accounting::{JournalEntry, PostingKey};
use stockbook_core::{
    DisposalId, DomainError, DomainResult, Entity, ItemId, LocationId, MovementId, ReceiptId,
};
use stockbook_inventory::{DisposalRecord, Item, LedgerEntry, Location, StockCacheEntry, StockMovement};
use stockbook_purchasing::PurchaseReceipt;

use crate::accounting_bridge::AccountingBridge;
use crate::config::StockbookConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::{StockStore, StockView, UnitOfWork};
use crate::{ledger, stock_cache};

/// The stock ledger and reconciliation engine.
#[derive(Debug)]
pub struct StockBook<S, C> {
    pub(crate) store: S,
    pub(crate) bridge: AccountingBridge<C>,
    pub(crate) config: StockbookConfig,
}

impl<S, C> StockBook<S, C> {
    pub fn new(store: S, chart: C, config: StockbookConfig) -> Self {
        Self {
            store,
            bridge: AccountingBridge::new(chart),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &StockbookConfig {
        &self.config
    }
}

/// Look up an item that exists and is active.
pub(crate) fn active_item<'v>(view: &'v impl StockView, id: ItemId) -> DomainResult<&'v Item> {
    let item = view
        .item(id)
        .ok_or_else(|| DomainError::not_found(format!("item {id}")))?;
    item.ensure_active()?;
    Ok(item)
}

/// Look up a location that exists and is active.
pub(crate) fn active_location<'v>(
    view: &'v impl StockView,
    id: LocationId,
) -> DomainResult<&'v Location> {
    let location = view
        .location(id)
        .ok_or_else(|| DomainError::not_found(format!("location {id}")))?;
    location.ensure_active()?;
    Ok(location)
}

/// Fail with `InsufficientStock` unless `location` holds `quantity` of `item`.
pub(crate) fn ensure_available(
    view: &impl StockView,
    item: ItemId,
    location: LocationId,
    quantity: Decimal,
) -> DomainResult<()> {
    let available = stock_cache::get(view, item, location);
    if available < quantity {
        return Err(DomainError::insufficient_stock(
            item, location, quantity, available,
        ));
    }
    Ok(())
}

impl<S, C> StockBook<S, C>
where
    S: StockStore,
{
    /// Add an item to the catalog.
    #[instrument(skip(self, item), fields(item = %item.id(), sku = %item.sku()), err)]
    pub fn seed_item(&self, item: Item) -> EngineResult<ItemId> {
        item.validate()?;
        self.store.transact(|uow| {
            let id = item.id();
            if uow.item(id).is_some() {
                return Err(DomainError::conflict(format!("item {id} already exists")).into());
            }
            if uow.items().iter().any(|i| i.sku() == item.sku()) {
                return Err(
                    DomainError::conflict(format!("sku {} already in use", item.sku())).into(),
                );
            }
            uow.insert_item(item);
            Ok(id)
        })
    }

    #[instrument(skip(self, location), fields(location = %location.id(), name = %location.name()), err)]
    pub fn seed_location(&self, location: Location) -> EngineResult<LocationId> {
        location.validate()?;
        self.store.transact(|uow| {
            let id = location.id();
            if uow.location(id).is_some() {
                return Err(DomainError::conflict(format!("location {id} already exists")).into());
            }
            uow.insert_location(location);
            Ok(id)
        })
    }

    /// Soft-deactivate an item; its ledger history stays.
    #[instrument(skip(self), err)]
    pub fn deactivate_item(&self, item: ItemId) -> EngineResult<()> {
        self.store.transact(|uow| {
            let now = uow.now();
            uow.item_mut(item)?.deactivate(now);
            info!(item = %item, "item deactivated");
            Ok::<_, EngineError>(())
        })
    }

    #[instrument(skip(self), err)]
    pub fn deactivate_location(&self, location: LocationId) -> EngineResult<()> {
        self.store.transact(|uow| {
            let mut updated = uow
                .location(location)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("location {location}")))?;
            updated.deactivate();
            uow.insert_location(updated);
            info!(location = %location, "location deactivated");
            Ok::<_, EngineError>(())
        })
    }

    /// Overwrite one cache row without a ledger entry.
    ///
    /// Loads legacy balances; anything written here shows up as drift in the
    /// next reconciliation.
    #[instrument(skip(self), err)]
    pub fn import_cache_entry(
        &self,
        item: ItemId,
        location: LocationId,
        quantity: Decimal,
    ) -> EngineResult<()> {
        self.store.transact(|uow| {
            if uow.item(item).is_none() {
                return Err(DomainError::not_found(format!("item {item}")).into());
            }
            if uow.location(location).is_none() {
                return Err(DomainError::not_found(format!("location {location}")).into());
            }
            let now = uow.now();
            uow.cache_entry_mut(item, location).set_quantity(quantity, now);
            warn!(item = %item, location = %location, quantity = %quantity, "cache entry imported");
            Ok(())
        })
    }

    pub fn item(&self, id: ItemId) -> EngineResult<Item> {
        self.query(|s| {
            s.item(id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("item {id}")))
        })
    }

    pub fn items(&self) -> EngineResult<Vec<Item>> {
        Ok(self
            .store
            .read(|s| s.items().into_iter().cloned().collect())?)
    }

    pub fn location(&self, id: LocationId) -> EngineResult<Location> {
        self.query(|s| {
            s.location(id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("location {id}")))
        })
    }

    pub fn locations(&self) -> EngineResult<Vec<Location>> {
        Ok(self
            .store
            .read(|s| s.locations().into_iter().cloned().collect())?)
    }

    /// Ledger replay for the item, in total or at one location.
    pub fn balance_of(&self, item: ItemId, location: Option<LocationId>) -> EngineResult<Decimal> {
        self.query(|s| {
            if s.item(item).is_none() {
                return Err(DomainError::not_found(format!("item {item}")));
            }
            Ok(ledger::balance_of(s, item, location))
        })
    }

    /// Cached quantity at one location.
    pub fn stock_at(&self, item: ItemId, location: LocationId) -> EngineResult<Decimal> {
        Ok(self.store.read(|s| stock_cache::get(s, item, location))?)
    }

    pub fn global_quantity(&self, item: ItemId) -> EngineResult<Decimal> {
        self.query(|s| stock_cache::get_global(s, item))
    }

    pub fn distribution(&self, item: ItemId) -> EngineResult<Vec<StockCacheEntry>> {
        Ok(self.store.read(|s| stock_cache::distribution(s, item))?)
    }

    pub fn entries_for(&self, item: ItemId) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.store.read(|s| ledger::entries_for(s, item))?)
    }

    pub fn entries_by_reference(&self, reference: &str) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self
            .store
            .read(|s| ledger::entries_by_reference(s, reference))?)
    }

    pub fn ledger_len(&self) -> EngineResult<usize> {
        Ok(self.store.read(|s| s.ledger_entries().len())?)
    }

    pub fn journal_entries(&self) -> EngineResult<Vec<JournalEntry>> {
        Ok(self
            .store
            .read(|s| s.journal_entries().into_iter().cloned().collect())?)
    }

    pub fn journal_entry(&self, key: &PostingKey) -> EngineResult<Option<JournalEntry>> {
        Ok(self.store.read(|s| s.journal_entry(key).cloned())?)
    }

    pub fn receipt(&self, id: ReceiptId) -> EngineResult<PurchaseReceipt> {
        self.query(|s| {
            s.receipt(id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("purchase receipt {id}")))
        })
    }

    pub fn movement(&self, id: MovementId) -> EngineResult<StockMovement> {
        self.query(|s| {
            s.movement(id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("movement {id}")))
        })
    }

    pub fn disposal(&self, id: DisposalId) -> EngineResult<DisposalRecord> {
        self.query(|s| {
            s.disposal(id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("disposal {id}")))
        })
    }

    /// Last reference sequence handed out for a prefix.
    pub fn last_sequence(&self, prefix: &str) -> EngineResult<u64> {
        Ok(self.store.read(|s| s.last_sequence(prefix))?)
    }

    /// Rebuild the item's caches from the ledger.
    #[instrument(skip(self), err)]
    pub fn recompute(&self, item: ItemId) -> EngineResult<Vec<stock_cache::CacheCorrection>> {
        self.store.transact(|uow| Ok(stock_cache::recompute(uow, item)?))
    }

    fn query<R>(&self, f: impl FnOnce(&crate::store::StockState) -> DomainResult<R>) -> EngineResult<R> {
        Ok(self.store.read(f)??)
    }

    /// Run `f` as one unit of work, mapping domain errors.
    pub(crate) fn transact<R>(
        &self,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> DomainResult<R>,
    ) -> EngineResult<R> {
        self.store
            .transact(|uow| f(uow).map_err(EngineError::from))
    }
}
