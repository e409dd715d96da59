//! Stock cache: per-location and global quantities derived from the ledger.
//!
//! The cache is never authoritative. It is written only through
//! [`apply_effect`] (driven by `ledger::record`), by explicit imports, and by
//! [`recompute`], which rebuilds it from a ledger replay.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use stockbook_core::{DomainError, DomainResult, ItemId, LocationId};
use stockbook_inventory::{LedgerEntry, StockCacheEntry, replay_balance, replay_distribution};

use crate::store::{StockView, UnitOfWork};

/// Cached quantity at one location; zero when never stocked there.
pub fn get(view: &impl StockView, item: ItemId, location: LocationId) -> Decimal {
    view.cache_entry(item, location)
        .map(|e| e.quantity)
        .unwrap_or(Decimal::ZERO)
}

/// Version of the cache row, 0 when it does not exist yet.
pub fn version(view: &impl StockView, item: ItemId, location: LocationId) -> u64 {
    view.cache_entry(item, location)
        .map(|e| e.version)
        .unwrap_or(0)
}

pub fn get_global(view: &impl StockView, item: ItemId) -> DomainResult<Decimal> {
    view.item(item)
        .map(|i| i.global_quantity())
        .ok_or_else(|| DomainError::not_found(format!("item {item}")))
}

/// Every cache row of the item, in location order.
pub fn distribution(view: &impl StockView, item: ItemId) -> Vec<StockCacheEntry> {
    view.cache_entries_for(item).into_iter().cloned().collect()
}

/// Shift the location cache only.
pub fn apply_delta(uow: &mut UnitOfWork<'_>, item: ItemId, location: LocationId, delta: Decimal) {
    let now = uow.now();
    uow.cache_entry_mut(item, location).apply_delta(delta, now);
}

/// Apply a recorded entry's taxonomy effect to global and location caches.
pub(crate) fn apply_effect(uow: &mut UnitOfWork<'_>, entry: &LedgerEntry) -> DomainResult<()> {
    let effect = entry.effect();
    let now = uow.now();
    if !effect.global_delta.is_zero() {
        uow.item_mut(entry.item_id)?
            .apply_global_delta(effect.global_delta, now);
    }
    if let Some((location, delta)) = effect.location_delta {
        apply_delta(uow, entry.item_id, location, delta);
    }
    Ok(())
}

/// One cache value overwritten by [`recompute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheCorrection {
    pub item_id: ItemId,
    /// `None` for the global quantity.
    pub location_id: Option<LocationId>,
    pub before: Decimal,
    pub after: Decimal,
}

/// Overwrite every cache value of `item` with the ledger replay.
///
/// Locations with cache rows but no ledger history are set to zero.
pub fn recompute(uow: &mut UnitOfWork<'_>, item: ItemId) -> DomainResult<Vec<CacheCorrection>> {
    let expected = replay_distribution(uow.ledger_entries(), item);
    let expected_global = replay_balance(uow.ledger_entries(), item, None);

    let locations: BTreeSet<LocationId> = uow
        .cache_entries_for(item)
        .into_iter()
        .map(|e| e.location_id)
        .chain(expected.keys().copied())
        .collect();

    let now = uow.now();
    let mut corrections = Vec::new();
    for location in locations {
        let before = get(uow, item, location);
        let after = expected.get(&location).copied().unwrap_or(Decimal::ZERO);
        if before != after {
            uow.cache_entry_mut(item, location).set_quantity(after, now);
            corrections.push(CacheCorrection {
                item_id: item,
                location_id: Some(location),
                before,
                after,
            });
        }
    }

    let before = get_global(uow, item)?;
    if before != expected_global {
        uow.item_mut(item)?.set_global_quantity(expected_global, now);
        corrections.push(CacheCorrection {
            item_id: item,
            location_id: None,
            before,
            after: expected_global,
        });
    }

    if !corrections.is_empty() {
        info!(item = %item, corrections = corrections.len(), "stock cache rebuilt from ledger");
    }
    Ok(corrections)
}
