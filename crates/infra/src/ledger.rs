//! Ledger service: the only write path onto the stock ledger.
//!
//! `record` validates an entry, appends it and applies its taxonomy effect to
//! the stock cache inside the caller's unit of work. `balance_of` replays the
//! ledger with the same effect function and is the single authoritative
//! computation reconciliation compares against.

use rust_decimal::Decimal;
use tracing::debug;

use stockbook_core::{DomainError, DomainResult, ItemId, LocationId};
use stockbook_inventory::{LedgerEntry, LedgerEntryDraft, replay_balance};

use crate::stock_cache;
use crate::store::{StockView, UnitOfWork};

/// Validate, append, and apply the entry's effect to the stock cache.
pub fn record(uow: &mut UnitOfWork<'_>, draft: LedgerEntryDraft) -> DomainResult<LedgerEntry> {
    check_references(uow, &draft)?;

    let entry = uow.append_ledger(draft).clone();
    stock_cache::apply_effect(uow, &entry)?;

    debug!(
        sequence = entry.sequence,
        item = %entry.item_id,
        kind = %entry.kind,
        quantity = %entry.quantity,
        reference = %entry.reference,
        "ledger entry recorded"
    );
    Ok(entry)
}

/// Validate and append without touching the cache.
///
/// Used by reconciliation when the ledger catches up with stock the cache
/// already shows.
pub fn record_observed(
    uow: &mut UnitOfWork<'_>,
    draft: LedgerEntryDraft,
) -> DomainResult<LedgerEntry> {
    check_references(uow, &draft)?;
    Ok(uow.append_ledger(draft).clone())
}

fn check_references(view: &impl StockView, draft: &LedgerEntryDraft) -> DomainResult<()> {
    draft.validate()?;
    if view.item(draft.item_id).is_none() {
        return Err(DomainError::not_found(format!("item {}", draft.item_id)));
    }
    for location in [draft.source_location, draft.destination_location]
        .into_iter()
        .flatten()
    {
        if view.location(location).is_none() {
            return Err(DomainError::not_found(format!("location {location}")));
        }
    }
    Ok(())
}

/// Net quantity of `item` from the ledger, in total or at one location.
pub fn balance_of(view: &impl StockView, item: ItemId, location: Option<LocationId>) -> Decimal {
    replay_balance(view.ledger_entries(), item, location)
}

pub fn entries_for(view: &impl StockView, item: ItemId) -> Vec<LedgerEntry> {
    view.ledger_entries()
        .into_iter()
        .filter(|e| e.item_id == item)
        .cloned()
        .collect()
}

pub fn entries_by_reference(view: &impl StockView, reference: &str) -> Vec<LedgerEntry> {
    view.ledger_entries()
        .into_iter()
        .filter(|e| e.reference == reference)
        .cloned()
        .collect()
}
