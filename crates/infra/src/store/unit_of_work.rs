use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use stockbook_accounting::{Journal, JournalEntry, JournalEvent, PostingKey};
use stockbook_core::{
    DisposalId, DomainError, DomainResult, Entity, ItemId, LedgerEntryId, LocationId,
    MovementId, ReceiptId,
};
use stockbook_inventory::{
    DisposalRecord, Item, LedgerEntry, LedgerEntryDraft, Location, StockCacheEntry,
    StockMovement,
};
use stockbook_purchasing::PurchaseReceipt;

use super::{StockState, StockView};

/// Writes staged by a unit of work, applied to the state on success.
#[derive(Debug, Default)]
pub struct StagedChanges {
    pub(crate) items: BTreeMap<ItemId, Item>,
    pub(crate) locations: BTreeMap<LocationId, Location>,
    pub(crate) stock_cache: BTreeMap<(ItemId, LocationId), StockCacheEntry>,
    pub(crate) ledger_entries: Vec<LedgerEntry>,
    pub(crate) purchase_receipts: BTreeMap<ReceiptId, PurchaseReceipt>,
    pub(crate) stock_movements: BTreeMap<MovementId, StockMovement>,
    pub(crate) disposal_records: BTreeMap<DisposalId, DisposalRecord>,
    pub(crate) journal_events: Vec<JournalEvent>,
    pub(crate) sequences: BTreeMap<String, u64>,
}

impl StagedChanges {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self.locations.is_empty()
            && self.stock_cache.is_empty()
            && self.ledger_entries.is_empty()
            && self.purchase_receipts.is_empty()
            && self.stock_movements.is_empty()
            && self.disposal_records.is_empty()
            && self.journal_events.is_empty()
            && self.sequences.is_empty()
    }
}

/// One atomic operation over the stock book.
///
/// Reads see the committed state overlaid with everything staged so far.
/// Writes are copy-on-write: the first mutation of a record clones it from the
/// committed state into the staging area.
#[derive(Debug)]
pub struct UnitOfWork<'a> {
    base: &'a StockState,
    now: DateTime<Utc>,
    staged: StagedChanges,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(base: &'a StockState) -> Self {
        Self {
            base,
            now: Utc::now(),
            staged: StagedChanges::default(),
        }
    }

    pub(crate) fn into_staged(self) -> StagedChanges {
        self.staged
    }

    /// Timestamp shared by every write of this unit of work.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn insert_item(&mut self, item: Item) {
        self.staged.items.insert(item.id(), item);
    }

    pub fn insert_location(&mut self, location: Location) {
        self.staged.locations.insert(location.id(), location);
    }

    pub fn item_mut(&mut self, id: ItemId) -> DomainResult<&mut Item> {
        if !self.staged.items.contains_key(&id) {
            let item = self
                .base
                .items
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("item {id}")))?;
            self.staged.items.insert(id, item);
        }
        self.staged
            .items
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("item {id}")))
    }

    /// Cache entry for (item, location), created empty on first touch.
    pub fn cache_entry_mut(&mut self, item: ItemId, location: LocationId) -> &mut StockCacheEntry {
        let now = self.now;
        let base = self.base;
        self.staged
            .stock_cache
            .entry((item, location))
            .or_insert_with(|| {
                base.stock_cache
                    .get(&(item, location))
                    .cloned()
                    .unwrap_or_else(|| StockCacheEntry::empty(item, location, now))
            })
    }

    /// Append a ledger row; no cache effect.
    pub fn append_ledger(&mut self, draft: LedgerEntryDraft) -> &LedgerEntry {
        let sequence =
            (self.base.ledger_entries.len() + self.staged.ledger_entries.len()) as u64 + 1;
        let entry = draft.into_entry(LedgerEntryId::new(), sequence, self.now);
        self.staged.ledger_entries.push(entry);
        &self.staged.ledger_entries[self.staged.ledger_entries.len() - 1]
    }

    pub fn put_receipt(&mut self, receipt: PurchaseReceipt) {
        self.staged
            .purchase_receipts
            .insert(receipt.id_typed(), receipt);
    }

    pub fn put_movement(&mut self, movement: StockMovement) {
        self.staged
            .stock_movements
            .insert(movement.id_typed(), movement);
    }

    pub fn put_disposal(&mut self, record: DisposalRecord) {
        self.staged.disposal_records.insert(record.id, record);
    }

    pub fn stage_journal_event(&mut self, event: JournalEvent) {
        self.staged.journal_events.push(event);
    }

    /// Bump and return the sequence for a reference prefix.
    pub fn next_sequence(&mut self, prefix: &str) -> u64 {
        let next = self.last_sequence(prefix) + 1;
        self.staged.sequences.insert(prefix.to_string(), next);
        next
    }

    /// Entries appended by this unit of work so far.
    pub fn staged_ledger_entries(&self) -> &[LedgerEntry] {
        &self.staged.ledger_entries
    }
}

impl StockView for UnitOfWork<'_> {
    fn item(&self, id: ItemId) -> Option<&Item> {
        self.staged.items.get(&id).or_else(|| self.base.items.get(&id))
    }

    fn items(&self) -> Vec<&Item> {
        let mut merged: BTreeMap<ItemId, &Item> =
            self.base.items.iter().map(|(k, v)| (*k, v)).collect();
        merged.extend(self.staged.items.iter().map(|(k, v)| (*k, v)));
        merged.into_values().collect()
    }

    fn location(&self, id: LocationId) -> Option<&Location> {
        self.staged
            .locations
            .get(&id)
            .or_else(|| self.base.locations.get(&id))
    }

    fn locations(&self) -> Vec<&Location> {
        let mut merged: BTreeMap<LocationId, &Location> =
            self.base.locations.iter().map(|(k, v)| (*k, v)).collect();
        merged.extend(self.staged.locations.iter().map(|(k, v)| (*k, v)));
        merged.into_values().collect()
    }

    fn cache_entry(&self, item: ItemId, location: LocationId) -> Option<&StockCacheEntry> {
        self.staged
            .stock_cache
            .get(&(item, location))
            .or_else(|| self.base.stock_cache.get(&(item, location)))
    }

    fn cache_entries_for(&self, item: ItemId) -> Vec<&StockCacheEntry> {
        let range = (item, LocationId::MIN)..=(item, LocationId::MAX);
        let mut merged: BTreeMap<LocationId, &StockCacheEntry> = self
            .base
            .stock_cache
            .range(range.clone())
            .map(|((_, loc), e)| (*loc, e))
            .collect();
        merged.extend(
            self.staged
                .stock_cache
                .range(range)
                .map(|((_, loc), e)| (*loc, e)),
        );
        merged.into_values().collect()
    }

    fn ledger_entries(&self) -> Vec<&LedgerEntry> {
        self.base
            .ledger_entries
            .iter()
            .chain(self.staged.ledger_entries.iter())
            .collect()
    }

    fn receipt(&self, id: ReceiptId) -> Option<&PurchaseReceipt> {
        self.staged
            .purchase_receipts
            .get(&id)
            .or_else(|| self.base.purchase_receipts.get(&id))
    }

    fn movement(&self, id: MovementId) -> Option<&StockMovement> {
        self.staged
            .stock_movements
            .get(&id)
            .or_else(|| self.base.stock_movements.get(&id))
    }

    fn disposal(&self, id: DisposalId) -> Option<&DisposalRecord> {
        self.staged
            .disposal_records
            .get(&id)
            .or_else(|| self.base.disposal_records.get(&id))
    }

    /// The committed journal; entries staged in this unit of work are reached
    /// through [`StockView::journal_entry`].
    fn journal(&self) -> &Journal {
        &self.base.journal
    }

    fn journal_entry(&self, key: &PostingKey) -> Option<&JournalEntry> {
        self.base.journal.find(key).or_else(|| {
            self.staged.journal_events.iter().find_map(|event| match event {
                JournalEvent::JournalEntryPosted(e) if &e.entry.key == key => Some(&e.entry),
                _ => None,
            })
        })
    }

    fn journal_entries(&self) -> Vec<&JournalEntry> {
        self.base
            .journal
            .entries()
            .iter()
            .chain(self.staged.journal_events.iter().map(|event| match event {
                JournalEvent::JournalEntryPosted(e) => &e.entry,
            }))
            .collect()
    }

    fn last_sequence(&self, prefix: &str) -> u64 {
        self.staged
            .sequences
            .get(prefix)
            .copied()
            .unwrap_or_else(|| self.base.last_sequence(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockbook_core::ActorId;
    use stockbook_inventory::{LocationKind, TransactionKind};

    fn seeded() -> (StockState, ItemId, LocationId) {
        let mut state = StockState::new();
        let item = Item::new(ItemId::new(), "SOAP", "Soap bar", "pcs");
        let location = Location::new(LocationId::new(), "Main warehouse", LocationKind::Warehouse);
        let (item_id, location_id) = (item.id(), location.id());
        state.items.insert(item_id, item);
        state.locations.insert(location_id, location);
        (state, item_id, location_id)
    }

    #[test]
    fn staged_writes_are_visible_inside_but_not_committed() {
        let (state, item, loc) = seeded();
        let mut uow = UnitOfWork::new(&state);
        uow.cache_entry_mut(item, loc).apply_delta(dec!(5), Utc::now());
        uow.item_mut(item).unwrap().apply_global_delta(dec!(5), Utc::now());

        assert_eq!(uow.cache_entry(item, loc).unwrap().quantity, dec!(5));
        assert_eq!(uow.item(item).unwrap().global_quantity(), dec!(5));
        assert!(state.cache_entry(item, loc).is_none());
        assert_eq!(state.item(item).unwrap().global_quantity(), dec!(0));
    }

    #[test]
    fn applying_staged_changes_commits_them() {
        let (mut state, item, loc) = seeded();
        let staged = {
            let mut uow = UnitOfWork::new(&state);
            let draft = LedgerEntryDraft::new(
                item,
                TransactionKind::Receipt,
                dec!(3),
                dec!(2),
                "PR-000001",
                ActorId::new(),
            )
            .at(loc);
            assert_eq!(uow.append_ledger(draft).sequence, 1);
            assert_eq!(uow.next_sequence("PR"), 1);
            assert_eq!(uow.next_sequence("PR"), 2);
            uow.into_staged()
        };
        state.apply(staged);
        assert_eq!(state.ledger_entries.len(), 1);
        assert_eq!(state.last_sequence("PR"), 2);
        assert!(state.check_integrity().is_ok());
    }

    #[test]
    fn missing_item_is_not_found() {
        let state = StockState::new();
        let mut uow = UnitOfWork::new(&state);
        assert!(matches!(
            uow.item_mut(ItemId::new()),
            Err(DomainError::NotFound(_))
        ));
        assert!(uow.into_staged().is_empty());
    }
}
