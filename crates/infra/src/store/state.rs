use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockbook_accounting::{Journal, JournalEntry, PostingKey};
use stockbook_core::{Aggregate, DisposalId, ItemId, LocationId, MovementId, ReceiptId};
use stockbook_inventory::{
    DisposalRecord, Item, LedgerEntry, Location, StockCacheEntry, StockMovement,
};
use stockbook_purchasing::PurchaseReceipt;

use super::StockView;
use super::unit_of_work::StagedChanges;

/// The complete persisted stock book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockState {
    pub(crate) items: BTreeMap<ItemId, Item>,
    pub(crate) locations: BTreeMap<LocationId, Location>,
    #[serde(with = "cache_as_list")]
    pub(crate) stock_cache: BTreeMap<(ItemId, LocationId), StockCacheEntry>,
    pub(crate) ledger_entries: Vec<LedgerEntry>,
    pub(crate) purchase_receipts: BTreeMap<ReceiptId, PurchaseReceipt>,
    pub(crate) stock_movements: BTreeMap<MovementId, StockMovement>,
    pub(crate) disposal_records: BTreeMap<DisposalId, DisposalRecord>,
    #[serde(rename = "journal_entries")]
    pub(crate) journal: Journal,
    pub(crate) sequences: BTreeMap<String, u64>,
}

impl StockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply changes staged by a successful unit of work.
    pub(crate) fn apply(&mut self, changes: StagedChanges) {
        self.items.extend(changes.items);
        self.locations.extend(changes.locations);
        self.stock_cache.extend(changes.stock_cache);
        self.ledger_entries.extend(changes.ledger_entries);
        self.purchase_receipts.extend(changes.purchase_receipts);
        self.stock_movements.extend(changes.stock_movements);
        self.disposal_records.extend(changes.disposal_records);
        for event in &changes.journal_events {
            self.journal.apply(event);
        }
        self.sequences.extend(changes.sequences);
    }

    /// Structural checks run after loading a snapshot.
    pub(crate) fn check_integrity(&self) -> Result<(), String> {
        for (i, entry) in self.ledger_entries.iter().enumerate() {
            if entry.sequence != (i as u64) + 1 {
                return Err(format!(
                    "ledger entry {} has sequence {}, expected {}",
                    entry.id,
                    entry.sequence,
                    i + 1
                ));
            }
            if !self.items.contains_key(&entry.item_id) {
                return Err(format!(
                    "ledger entry {} references unknown item {}",
                    entry.id, entry.item_id
                ));
            }
            // Replay could never attribute it to a location cache.
            if entry.location().is_none() {
                return Err(format!(
                    "ledger entry {} ({}) touches no location",
                    entry.id, entry.reference
                ));
            }
        }
        for (item_id, location_id) in self.stock_cache.keys() {
            if !self.items.contains_key(item_id) || !self.locations.contains_key(location_id) {
                return Err(format!(
                    "cache entry ({item_id}, {location_id}) references unknown item or location"
                ));
            }
        }
        Ok(())
    }
}

impl StockView for StockState {
    fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    fn items(&self) -> Vec<&Item> {
        self.items.values().collect()
    }

    fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(&id)
    }

    fn locations(&self) -> Vec<&Location> {
        self.locations.values().collect()
    }

    fn cache_entry(&self, item: ItemId, location: LocationId) -> Option<&StockCacheEntry> {
        self.stock_cache.get(&(item, location))
    }

    fn cache_entries_for(&self, item: ItemId) -> Vec<&StockCacheEntry> {
        self.stock_cache
            .range((item, LocationId::MIN)..=(item, LocationId::MAX))
            .map(|(_, e)| e)
            .collect()
    }

    fn ledger_entries(&self) -> Vec<&LedgerEntry> {
        self.ledger_entries.iter().collect()
    }

    fn receipt(&self, id: ReceiptId) -> Option<&PurchaseReceipt> {
        self.purchase_receipts.get(&id)
    }

    fn movement(&self, id: MovementId) -> Option<&StockMovement> {
        self.stock_movements.get(&id)
    }

    fn disposal(&self, id: DisposalId) -> Option<&DisposalRecord> {
        self.disposal_records.get(&id)
    }

    fn journal(&self) -> &Journal {
        &self.journal
    }

    fn journal_entry(&self, key: &PostingKey) -> Option<&JournalEntry> {
        self.journal.find(key)
    }

    fn journal_entries(&self) -> Vec<&JournalEntry> {
        self.journal.entries().iter().collect()
    }

    fn last_sequence(&self, prefix: &str) -> u64 {
        self.sequences.get(prefix).copied().unwrap_or(0)
    }
}

/// JSON maps need string keys; the cache is written as a list of entries.
mod cache_as_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use stockbook_core::{ItemId, LocationId};
    use stockbook_inventory::StockCacheEntry;

    pub fn serialize<S>(
        cache: &BTreeMap<(ItemId, LocationId), StockCacheEntry>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries: Vec<&StockCacheEntry> = cache.values().collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<(ItemId, LocationId), StockCacheEntry>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<StockCacheEntry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|e| ((e.item_id, e.location_id), e))
            .collect())
    }
}
