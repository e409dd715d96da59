use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, Entity, ItemId, LocationId};

/// Behavioural flags of a stock-keeping unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFlags {
    pub perishable: bool,
    pub serialized: bool,
    pub fixed_asset: bool,
}

/// A stock-keeping unit.
///
/// `global_quantity` is a denormalized cache of total owned stock; the ledger
/// is the system of record. Only the engines and the reconciliation service
/// change it, through the methods below (each bumps `version`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    sku: String,
    name: String,
    unit: String,
    unit_cost: Decimal,
    global_quantity: Decimal,
    min_stock: Decimal,
    max_stock: Option<Decimal>,
    flags: ItemFlags,
    active: bool,
    version: u64,
    updated_at: DateTime<Utc>,
}

impl Item {
    pub fn new(
        id: ItemId,
        sku: impl Into<String>,
        name: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sku: sku.into(),
            name: name.into(),
            unit: unit.into(),
            unit_cost: Decimal::ZERO,
            global_quantity: Decimal::ZERO,
            min_stock: Decimal::ZERO,
            max_stock: None,
            flags: ItemFlags::default(),
            active: true,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Opening unit cost (catalog setup only).
    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn with_thresholds(mut self, min_stock: Decimal, max_stock: Option<Decimal>) -> Self {
        self.min_stock = min_stock;
        self.max_stock = max_stock;
        self
    }

    pub fn with_flags(mut self, flags: ItemFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Catalog-level validation, run when an item is seeded.
    pub fn validate(&self) -> DomainResult<()> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        if self.min_stock < Decimal::ZERO {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }
        if let Some(max) = self.max_stock {
            if max < self.min_stock {
                return Err(DomainError::validation(
                    "maximum stock cannot be below minimum stock",
                ));
            }
        }
        Ok(())
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn global_quantity(&self) -> Decimal {
        self.global_quantity
    }

    pub fn min_stock(&self) -> Decimal {
        self.min_stock
    }

    pub fn max_stock(&self) -> Option<Decimal> {
        self.max_stock
    }

    pub fn flags(&self) -> ItemFlags {
        self.flags
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_below_minimum(&self) -> bool {
        self.global_quantity < self.min_stock
    }

    pub fn is_above_maximum(&self) -> bool {
        self.max_stock.is_some_and(|max| self.global_quantity > max)
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::invariant(format!(
                "item {} ({}) is deactivated",
                self.id, self.sku
            )));
        }
        Ok(())
    }

    pub fn apply_global_delta(&mut self, delta: Decimal, at: DateTime<Utc>) {
        self.global_quantity += delta;
        self.touch(at);
    }

    pub fn set_global_quantity(&mut self, quantity: Decimal, at: DateTime<Utc>) {
        self.global_quantity = quantity;
        self.touch(at);
    }

    pub fn set_unit_cost(&mut self, unit_cost: Decimal, at: DateTime<Utc>) {
        self.unit_cost = unit_cost;
        self.touch(at);
    }

    /// Soft-deactivate; items referenced by ledger entries are never deleted.
    pub fn deactivate(&mut self, at: DateTime<Utc>) {
        self.active = false;
        self.touch(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> ItemId {
        self.id
    }
}

/// Location type tag; controls default routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Warehouse,
    GuestRoom,
    Kitchen,
    Laundry,
    Store,
    Other,
}

/// A place stock can physically reside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    id: LocationId,
    name: String,
    kind: LocationKind,
    active: bool,
}

impl Location {
    pub fn new(id: LocationId, name: impl Into<String>, kind: LocationKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            active: true,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("location name cannot be empty"));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_warehouse(&self) -> bool {
        self.kind == LocationKind::Warehouse
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::invariant(format!(
                "location {} ({}) is deactivated",
                self.id, self.name
            )));
        }
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> LocationId {
        self.id
    }
}

/// Cached quantity of one item at one location.
///
/// Created on the first movement into a location. Never authoritative: the
/// reconciliation service compares it against the ledger replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCacheEntry {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub quantity: Decimal,
    /// Incremented on every write; validated before commit by the movement engine.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl StockCacheEntry {
    pub fn empty(item_id: ItemId, location_id: LocationId, at: DateTime<Utc>) -> Self {
        Self {
            item_id,
            location_id,
            quantity: Decimal::ZERO,
            version: 0,
            updated_at: at,
        }
    }

    pub fn apply_delta(&mut self, delta: Decimal, at: DateTime<Utc>) {
        self.quantity += delta;
        self.version += 1;
        self.updated_at = at;
    }

    pub fn set_quantity(&mut self, quantity: Decimal, at: DateTime<Utc>) {
        self.quantity = quantity;
        self.version += 1;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn towel() -> Item {
        Item::new(ItemId::new(), "TWL-01", "Bath towel", "pcs")
    }

    #[test]
    fn new_item_starts_empty_and_active() {
        let item = towel();
        assert_eq!(item.global_quantity(), Decimal::ZERO);
        assert_eq!(item.unit_cost(), Decimal::ZERO);
        assert!(item.is_active());
        assert_eq!(item.version(), 0);
    }

    #[test]
    fn mutations_bump_version() {
        let mut item = towel();
        let now = Utc::now();
        item.apply_global_delta(dec!(5), now);
        item.set_unit_cost(dec!(12.50), now);
        assert_eq!(item.global_quantity(), dec!(5));
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn thresholds_drive_low_and_over_stock() {
        let mut item = towel().with_thresholds(dec!(10), Some(dec!(100)));
        assert!(item.is_below_minimum());
        item.set_global_quantity(dec!(150), Utc::now());
        assert!(!item.is_below_minimum());
        assert!(item.is_above_maximum());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let item = towel().with_thresholds(dec!(10), Some(dec!(5)));
        assert!(matches!(item.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn deactivated_item_fails_ensure_active() {
        let mut item = towel();
        item.deactivate(Utc::now());
        assert!(matches!(
            item.ensure_active(),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn cache_entry_versions_every_write() {
        let now = Utc::now();
        let mut entry = StockCacheEntry::empty(ItemId::new(), LocationId::new(), now);
        entry.apply_delta(dec!(3), now);
        entry.apply_delta(dec!(-1), now);
        assert_eq!(entry.quantity, dec!(2));
        assert_eq!(entry.version, 2);
    }
}
