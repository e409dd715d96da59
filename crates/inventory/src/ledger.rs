//! Stock ledger: the append-only record of every stock-affecting event.
//!
//! The transaction-kind taxonomy lives here as a closed enum, and
//! [`stock_effect`] is the one function that maps an entry onto the global
//! quantity and the per-location caches. Both the write path (engines) and
//! the replay path (reconciliation) go through it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    ActorId, DomainError, DomainResult, ItemId, LedgerEntryId, LocationId, ensure_positive,
    value_of,
};

/// Direction of a manual or reconciliation adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentDirection {
    Increase,
    Decrease,
}

impl AdjustmentDirection {
    /// Direction and magnitude of a signed delta; `None` for zero.
    pub fn from_delta(delta: Decimal) -> Option<(Self, Decimal)> {
        if delta > Decimal::ZERO {
            Some((AdjustmentDirection::Increase, delta))
        } else if delta < Decimal::ZERO {
            Some((AdjustmentDirection::Decrease, -delta))
        } else {
            None
        }
    }

    pub fn sign(self) -> Decimal {
        match self {
            AdjustmentDirection::Increase => Decimal::ONE,
            AdjustmentDirection::Decrease => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Transaction kind (mutually exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Receipt,
    Consumption,
    TransferOut,
    TransferIn,
    Adjustment(AdjustmentDirection),
    Disposal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Receipt => "receipt",
            TransactionKind::Consumption => "consumption",
            TransactionKind::TransferOut => "transfer_out",
            TransactionKind::TransferIn => "transfer_in",
            TransactionKind::Adjustment(AdjustmentDirection::Increase) => "adjustment_increase",
            TransactionKind::Adjustment(AdjustmentDirection::Decrease) => "adjustment_decrease",
            TransactionKind::Disposal => "disposal",
        }
    }

    /// Which location field an entry of this kind must carry.
    pub fn location_role(&self) -> LocationRole {
        match self {
            TransactionKind::Receipt | TransactionKind::TransferIn => LocationRole::Destination,
            TransactionKind::Adjustment(AdjustmentDirection::Increase) => LocationRole::Destination,
            TransactionKind::Consumption
            | TransactionKind::TransferOut
            | TransactionKind::Disposal
            | TransactionKind::Adjustment(AdjustmentDirection::Decrease) => LocationRole::Source,
        }
    }

    /// Signed effect of one unit on the global (total owned) quantity.
    ///
    /// Transfers move stock between places without changing what is owned,
    /// so both halves of a transfer pair are neutral here.
    fn global_sign(&self) -> Decimal {
        match self {
            TransactionKind::Receipt => Decimal::ONE,
            TransactionKind::Consumption | TransactionKind::Disposal => Decimal::NEGATIVE_ONE,
            TransactionKind::TransferOut | TransactionKind::TransferIn => Decimal::ZERO,
            TransactionKind::Adjustment(direction) => direction.sign(),
        }
    }

    /// Signed effect of one unit on the cache of the location the entry carries.
    fn location_sign(&self) -> Decimal {
        match self.location_role() {
            LocationRole::Destination => Decimal::ONE,
            LocationRole::Source => Decimal::NEGATIVE_ONE,
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationRole {
    Source,
    Destination,
}

/// Effect of one ledger entry on the stock cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockEffect {
    pub global_delta: Decimal,
    pub location_delta: Option<(LocationId, Decimal)>,
}

/// The taxonomy-to-effect mapping.
///
/// An entry without the location its kind requires only affects the global
/// quantity; `LedgerEntryDraft::validate` never lets such an entry be
/// recorded, but legacy snapshots may contain one.
pub fn stock_effect(
    kind: TransactionKind,
    quantity: Decimal,
    source: Option<LocationId>,
    destination: Option<LocationId>,
) -> StockEffect {
    let location = match kind.location_role() {
        LocationRole::Source => source,
        LocationRole::Destination => destination,
    };
    StockEffect {
        global_delta: kind.global_sign() * quantity,
        location_delta: location.map(|loc| (loc, kind.location_sign() * quantity)),
    }
}

/// Immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    /// Position in the store-wide append order.
    pub sequence: u64,
    pub item_id: ItemId,
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub source_location: Option<LocationId>,
    pub destination_location: Option<LocationId>,
    pub unit_cost: Decimal,
    pub total_value: Decimal,
    pub reference: String,
    pub note: Option<String>,
    pub actor: ActorId,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn effect(&self) -> StockEffect {
        stock_effect(
            self.kind,
            self.quantity,
            self.source_location,
            self.destination_location,
        )
    }

    /// The location whose cache this entry touches.
    pub fn location(&self) -> Option<LocationId> {
        self.effect().location_delta.map(|(loc, _)| loc)
    }
}

/// A ledger entry as requested by an engine, before it is assigned an id and
/// sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryDraft {
    pub item_id: ItemId,
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub source_location: Option<LocationId>,
    pub destination_location: Option<LocationId>,
    pub unit_cost: Decimal,
    pub reference: String,
    pub note: Option<String>,
    pub actor: ActorId,
}

impl LedgerEntryDraft {
    pub fn new(
        item_id: ItemId,
        kind: TransactionKind,
        quantity: Decimal,
        unit_cost: Decimal,
        reference: impl Into<String>,
        actor: ActorId,
    ) -> Self {
        Self {
            item_id,
            kind,
            quantity,
            source_location: None,
            destination_location: None,
            unit_cost,
            reference: reference.into(),
            note: None,
            actor,
        }
    }

    pub fn from_location(mut self, location: LocationId) -> Self {
        self.source_location = Some(location);
        self
    }

    pub fn to_location(mut self, location: LocationId) -> Self {
        self.destination_location = Some(location);
        self
    }

    /// Attach the location in the role the kind requires.
    pub fn at(self, location: LocationId) -> Self {
        match self.kind.location_role() {
            LocationRole::Source => self.from_location(location),
            LocationRole::Destination => self.to_location(location),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Shape validation; referential checks (item/location exist) happen in
    /// the store, inside the same unit of work.
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity, "ledger quantity")?;
        if self.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        if self.reference.trim().is_empty() {
            return Err(DomainError::validation("ledger entry requires a reference"));
        }
        let required = match self.kind.location_role() {
            LocationRole::Source => self.source_location,
            LocationRole::Destination => self.destination_location,
        };
        if required.is_none() {
            return Err(DomainError::validation(format!(
                "{} entry requires a {} location",
                self.kind,
                match self.kind.location_role() {
                    LocationRole::Source => "source",
                    LocationRole::Destination => "destination",
                }
            )));
        }
        Ok(())
    }

    pub fn into_entry(
        self,
        id: LedgerEntryId,
        sequence: u64,
        recorded_at: DateTime<Utc>,
    ) -> LedgerEntry {
        LedgerEntry {
            id,
            sequence,
            item_id: self.item_id,
            kind: self.kind,
            total_value: value_of(self.quantity, self.unit_cost),
            quantity: self.quantity,
            source_location: self.source_location,
            destination_location: self.destination_location,
            unit_cost: self.unit_cost,
            reference: self.reference,
            note: self.note,
            actor: self.actor,
            recorded_at,
        }
    }
}

/// Replay entries for `item` and return the net quantity.
///
/// With `location = None` this is the total owned quantity; with a location it
/// is the quantity that should sit there.
pub fn replay_balance<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    item: ItemId,
    location: Option<LocationId>,
) -> Decimal {
    entries
        .into_iter()
        .filter(|e| e.item_id == item)
        .map(|e| {
            let effect = e.effect();
            match location {
                None => effect.global_delta,
                Some(wanted) => match effect.location_delta {
                    Some((loc, delta)) if loc == wanted => delta,
                    _ => Decimal::ZERO,
                },
            }
        })
        .sum()
}

/// Replay entries for `item` into a per-location breakdown.
pub fn replay_distribution<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    item: ItemId,
) -> BTreeMap<LocationId, Decimal> {
    let mut out = BTreeMap::new();
    for entry in entries.into_iter().filter(|e| e.item_id == item) {
        if let Some((loc, delta)) = entry.effect().location_delta {
            *out.entry(loc).or_insert(Decimal::ZERO) += delta;
        }
    }
    out
}
