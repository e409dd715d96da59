//! Reconciliation service.
//!
//! Compares the stock cache against the ledger replay for every item:
//!
//! - `GlobalVsLedger`: the item's global quantity vs `balance_of(item)`
//! - `CacheTotalVsLedger`: the sum of its location caches vs `balance_of(item)`
//! - `LocationVsLedger`: each location cache vs `balance_of(item, location)`
//!
//! A difference larger than the configured epsilon is a [`Discrepancy`].
//! Discrepancies are reported, never raised as errors.
//!
//! Report mode reads a consistent snapshot. Repair mode runs as one unit of
//! work under the writer lock and applies a [`RepairStrategy`] to every item
//! with a discrepancy; a second repair over unchanged data finds nothing and
//! writes nothing.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use stockbook_accounting::{ChartOfAccounts, JournalEntry};
use stockbook_core::{ActorId, DomainResult, Entity, ItemId, LocationId, differs};
use stockbook_inventory::{
    AdjustmentDirection, DocumentKind, Item, LedgerEntry, LedgerEntryDraft, TransactionKind,
    replay_distribution,
};

use crate::error::EngineResult;
use crate::stock_book::StockBook;
use crate::stock_cache::{self, CacheCorrection};
use crate::store::{StockStore, StockView, UnitOfWork};
use crate::{cost_engine, ledger, references};

/// How repair mode resolves drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    /// Trust the cache: append adjustment entries so the ledger matches the
    /// observed stock, then align the global quantity with the cache total.
    #[default]
    AdjustLedger,
    /// Trust the ledger: rebuild every cache of the item from the replay.
    RebuildCache,
}

impl RepairStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairStrategy::AdjustLedger => "adjust_ledger",
            RepairStrategy::RebuildCache => "rebuild_cache",
        }
    }
}

impl core::fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepairStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "adjust_ledger" => Ok(RepairStrategy::AdjustLedger),
            "rebuild_cache" => Ok(RepairStrategy::RebuildCache),
            other => Err(format!(
                "unknown repair strategy '{other}' (expected adjust-ledger or rebuild-cache)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    GlobalVsLedger,
    CacheTotalVsLedger,
    LocationVsLedger,
}

/// One cached value that disagrees with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub item_id: ItemId,
    pub sku: String,
    pub kind: DiscrepancyKind,
    /// Set for `LocationVsLedger`.
    pub location_id: Option<LocationId>,
    /// Ledger replay.
    pub ledger: Decimal,
    /// Cached value.
    pub cached: Decimal,
}

impl Discrepancy {
    /// `cached − ledger`.
    pub fn difference(&self) -> Decimal {
        self.cached - self.ledger
    }
}

/// What a repair run wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub strategy: RepairStrategy,
    pub adjustments: Vec<LedgerEntry>,
    pub journal_entries: Vec<JournalEntry>,
    pub corrections: Vec<CacheCorrection>,
}

impl RepairSummary {
    fn new(strategy: RepairStrategy) -> Self {
        Self {
            strategy,
            adjustments: Vec::new(),
            journal_entries: Vec::new(),
            corrections: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.adjustments.is_empty() && self.journal_entries.is_empty() && self.corrections.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub generated_at: DateTime<Utc>,
    pub epsilon: Decimal,
    pub items_checked: usize,
    /// Found before any repair.
    pub discrepancies: Vec<Discrepancy>,
    /// Present in repair mode.
    pub repair: Option<RepairSummary>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    fn drifting_items(&self) -> BTreeSet<ItemId> {
        self.discrepancies.iter().map(|d| d.item_id).collect()
    }
}

/// Compare every item's caches with the ledger.
pub fn scan(view: &impl StockView, epsilon: Decimal, generated_at: DateTime<Utc>) -> ReconciliationReport {
    let items = view.items();
    let mut discrepancies = Vec::new();
    for item in &items {
        discrepancies.extend(scan_item(view, item, epsilon));
    }
    ReconciliationReport {
        generated_at,
        epsilon,
        items_checked: items.len(),
        discrepancies,
        repair: None,
    }
}

fn scan_item(view: &impl StockView, item: &Item, epsilon: Decimal) -> Vec<Discrepancy> {
    let id = item.id();
    let ledger_total = ledger::balance_of(view, id, None);
    let cache_rows = view.cache_entries_for(id);
    let cache_total: Decimal = cache_rows.iter().map(|e| e.quantity).sum();

    let discrepancy = |kind, location_id, ledger, cached| Discrepancy {
        item_id: id,
        sku: item.sku().to_string(),
        kind,
        location_id,
        ledger,
        cached,
    };

    let mut found = Vec::new();
    if differs(item.global_quantity(), ledger_total, epsilon) {
        found.push(discrepancy(
            DiscrepancyKind::GlobalVsLedger,
            None,
            ledger_total,
            item.global_quantity(),
        ));
    }
    if differs(cache_total, ledger_total, epsilon) {
        found.push(discrepancy(
            DiscrepancyKind::CacheTotalVsLedger,
            None,
            ledger_total,
            cache_total,
        ));
    }
    for location in drift_locations(view, id) {
        let expected = ledger::balance_of(view, id, Some(location));
        let cached = stock_cache::get(view, id, location);
        if differs(cached, expected, epsilon) {
            found.push(discrepancy(
                DiscrepancyKind::LocationVsLedger,
                Some(location),
                expected,
                cached,
            ));
        }
    }
    found
}

/// Every location with a cache row or ledger history for the item.
fn drift_locations(view: &impl StockView, item: ItemId) -> BTreeSet<LocationId> {
    view.cache_entries_for(item)
        .into_iter()
        .map(|e| e.location_id)
        .chain(replay_distribution(view.ledger_entries(), item).into_keys())
        .collect()
}

impl<S, C> StockBook<S, C>
where
    S: StockStore,
    C: ChartOfAccounts,
{
    /// Read-only reconciliation against a consistent snapshot.
    #[instrument(skip(self), err)]
    pub fn reconcile_report(&self) -> EngineResult<ReconciliationReport> {
        let epsilon = self.config.reconciliation.epsilon;
        let report = self.store.read(|s| scan(s, epsilon, Utc::now()))?;
        log_report(&report);
        Ok(report)
    }

    /// Find and repair drift in one unit of work.
    #[instrument(skip(self), err)]
    pub fn reconcile_repair(
        &self,
        strategy: RepairStrategy,
        actor: ActorId,
    ) -> EngineResult<ReconciliationReport> {
        let epsilon = self.config.reconciliation.epsilon;
        let report = self.transact(|uow| {
            let mut report = scan(uow, epsilon, uow.now());
            let mut summary = RepairSummary::new(strategy);
            for item in report.drifting_items() {
                match strategy {
                    RepairStrategy::AdjustLedger => {
                        self.adjust_ledger_to_cache(uow, item, actor, &mut summary)?
                    }
                    RepairStrategy::RebuildCache => {
                        summary.corrections.extend(stock_cache::recompute(uow, item)?)
                    }
                }
            }
            report.repair = Some(summary);
            Ok(report)
        })?;

        log_report(&report);
        if let Some(summary) = &report.repair {
            info!(
                strategy = %strategy,
                adjustments = summary.adjustments.len(),
                journal_entries = summary.journal_entries.len(),
                corrections = summary.corrections.len(),
                "reconciliation repair applied"
            );
        }
        Ok(report)
    }

    /// Append one adjustment per drifting location (delta `cache − ledger`),
    /// then align the global quantity with the cache total.
    fn adjust_ledger_to_cache(
        &self,
        uow: &mut UnitOfWork<'_>,
        item: ItemId,
        actor: ActorId,
        summary: &mut RepairSummary,
    ) -> DomainResult<()> {
        for location in drift_locations(uow, item) {
            let expected = ledger::balance_of(uow, item, Some(location));
            let cached = stock_cache::get(uow, item, location);
            let Some((direction, quantity)) = AdjustmentDirection::from_delta(cached - expected)
            else {
                continue;
            };

            let cost = cost_engine::valuation(uow, item, quantity)?;
            let reference =
                references::allocate(uow, &self.config.references, DocumentKind::Reconciliation);
            let entry = ledger::record_observed(
                uow,
                LedgerEntryDraft::new(
                    item,
                    TransactionKind::Adjustment(direction),
                    quantity,
                    cost.unit_cost,
                    &reference,
                    actor,
                )
                .at(location)
                .with_note(format!("reconciliation: cache {cached}, ledger {expected}")),
            )?;
            if let Some(journal) = self.bridge.post_adjustment(
                uow,
                &reference,
                direction,
                cost.value,
                actor,
            )? {
                summary.journal_entries.push(journal);
            }
            summary.adjustments.push(entry);
        }

        let cache_total: Decimal = uow
            .cache_entries_for(item)
            .iter()
            .map(|e| e.quantity)
            .sum();
        let before = stock_cache::get_global(uow, item)?;
        if before != cache_total {
            let now = uow.now();
            uow.item_mut(item)?.set_global_quantity(cache_total, now);
            summary.corrections.push(CacheCorrection {
                item_id: item,
                location_id: None,
                before,
                after: cache_total,
            });
        }
        Ok(())
    }

    /// Items whose global quantity is below their minimum.
    pub fn low_stock_items(&self) -> EngineResult<Vec<Item>> {
        Ok(self.store.read(|s| {
            s.items()
                .into_iter()
                .filter(|i| i.is_active() && i.is_below_minimum())
                .cloned()
                .collect()
        })?)
    }

    /// Items whose global quantity exceeds their maximum.
    pub fn overstock_items(&self) -> EngineResult<Vec<Item>> {
        Ok(self.store.read(|s| {
            s.items()
                .into_iter()
                .filter(|i| i.is_active() && i.is_above_maximum())
                .cloned()
                .collect()
        })?)
    }

    /// Global quantity × unit cost per item.
    pub fn valuation_summary(&self) -> EngineResult<ValuationSummary> {
        let items = self.store.read(|s| {
            s.items()
                .into_iter()
                .map(|i| -> DomainResult<ItemValuation> {
                    let cost = cost_engine::valuation(s, i.id(), i.global_quantity())?;
                    Ok(ItemValuation {
                        item_id: i.id(),
                        sku: i.sku().to_string(),
                        quantity: i.global_quantity(),
                        unit_cost: cost.unit_cost,
                        value: cost.value,
                    })
                })
                .collect::<DomainResult<Vec<_>>>()
        })??;
        let total = items.iter().map(|v| v.value).sum();
        Ok(ValuationSummary { items, total })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemValuation {
    pub item_id: ItemId,
    pub sku: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationSummary {
    pub items: Vec<ItemValuation>,
    pub total: Decimal,
}

fn log_report(report: &ReconciliationReport) {
    for d in &report.discrepancies {
        warn!(
            item = %d.item_id,
            sku = %d.sku,
            kind = ?d.kind,
            location = ?d.location_id,
            ledger = %d.ledger,
            cached = %d.cached,
            "stock discrepancy"
        );
    }
    info!(
        items = report.items_checked,
        discrepancies = report.discrepancies.len(),
        "reconciliation scan complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StockbookConfig;
    use crate::store::InMemoryStockStore;
    use rust_decimal_macros::dec;
    use stockbook_accounting::InMemoryChartOfAccounts;
    use stockbook_inventory::{Location, LocationKind};

    struct Fixture {
        book: StockBook<InMemoryStockStore, InMemoryChartOfAccounts>,
        item: ItemId,
        warehouse: LocationId,
        laundry: LocationId,
    }

    fn fixture() -> Fixture {
        let book = StockBook::new(
            InMemoryStockStore::new(),
            InMemoryChartOfAccounts::standard(),
            StockbookConfig::default(),
        );
        let warehouse = book
            .seed_location(Location::new(LocationId::new(), "Warehouse", LocationKind::Warehouse))
            .unwrap();
        let laundry = book
            .seed_location(Location::new(LocationId::new(), "Laundry", LocationKind::Laundry))
            .unwrap();
        let item = book
            .seed_item(
                Item::new(ItemId::new(), "SHT-K", "King sheet", "pcs")
                    .with_unit_cost(dec!(25))
                    .with_thresholds(dec!(20), Some(dec!(100))),
            )
            .unwrap();
        book.transact(|uow| {
            ledger::record(
                uow,
                LedgerEntryDraft::new(
                    item,
                    TransactionKind::Receipt,
                    dec!(40),
                    dec!(25),
                    "PR-000001",
                    ActorId::new(),
                )
                .at(warehouse),
            )
        })
        .unwrap();
        Fixture {
            book,
            item,
            warehouse,
            laundry,
        }
    }

    #[test]
    fn consistent_book_is_clean() {
        let f = fixture();
        let report = f.book.reconcile_report().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.items_checked, 1);
        assert!(report.repair.is_none());
    }

    #[test]
    fn imported_drift_is_reported_per_kind() {
        let f = fixture();
        f.book.import_cache_entry(f.item, f.laundry, dec!(6)).unwrap();
        let report = f.book.reconcile_report().unwrap();

        let kinds: Vec<_> = report.discrepancies.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiscrepancyKind::CacheTotalVsLedger, DiscrepancyKind::LocationVsLedger]
        );
        let location = &report.discrepancies[1];
        assert_eq!(location.location_id, Some(f.laundry));
        assert_eq!(location.difference(), dec!(6));
    }

    #[test]
    fn drift_within_epsilon_is_ignored() {
        let f = fixture();
        f.book.import_cache_entry(f.item, f.warehouse, dec!(40.01)).unwrap();
        assert!(f.book.reconcile_report().unwrap().is_clean());
    }

    #[test]
    fn adjust_ledger_catches_up_and_is_idempotent() {
        let f = fixture();
        f.book.import_cache_entry(f.item, f.warehouse, dec!(37)).unwrap();
        f.book.import_cache_entry(f.item, f.laundry, dec!(5)).unwrap();

        let report = f
            .book
            .reconcile_repair(RepairStrategy::AdjustLedger, ActorId::new())
            .unwrap();
        let summary = report.repair.unwrap();
        assert_eq!(summary.adjustments.len(), 2);
        assert_eq!(summary.adjustments[0].reference, "REC-000001");
        assert_eq!(summary.journal_entries.len(), 2);
        assert_eq!(f.book.global_quantity(f.item).unwrap(), dec!(42));
        assert_eq!(f.book.balance_of(f.item, None).unwrap(), dec!(42));
        assert_eq!(f.book.balance_of(f.item, Some(f.warehouse)).unwrap(), dec!(37));
        assert_eq!(f.book.stock_at(f.item, f.warehouse).unwrap(), dec!(37));

        let entries = f.book.ledger_len().unwrap();
        let again = f
            .book
            .reconcile_repair(RepairStrategy::AdjustLedger, ActorId::new())
            .unwrap();
        assert!(again.is_clean());
        assert!(again.repair.unwrap().is_empty());
        assert_eq!(f.book.ledger_len().unwrap(), entries);
    }

    #[test]
    fn rebuild_cache_trusts_the_ledger() {
        let f = fixture();
        f.book.import_cache_entry(f.item, f.laundry, dec!(9)).unwrap();
        let report = f
            .book
            .reconcile_repair(RepairStrategy::RebuildCache, ActorId::new())
            .unwrap();
        let summary = report.repair.unwrap();
        assert!(summary.adjustments.is_empty());
        assert_eq!(summary.corrections.len(), 1);
        assert_eq!(f.book.stock_at(f.item, f.laundry).unwrap(), Decimal::ZERO);
        assert_eq!(f.book.ledger_len().unwrap(), 1);
        assert!(f.book.reconcile_report().unwrap().is_clean());
    }

    #[test]
    fn stock_health_queries() {
        let f = fixture();
        assert!(f.book.low_stock_items().unwrap().is_empty());
        f.book
            .transact(|uow| {
                ledger::record(
                    uow,
                    LedgerEntryDraft::new(
                        f.item,
                        TransactionKind::Consumption,
                        dec!(25),
                        dec!(25),
                        "CON-000001",
                        ActorId::new(),
                    )
                    .at(f.warehouse),
                )
            })
            .unwrap();
        let low = f.book.low_stock_items().unwrap();
        assert_eq!(low.len(), 1);
        assert!(f.book.overstock_items().unwrap().is_empty());

        let valuation = f.book.valuation_summary().unwrap();
        assert_eq!(valuation.total, dec!(375));
    }

    #[test]
    fn strategy_parses_cli_spelling() {
        assert_eq!(
            "rebuild-cache".parse::<RepairStrategy>().unwrap(),
            RepairStrategy::RebuildCache
        );
        assert!("replay".parse::<RepairStrategy>().is_err());
    }
}
