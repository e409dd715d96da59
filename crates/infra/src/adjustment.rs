//! Manual stock adjustments (stock counts, found or lost stock).

use rust_decimal::Decimal;
use tracing::{info, instrument};

use stockbook_accounting::{ChartOfAccounts, JournalEntry};
use stockbook_core::{ActorId, DomainError, ItemId, LocationId, ensure_positive};
use stockbook_inventory::{
    AdjustmentDirection, DocumentKind, LedgerEntry, LedgerEntryDraft, TransactionKind,
};

use crate::error::EngineResult;
use crate::stock_book::{StockBook, active_item, active_location, ensure_available};
use crate::store::StockStore;
use crate::{cost_engine, ledger, references};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentRequest {
    pub item_id: ItemId,
    pub location: LocationId,
    pub direction: AdjustmentDirection,
    pub quantity: Decimal,
    pub reason: String,
    pub actor: ActorId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentRecord {
    pub reference: String,
    pub ledger_entry: LedgerEntry,
    pub journal_entry: Option<JournalEntry>,
}

impl<S, C> StockBook<S, C>
where
    S: StockStore,
    C: ChartOfAccounts,
{
    /// Adjust stock at one location. A decrease cannot overdraw the location.
    #[instrument(
        skip(self, request),
        fields(item = %request.item_id, location = %request.location, direction = ?request.direction, quantity = %request.quantity),
        err
    )]
    pub fn adjust(&self, request: AdjustmentRequest) -> EngineResult<AdjustmentRecord> {
        ensure_positive(request.quantity, "adjustment quantity")?;
        if request.reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment requires a reason").into());
        }
        self.transact(|uow| {
            active_item(uow, request.item_id)?;
            let cost = cost_engine::valuation(uow, request.item_id, request.quantity)?;
            active_location(uow, request.location)?;
            if request.direction == AdjustmentDirection::Decrease {
                ensure_available(uow, request.item_id, request.location, request.quantity)?;
            }

            let reference =
                references::allocate(uow, &self.config.references, DocumentKind::Adjustment);
            let ledger_entry = ledger::record(
                uow,
                LedgerEntryDraft::new(
                    request.item_id,
                    TransactionKind::Adjustment(request.direction),
                    request.quantity,
                    cost.unit_cost,
                    &reference,
                    request.actor,
                )
                .at(request.location)
                .with_note(request.reason.as_str()),
            )?;
            let journal_entry = self.bridge.post_adjustment(
                uow,
                &reference,
                request.direction,
                cost.value,
                request.actor,
            )?;

            info!(reference = %reference, value = %cost.value, "stock adjusted");
            Ok(AdjustmentRecord {
                reference,
                ledger_entry,
                journal_entry,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StockbookConfig;
    use crate::store::InMemoryStockStore;
    use rust_decimal_macros::dec;
    use stockbook_accounting::InMemoryChartOfAccounts;
    use stockbook_inventory::{Item, Location, LocationKind};

    fn book() -> (
        StockBook<InMemoryStockStore, InMemoryChartOfAccounts>,
        ItemId,
        LocationId,
    ) {
        let book = StockBook::new(
            InMemoryStockStore::new(),
            InMemoryChartOfAccounts::standard(),
            StockbookConfig::default(),
        );
        let store = book
            .seed_location(Location::new(LocationId::new(), "Bar store", LocationKind::Store))
            .unwrap();
        let item = book
            .seed_item(Item::new(ItemId::new(), "GIN-70", "Gin 70cl", "btl").with_unit_cost(dec!(9)))
            .unwrap();
        (book, item, store)
    }

    fn request(item: ItemId, location: LocationId, direction: AdjustmentDirection, qty: Decimal) -> AdjustmentRequest {
        AdjustmentRequest {
            item_id: item,
            location,
            direction,
            quantity: qty,
            reason: "monthly count".into(),
            actor: ActorId::new(),
        }
    }

    #[test]
    fn gain_then_loss() {
        let (book, item, store) = book();
        let gain = book
            .adjust(request(item, store, AdjustmentDirection::Increase, dec!(5)))
            .unwrap();
        assert_eq!(gain.reference, "ADJ-000001");
        assert_eq!(gain.journal_entry.unwrap().net_for("1300"), dec!(45));

        let loss = book
            .adjust(request(item, store, AdjustmentDirection::Decrease, dec!(2)))
            .unwrap();
        assert_eq!(loss.journal_entry.unwrap().net_for("5410"), dec!(18));
        assert_eq!(book.global_quantity(item).unwrap(), dec!(3));
        assert_eq!(book.stock_at(item, store).unwrap(), dec!(3));
        assert_eq!(book.balance_of(item, Some(store)).unwrap(), dec!(3));
    }

    #[test]
    fn decrease_cannot_overdraw() {
        let (book, item, store) = book();
        let err = book
            .adjust(request(item, store, AdjustmentDirection::Decrease, dec!(1)))
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_stock");
        assert_eq!(book.last_sequence("ADJ").unwrap(), 0);
    }

    #[test]
    fn blank_reason_is_invalid() {
        let (book, item, store) = book();
        let mut req = request(item, store, AdjustmentDirection::Increase, dec!(1));
        req.reason = "  ".into();
        assert_eq!(book.adjust(req).unwrap_err().code(), "validation");
    }
}
