//! Receiving workflow for vendor purchase receipts.
//!
//! Draft → confirmed → received is driven through the `PurchaseReceipt`
//! aggregate. Receiving allocates the `PR` number, blends each line into the
//! item's weighted-average cost (before its receipt entry is recorded), writes
//! one receipt ledger entry per line and posts the purchase journal, all in
//! one unit of work. Cancelling a received receipt reverses each of those.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use stockbook_accounting::{ChartOfAccounts, JournalEntry};
use stockbook_core::{
    ActorId, Aggregate, AggregateRoot, DomainError, DomainResult, ItemId, LocationId, ReceiptId,
};
use stockbook_inventory::{
    AdjustmentDirection, DocumentKind, LedgerEntry, LedgerEntryDraft, TransactionKind,
};
use stockbook_purchasing::{
    AddLine, Cancel, Confirm, CreateReceipt, PurchaseReceipt, ReceiptCommand, ReceiptStatus,
    ReceiveGoods,
};

use crate::error::EngineResult;
use crate::stock_book::{StockBook, active_item, active_location, ensure_available};
use crate::store::{StockStore, StockView, UnitOfWork};
use crate::{cost_engine, ledger, references};

/// Header of a new receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReceipt {
    pub vendor: String,
    pub receipt_date: NaiveDate,
    pub destination: LocationId,
    pub actor: ActorId,
}

/// Line to add to a draft receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReceiptLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
    /// Net unit price, excluding tax.
    pub unit_price: Decimal,
    /// Percentage, 0..=100.
    pub tax_rate: Decimal,
}

/// Everything a receive or cancellation wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPosting {
    pub receipt: PurchaseReceipt,
    pub ledger_entries: Vec<LedgerEntry>,
    pub journal_entry: Option<JournalEntry>,
}

fn load_receipt(view: &impl StockView, id: ReceiptId) -> DomainResult<PurchaseReceipt> {
    view.receipt(id)
        .cloned()
        .ok_or_else(|| DomainError::not_found(format!("purchase receipt {id}")))
}

fn execute_and_store(
    uow: &mut UnitOfWork<'_>,
    mut receipt: PurchaseReceipt,
    command: ReceiptCommand,
) -> DomainResult<PurchaseReceipt> {
    receipt.execute(&command)?;
    uow.put_receipt(receipt.clone());
    Ok(receipt)
}

impl<S, C> StockBook<S, C>
where
    S: StockStore,
    C: ChartOfAccounts,
{
    #[instrument(skip(self, header), fields(vendor = %header.vendor, destination = %header.destination), err)]
    pub fn create_receipt(&self, header: NewReceipt) -> EngineResult<PurchaseReceipt> {
        self.transact(|uow| {
            active_location(uow, header.destination)?;
            let id = ReceiptId::new();
            let command = ReceiptCommand::CreateReceipt(CreateReceipt {
                receipt_id: id,
                vendor: header.vendor.clone(),
                receipt_date: header.receipt_date,
                destination: header.destination,
                actor: header.actor,
                occurred_at: uow.now(),
            });
            execute_and_store(uow, PurchaseReceipt::empty(id), command)
        })
    }

    #[instrument(skip(self, line), fields(item = %line.item_id, quantity = %line.quantity), err)]
    pub fn add_receipt_line(
        &self,
        receipt: ReceiptId,
        line: NewReceiptLine,
    ) -> EngineResult<PurchaseReceipt> {
        self.transact(|uow| {
            active_item(uow, line.item_id)?;
            let current = load_receipt(uow, receipt)?;
            let command = ReceiptCommand::AddLine(AddLine {
                receipt_id: receipt,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                tax_rate: line.tax_rate,
                occurred_at: uow.now(),
            });
            execute_and_store(uow, current, command)
        })
    }

    #[instrument(skip(self), err)]
    pub fn confirm_receipt(&self, receipt: ReceiptId) -> EngineResult<PurchaseReceipt> {
        self.transact(|uow| {
            let current = load_receipt(uow, receipt)?;
            let command = ReceiptCommand::Confirm(Confirm {
                receipt_id: receipt,
                occurred_at: uow.now(),
            });
            execute_and_store(uow, current, command)
        })
    }

    /// Receive a confirmed receipt into its destination.
    #[instrument(skip(self), err)]
    pub fn receive(&self, receipt: ReceiptId, actor: ActorId) -> EngineResult<ReceiptPosting> {
        self.transact(|uow| {
            let current = load_receipt(uow, receipt)?;
            let destination = current
                .destination()
                .ok_or_else(|| DomainError::invariant("receipt has no destination"))?;
            active_location(uow, destination)?;
            for line in current.lines() {
                active_item(uow, line.item_id)?;
            }

            let number = references::allocate(uow, &self.config.references, DocumentKind::Purchase);
            let command = ReceiptCommand::ReceiveGoods(ReceiveGoods {
                receipt_id: receipt,
                receipt_number: number.clone(),
                occurred_at: uow.now(),
            });
            let received = execute_and_store(uow, current, command)?;

            let mut ledger_entries = Vec::with_capacity(received.lines().len());
            for line in received.lines() {
                cost_engine::apply_receipt(uow, line.item_id, line.quantity, line.unit_price)?;
                ledger_entries.push(ledger::record(
                    uow,
                    LedgerEntryDraft::new(
                        line.item_id,
                        TransactionKind::Receipt,
                        line.quantity,
                        line.unit_price,
                        &number,
                        actor,
                    )
                    .to_location(destination)
                    .with_note(format!("{} line {}", received.vendor(), line.line_no)),
                )?);
            }

            let journal_entry = self.bridge.post_receipt(
                uow,
                &number,
                received.net_total(),
                received.tax_total(),
                actor,
            )?;

            info!(
                receipt = %receipt,
                number = %number,
                lines = ledger_entries.len(),
                gross = %received.gross_total(),
                "goods received"
            );
            Ok(ReceiptPosting {
                receipt: received,
                ledger_entries,
                journal_entry,
            })
        })
    }

    /// Cancel a receipt. A received receipt has its stock, cost and journal
    /// effects reversed; `allow_negative` lets the reversal overdraw the
    /// destination when part of the delivery has already moved on.
    #[instrument(skip(self, reason), err)]
    pub fn cancel_receipt(
        &self,
        receipt: ReceiptId,
        reason: Option<String>,
        allow_negative: bool,
        actor: ActorId,
    ) -> EngineResult<ReceiptPosting> {
        self.transact(|uow| {
            let current = load_receipt(uow, receipt)?;
            let was_received = current.status() == ReceiptStatus::Received;
            let command = ReceiptCommand::Cancel(Cancel {
                receipt_id: receipt,
                reason,
                occurred_at: uow.now(),
            });
            let cancelled = execute_and_store(uow, current, command)?;
            if !was_received {
                return Ok(ReceiptPosting {
                    receipt: cancelled,
                    ledger_entries: Vec::new(),
                    journal_entry: None,
                });
            }

            let destination = cancelled
                .destination()
                .ok_or_else(|| DomainError::invariant("receipt has no destination"))?;
            let number = cancelled
                .receipt_number()
                .ok_or_else(|| DomainError::invariant("received receipt has no number"))?
                .to_string();

            if !allow_negative {
                let mut per_item: BTreeMap<ItemId, Decimal> = BTreeMap::new();
                for line in cancelled.lines() {
                    *per_item.entry(line.item_id).or_default() += line.quantity;
                }
                for (item, quantity) in per_item {
                    ensure_available(uow, item, destination, quantity)?;
                }
            }

            let mut ledger_entries = Vec::with_capacity(cancelled.lines().len());
            for line in cancelled.lines() {
                cost_engine::reverse_receipt(uow, line.item_id, line.quantity, line.unit_price)?;
                ledger_entries.push(ledger::record(
                    uow,
                    LedgerEntryDraft::new(
                        line.item_id,
                        TransactionKind::Adjustment(AdjustmentDirection::Decrease),
                        line.quantity,
                        line.unit_price,
                        &number,
                        actor,
                    )
                    .from_location(destination)
                    .with_note(format!("cancellation of {number} line {}", line.line_no)),
                )?);
            }

            let journal_entry = self.bridge.post_receipt_cancellation(
                uow,
                &number,
                cancelled.net_total(),
                cancelled.tax_total(),
                actor,
            )?;

            info!(
                receipt = %receipt,
                number = %number,
                version = cancelled.version(),
                "received goods cancelled"
            );
            Ok(ReceiptPosting {
                receipt: cancelled,
                ledger_entries,
                journal_entry,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StockbookConfig;
    use crate::error::EngineError;
    use crate::movement_engine::ConsumptionRequest;
    use crate::store::InMemoryStockStore;
    use rust_decimal_macros::dec;
    use stockbook_accounting::{AccountRole, InMemoryChartOfAccounts};
    use stockbook_inventory::{Item, Location, LocationKind};

    struct Fixture {
        book: StockBook<InMemoryStockStore, InMemoryChartOfAccounts>,
        item: ItemId,
        warehouse: LocationId,
    }

    fn fixture_with(chart: InMemoryChartOfAccounts) -> Fixture {
        let book = StockBook::new(InMemoryStockStore::new(), chart, StockbookConfig::default());
        let warehouse = book
            .seed_location(Location::new(LocationId::new(), "Warehouse", LocationKind::Warehouse))
            .unwrap();
        let item = book
            .seed_item(Item::new(ItemId::new(), "RICE-25", "Rice 25kg", "bag"))
            .unwrap();
        Fixture {
            book,
            item,
            warehouse,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryChartOfAccounts::standard())
    }

    fn confirmed(f: &Fixture, qty: Decimal, price: Decimal, tax: Decimal) -> ReceiptId {
        let receipt = f
            .book
            .create_receipt(NewReceipt {
                vendor: "Harbour Foods".into(),
                receipt_date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
                destination: f.warehouse,
                actor: ActorId::new(),
            })
            .unwrap()
            .id_typed();
        f.book
            .add_receipt_line(
                receipt,
                NewReceiptLine {
                    item_id: f.item,
                    quantity: qty,
                    unit_price: price,
                    tax_rate: tax,
                },
            )
            .unwrap();
        f.book.confirm_receipt(receipt).unwrap();
        receipt
    }

    #[test]
    fn receiving_records_stock_cost_and_journal() {
        let f = fixture();
        let receipt = confirmed(&f, dec!(10), dec!(20), dec!(12));
        let posting = f.book.receive(receipt, ActorId::new()).unwrap();

        assert_eq!(posting.receipt.receipt_number(), Some("PR-000001"));
        assert_eq!(posting.ledger_entries.len(), 1);
        assert_eq!(posting.ledger_entries[0].total_value, dec!(200));

        let journal = posting.journal_entry.unwrap();
        assert_eq!(journal.net_for("1300"), dec!(200));
        assert_eq!(journal.net_for("1410"), dec!(24));
        assert_eq!(journal.net_for("2100"), dec!(-224));

        let item = f.book.item(f.item).unwrap();
        assert_eq!(item.global_quantity(), dec!(10));
        assert_eq!(item.unit_cost(), dec!(20));
        assert_eq!(f.book.stock_at(f.item, f.warehouse).unwrap(), dec!(10));
    }

    #[test]
    fn receiving_twice_is_rejected() {
        let f = fixture();
        let receipt = confirmed(&f, dec!(1), dec!(5), dec!(0));
        f.book.receive(receipt, ActorId::new()).unwrap();
        let err = f.book.receive(receipt, ActorId::new()).unwrap_err();
        assert_eq!(err.code(), "invariant_violation");
        assert_eq!(f.book.ledger_len().unwrap(), 1);
        assert_eq!(f.book.last_sequence("PR").unwrap(), 1);
    }

    #[test]
    fn cancelling_restores_cost_and_stock() {
        let f = fixture();
        let first = confirmed(&f, dec!(10), dec!(100), dec!(0));
        f.book.receive(first, ActorId::new()).unwrap();
        let second = confirmed(&f, dec!(10), dec!(120), dec!(0));
        f.book.receive(second, ActorId::new()).unwrap();
        assert_eq!(f.book.item(f.item).unwrap().unit_cost(), dec!(110));

        let posting = f
            .book
            .cancel_receipt(second, Some("wrong delivery".into()), false, ActorId::new())
            .unwrap();
        assert_eq!(posting.receipt.status(), ReceiptStatus::Cancelled);
        assert_eq!(posting.ledger_entries[0].reference, "PR-000002");
        assert_eq!(posting.journal_entry.unwrap().net_for("2100"), dec!(1200));

        let item = f.book.item(f.item).unwrap();
        assert_eq!(item.unit_cost(), dec!(100));
        assert_eq!(item.global_quantity(), dec!(10));
        assert_eq!(f.book.balance_of(f.item, Some(f.warehouse)).unwrap(), dec!(10));
    }

    #[test]
    fn cancelling_consumed_goods_needs_override() {
        let f = fixture();
        let receipt = confirmed(&f, dec!(4), dec!(10), dec!(0));
        f.book.receive(receipt, ActorId::new()).unwrap();
        f.book
            .consume(ConsumptionRequest {
                item_id: f.item,
                location: Some(f.warehouse),
                quantity: dec!(3),
                department: None,
                note: None,
                actor: ActorId::new(),
            })
            .unwrap();

        let err = f
            .book
            .cancel_receipt(receipt, None, false, ActorId::new())
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_stock");
        assert_eq!(f.book.receipt(receipt).unwrap().status(), ReceiptStatus::Received);

        f.book
            .cancel_receipt(receipt, None, true, ActorId::new())
            .unwrap();
        assert_eq!(f.book.stock_at(f.item, f.warehouse).unwrap(), dec!(-3));
    }

    #[test]
    fn cancelling_a_draft_writes_nothing() {
        let f = fixture();
        let receipt = confirmed(&f, dec!(2), dec!(3), dec!(0));
        let posting = f
            .book
            .cancel_receipt(receipt, None, false, ActorId::new())
            .unwrap();
        assert!(posting.ledger_entries.is_empty());
        assert!(posting.journal_entry.is_none());
        assert_eq!(f.book.ledger_len().unwrap(), 0);
    }

    #[test]
    fn missing_payable_account_rolls_back_receipt() {
        let f = fixture_with(
            InMemoryChartOfAccounts::standard().without_role(AccountRole::AccountsPayable),
        );
        let receipt = confirmed(&f, dec!(5), dec!(8), dec!(0));
        let err = f.book.receive(receipt, ActorId::new()).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::NotFound(_))));

        let item = f.book.item(f.item).unwrap();
        assert_eq!(item.global_quantity(), Decimal::ZERO);
        assert_eq!(item.unit_cost(), Decimal::ZERO);
        assert_eq!(f.book.ledger_len().unwrap(), 0);
        assert_eq!(f.book.last_sequence("PR").unwrap(), 0);
        assert_eq!(f.book.receipt(receipt).unwrap().status(), ReceiptStatus::Confirmed);
    }
}
