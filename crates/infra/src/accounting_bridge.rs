//! Accounting bridge: turns physical stock events into journal postings.
//!
//! Every posting is keyed by `(reference type, reference id)`; posting the
//! same key twice returns the entry already booked. Postings run inside the
//! caller's unit of work, so an unbalanced posting or a missing account rolls
//! back the stock effects recorded alongside it.

use rust_decimal::Decimal;
use tracing::{debug, info};

use stockbook_accounting::{
    AccountRole, ChartOfAccounts, JournalCommand, JournalEntry, JournalEntryLine, JournalEvent,
    PostJournalEntry, PostingKey, ReferenceType,
};
use stockbook_core::{
    ActorId, Aggregate, DomainError, DomainResult, JournalEntryId, round_money,
};
use stockbook_inventory::AdjustmentDirection;

use crate::store::{StockView, UnitOfWork};

/// Posts stock events against a chart of accounts.
#[derive(Debug, Clone)]
pub struct AccountingBridge<C> {
    chart: C,
}

impl<C> AccountingBridge<C> {
    pub fn new(chart: C) -> Self {
        Self { chart }
    }

    pub fn chart(&self) -> &C {
        &self.chart
    }
}

impl<C: ChartOfAccounts> AccountingBridge<C> {
    /// Post `lines` under `key`, or return the entry already posted under it.
    pub fn post(
        &self,
        uow: &mut UnitOfWork<'_>,
        key: PostingKey,
        lines: Vec<JournalEntryLine>,
        description: impl Into<String>,
        actor: ActorId,
    ) -> DomainResult<JournalEntry> {
        if let Some(existing) = uow.journal_entry(&key) {
            debug!(key = %key, entry = %existing.id, "posting key already booked");
            return Ok(existing.clone());
        }

        let command = JournalCommand::PostJournalEntry(PostJournalEntry {
            entry_id: JournalEntryId::new(),
            key: key.clone(),
            lines,
            description: Some(description.into()),
            actor,
            occurred_at: uow.now(),
        });
        let events = uow.journal().handle(&command)?;

        let mut posted = None;
        for event in events {
            let JournalEvent::JournalEntryPosted(e) = &event;
            posted = Some(e.entry.clone());
            uow.stage_journal_event(event);
        }
        let entry = posted.ok_or_else(|| {
            DomainError::invariant(format!("journal produced no entry for {key}"))
        })?;

        info!(
            key = %key,
            entry = %entry.id,
            amount = %entry.debit_total(),
            "journal entry posted"
        );
        Ok(entry)
    }

    /// Dr Inventory (net) + Dr Input Tax (tax) / Cr Accounts Payable (gross).
    pub fn post_receipt(
        &self,
        uow: &mut UnitOfWork<'_>,
        receipt_number: &str,
        net: Decimal,
        tax: Decimal,
        actor: ActorId,
    ) -> DomainResult<Option<JournalEntry>> {
        let (net, tax) = (round_money(net), round_money(tax));
        if (net + tax).is_zero() {
            return Ok(None);
        }
        let mut lines = Vec::with_capacity(3);
        if net > Decimal::ZERO {
            lines.push(JournalEntryLine::debit(
                self.chart.account_for(AccountRole::InventoryAsset)?,
                net,
            ));
        }
        if tax > Decimal::ZERO {
            lines.push(JournalEntryLine::debit(
                self.chart.account_for(AccountRole::InputTax)?,
                tax,
            ));
        }
        lines.push(JournalEntryLine::credit(
            self.chart.account_for(AccountRole::AccountsPayable)?,
            net + tax,
        ));
        self.post(
            uow,
            PostingKey::new(ReferenceType::Receipt, receipt_number),
            lines,
            format!("Goods received {receipt_number}"),
            actor,
        )
        .map(Some)
    }

    /// Mirror of [`post_receipt`](Self::post_receipt).
    pub fn post_receipt_cancellation(
        &self,
        uow: &mut UnitOfWork<'_>,
        receipt_number: &str,
        net: Decimal,
        tax: Decimal,
        actor: ActorId,
    ) -> DomainResult<Option<JournalEntry>> {
        let (net, tax) = (round_money(net), round_money(tax));
        if (net + tax).is_zero() {
            return Ok(None);
        }
        let mut lines = Vec::with_capacity(3);
        lines.push(JournalEntryLine::debit(
            self.chart.account_for(AccountRole::AccountsPayable)?,
            net + tax,
        ));
        if net > Decimal::ZERO {
            lines.push(JournalEntryLine::credit(
                self.chart.account_for(AccountRole::InventoryAsset)?,
                net,
            ));
        }
        if tax > Decimal::ZERO {
            lines.push(JournalEntryLine::credit(
                self.chart.account_for(AccountRole::InputTax)?,
                tax,
            ));
        }
        self.post(
            uow,
            PostingKey::new(ReferenceType::ReceiptCancellation, receipt_number),
            lines,
            format!("Receipt {receipt_number} cancelled"),
            actor,
        )
        .map(Some)
    }

    /// Dr COGS (or the department's expense account) / Cr Inventory.
    pub fn post_consumption(
        &self,
        uow: &mut UnitOfWork<'_>,
        reference: &str,
        value: Decimal,
        department: Option<&str>,
        actor: ActorId,
    ) -> DomainResult<Option<JournalEntry>> {
        let value = round_money(value);
        if value.is_zero() {
            return Ok(None);
        }
        let expense = match department {
            Some(department) => self.chart.department_expense(department)?,
            None => self.chart.account_for(AccountRole::CostOfGoodsSold)?,
        };
        let lines = vec![
            JournalEntryLine::debit(expense, value),
            JournalEntryLine::credit(self.chart.account_for(AccountRole::InventoryAsset)?, value),
        ];
        self.post(
            uow,
            PostingKey::new(ReferenceType::Consumption, reference),
            lines,
            format!("Stock consumed {reference}"),
            actor,
        )
        .map(Some)
    }

    /// Dr Write-off / Cr Inventory.
    pub fn post_disposal(
        &self,
        uow: &mut UnitOfWork<'_>,
        reference: &str,
        value: Decimal,
        actor: ActorId,
    ) -> DomainResult<Option<JournalEntry>> {
        let value = round_money(value);
        if value.is_zero() {
            return Ok(None);
        }
        let lines = vec![
            JournalEntryLine::debit(self.chart.account_for(AccountRole::WriteOff)?, value),
            JournalEntryLine::credit(self.chart.account_for(AccountRole::InventoryAsset)?, value),
        ];
        self.post(
            uow,
            PostingKey::new(ReferenceType::Disposal, reference),
            lines,
            format!("Stock written off {reference}"),
            actor,
        )
        .map(Some)
    }

    /// Gain: Dr Inventory / Cr Stock Adjustment. Loss: the reverse.
    pub fn post_adjustment(
        &self,
        uow: &mut UnitOfWork<'_>,
        reference: &str,
        direction: AdjustmentDirection,
        value: Decimal,
        actor: ActorId,
    ) -> DomainResult<Option<JournalEntry>> {
        let value = round_money(value);
        if value.is_zero() {
            return Ok(None);
        }
        let inventory = self.chart.account_for(AccountRole::InventoryAsset)?;
        let adjustment = self.chart.account_for(AccountRole::StockAdjustment)?;
        let lines = match direction {
            AdjustmentDirection::Increase => vec![
                JournalEntryLine::debit(inventory, value),
                JournalEntryLine::credit(adjustment, value),
            ],
            AdjustmentDirection::Decrease => vec![
                JournalEntryLine::debit(adjustment, value),
                JournalEntryLine::credit(inventory, value),
            ],
        };
        self.post(
            uow,
            PostingKey::new(ReferenceType::Adjustment, reference),
            lines,
            format!("Stock adjustment {reference}"),
            actor,
        )
        .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::store::{InMemoryStockStore, StockStore};
    use rust_decimal_macros::dec;
    use stockbook_accounting::{Account, AccountKind, InMemoryChartOfAccounts};

    fn bridge() -> AccountingBridge<InMemoryChartOfAccounts> {
        AccountingBridge::new(InMemoryChartOfAccounts::standard())
    }

    #[test]
    fn receipt_posts_net_tax_and_gross() {
        let store = InMemoryStockStore::new();
        let entry = store
            .transact(|uow| {
                bridge()
                    .post_receipt(uow, "PR-000001", dec!(200), dec!(24), ActorId::new())
                    .map_err(EngineError::from)
            })
            .unwrap()
            .unwrap();
        assert_eq!(entry.lines.len(), 3);
        assert_eq!(entry.debit_total(), dec!(224));
        assert_eq!(entry.credit_total(), dec!(224));
        assert_eq!(entry.net_for("1300"), dec!(200));
        assert_eq!(entry.net_for("1410"), dec!(24));
        assert_eq!(entry.net_for("2100"), dec!(-224));
    }

    #[test]
    fn untaxed_receipt_omits_tax_line() {
        let store = InMemoryStockStore::new();
        let entry = store
            .transact(|uow| {
                bridge()
                    .post_receipt(uow, "PR-000002", dec!(50), Decimal::ZERO, ActorId::new())
                    .map_err(EngineError::from)
            })
            .unwrap()
            .unwrap();
        assert_eq!(entry.lines.len(), 2);
    }

    #[test]
    fn same_key_is_posted_once() {
        let store = InMemoryStockStore::new();
        let bridge = bridge();
        let (first, second) = store
            .transact(|uow| {
                let first = bridge.post_disposal(uow, "WST-000001", dec!(30), ActorId::new())?;
                let second = bridge.post_disposal(uow, "WST-000001", dec!(99), ActorId::new())?;
                Ok::<_, EngineError>((first, second))
            })
            .unwrap();
        assert_eq!(first.map(|e| e.id), second.map(|e| e.id));

        let third = store
            .transact(|uow| {
                bridge
                    .post_disposal(uow, "WST-000001", dec!(30), ActorId::new())
                    .map_err(EngineError::from)
            })
            .unwrap()
            .unwrap();
        assert_eq!(third.debit_total(), dec!(30));
        assert_eq!(store.read(|s| s.journal_entries().len()).unwrap(), 1);
    }

    #[test]
    fn zero_value_posts_nothing() {
        let store = InMemoryStockStore::new();
        let posted = store
            .transact(|uow| {
                bridge()
                    .post_consumption(uow, "CON-000001", Decimal::ZERO, None, ActorId::new())
                    .map_err(EngineError::from)
            })
            .unwrap();
        assert!(posted.is_none());
    }

    #[test]
    fn department_account_is_used_for_consumption() {
        let chart = InMemoryChartOfAccounts::standard().with_department(
            "kitchen",
            Account::new("6100", "Kitchen Supplies", AccountKind::Expense),
        );
        let bridge = AccountingBridge::new(chart);
        let store = InMemoryStockStore::new();
        let entry = store
            .transact(|uow| {
                bridge
                    .post_consumption(uow, "CON-000001", dec!(12.5), Some("Kitchen"), ActorId::new())
                    .map_err(EngineError::from)
            })
            .unwrap()
            .unwrap();
        assert_eq!(entry.net_for("6100"), dec!(12.5));
        assert_eq!(entry.net_for("1300"), dec!(-12.5));
    }

    #[test]
    fn missing_account_fails_the_posting() {
        let bridge = AccountingBridge::new(
            InMemoryChartOfAccounts::standard().without_role(AccountRole::WriteOff),
        );
        let store = InMemoryStockStore::new();
        let result = store.transact(|uow| {
            bridge
                .post_disposal(uow, "WST-000001", dec!(5), ActorId::new())
                .map_err(EngineError::from)
        });
        assert!(matches!(
            result,
            Err(EngineError::Domain(DomainError::NotFound(_)))
        ));
        assert!(store.read(|s| s.journal_entries().is_empty()).unwrap());
    }

    #[test]
    fn adjustment_direction_selects_sides() {
        let store = InMemoryStockStore::new();
        let bridge = bridge();
        let (gain, loss) = store
            .transact(|uow| {
                let gain = bridge.post_adjustment(
                    uow,
                    "ADJ-000001",
                    AdjustmentDirection::Increase,
                    dec!(8),
                    ActorId::new(),
                )?;
                let loss = bridge.post_adjustment(
                    uow,
                    "ADJ-000002",
                    AdjustmentDirection::Decrease,
                    dec!(3),
                    ActorId::new(),
                )?;
                Ok::<_, EngineError>((gain.unwrap(), loss.unwrap()))
            })
            .unwrap();
        assert_eq!(gain.net_for("1300"), dec!(8));
        assert_eq!(loss.net_for("1300"), dec!(-3));
        assert_eq!(loss.net_for("5410"), dec!(3));
    }
}
