use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    ActorId, Aggregate, AggregateRoot, DomainError, ItemId, LocationId, ReceiptId,
    ensure_positive, round_money, value_of,
};

/// Purchase receipt status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Draft,
    Confirmed,
    Received,
    Cancelled,
}

/// Purchase receipt line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: Decimal,
    /// Net unit price (excluding tax).
    pub unit_price: Decimal,
    /// Tax rate in percent (e.g. `12` for 12%).
    pub tax_rate: Decimal,
}

impl ReceiptLine {
    pub fn net_amount(&self) -> Decimal {
        value_of(self.quantity, self.unit_price)
    }

    pub fn tax_amount(&self) -> Decimal {
        round_money(self.net_amount() * self.tax_rate / Decimal::ONE_HUNDRED)
    }

    pub fn gross_amount(&self) -> Decimal {
        self.net_amount() + self.tax_amount()
    }
}

/// Aggregate root: PurchaseReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    id: ReceiptId,
    vendor: String,
    receipt_date: Option<NaiveDate>,
    destination: Option<LocationId>,
    status: ReceiptStatus,
    receipt_number: Option<String>,
    lines: Vec<ReceiptLine>,
    created_by: Option<ActorId>,
    received_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    version: u64,
    created: bool,
}

impl PurchaseReceipt {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ReceiptId) -> Self {
        Self {
            id,
            vendor: String::new(),
            receipt_date: None,
            destination: None,
            status: ReceiptStatus::Draft,
            receipt_number: None,
            lines: Vec::new(),
            created_by: None,
            received_at: None,
            cancellation_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReceiptId {
        self.id
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn receipt_date(&self) -> Option<NaiveDate> {
        self.receipt_date
    }

    pub fn destination(&self) -> Option<LocationId> {
        self.destination
    }

    pub fn status(&self) -> ReceiptStatus {
        self.status
    }

    /// Allocated when the goods are received.
    pub fn receipt_number(&self) -> Option<&str> {
        self.receipt_number.as_deref()
    }

    pub fn lines(&self) -> &[ReceiptLine] {
        &self.lines
    }

    pub fn created_by(&self) -> Option<ActorId> {
        self.created_by
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn net_total(&self) -> Decimal {
        self.lines.iter().map(ReceiptLine::net_amount).sum()
    }

    pub fn tax_total(&self) -> Decimal {
        self.lines.iter().map(ReceiptLine::tax_amount).sum()
    }

    pub fn gross_total(&self) -> Decimal {
        self.net_total() + self.tax_total()
    }
}

impl AggregateRoot for PurchaseReceipt {
    type Id = ReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReceipt {
    pub receipt_id: ReceiptId,
    pub vendor: String,
    pub receipt_date: NaiveDate,
    pub destination: LocationId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub receipt_id: ReceiptId,
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirm {
    pub receipt_id: ReceiptId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods.
///
/// The receipt number is allocated by the caller inside the same unit of work
/// that writes the stock effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub receipt_id: ReceiptId,
    pub receipt_number: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub receipt_id: ReceiptId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptCommand {
    CreateReceipt(CreateReceipt),
    AddLine(AddLine),
    Confirm(Confirm),
    ReceiveGoods(ReceiveGoods),
    Cancel(Cancel),
}

/// Event: ReceiptCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptCreated {
    pub receipt_id: ReceiptId,
    pub vendor: String,
    pub receipt_date: NaiveDate,
    pub destination: LocationId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLineAdded {
    pub receipt_id: ReceiptId,
    pub line: ReceiptLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptConfirmed {
    pub receipt_id: ReceiptId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries everything the receiving workflow needs to post cost, ledger,
/// cache and journal effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub receipt_id: ReceiptId,
    pub receipt_number: String,
    pub destination: LocationId,
    pub lines: Vec<ReceiptLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptCancelled.
///
/// `was_received` tells the workflow whether stock and cost effects must be
/// reversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptCancelled {
    pub receipt_id: ReceiptId,
    pub was_received: bool,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptEvent {
    ReceiptCreated(ReceiptCreated),
    ReceiptLineAdded(ReceiptLineAdded),
    ReceiptConfirmed(ReceiptConfirmed),
    GoodsReceived(GoodsReceived),
    ReceiptCancelled(ReceiptCancelled),
}

impl Aggregate for PurchaseReceipt {
    type Command = ReceiptCommand;
    type Event = ReceiptEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReceiptEvent::ReceiptCreated(e) => {
                self.id = e.receipt_id;
                self.vendor = e.vendor.clone();
                self.receipt_date = Some(e.receipt_date);
                self.destination = Some(e.destination);
                self.created_by = Some(e.actor);
                self.status = ReceiptStatus::Draft;
                self.lines.clear();
                self.created = true;
            }
            ReceiptEvent::ReceiptLineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            ReceiptEvent::ReceiptConfirmed(_) => {
                self.status = ReceiptStatus::Confirmed;
            }
            ReceiptEvent::GoodsReceived(e) => {
                self.receipt_number = Some(e.receipt_number.clone());
                self.received_at = Some(e.occurred_at);
                self.status = ReceiptStatus::Received;
            }
            ReceiptEvent::ReceiptCancelled(e) => {
                self.cancellation_reason = e.reason.clone();
                self.status = ReceiptStatus::Cancelled;
            }
        }

        // +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReceiptCommand::CreateReceipt(cmd) => self.handle_create(cmd),
            ReceiptCommand::AddLine(cmd) => self.handle_add_line(cmd),
            ReceiptCommand::Confirm(cmd) => self.handle_confirm(cmd),
            ReceiptCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
            ReceiptCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl PurchaseReceipt {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("purchase receipt {}", self.id)));
        }
        Ok(())
    }

    fn ensure_receipt_id(&self, receipt_id: ReceiptId) -> Result<(), DomainError> {
        if self.id != receipt_id {
            return Err(DomainError::invariant("receipt_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateReceipt) -> Result<Vec<ReceiptEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase receipt already exists"));
        }
        self.ensure_receipt_id(cmd.receipt_id)?;
        if cmd.vendor.trim().is_empty() {
            return Err(DomainError::validation("vendor cannot be empty"));
        }

        Ok(vec![ReceiptEvent::ReceiptCreated(ReceiptCreated {
            receipt_id: cmd.receipt_id,
            vendor: cmd.vendor.clone(),
            receipt_date: cmd.receipt_date,
            destination: cmd.destination,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<ReceiptEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_receipt_id(cmd.receipt_id)?;

        if self.status != ReceiptStatus::Draft {
            return Err(DomainError::invariant(
                "cannot modify purchase receipt once confirmed",
            ));
        }
        ensure_positive(cmd.quantity, "receipt quantity")?;
        if cmd.unit_price < Decimal::ZERO {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        if cmd.tax_rate < Decimal::ZERO || cmd.tax_rate > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation("tax rate must be between 0 and 100"));
        }

        let next_line_no = (self.lines.len() as u32) + 1;
        Ok(vec![ReceiptEvent::ReceiptLineAdded(ReceiptLineAdded {
            receipt_id: cmd.receipt_id,
            line: ReceiptLine {
                line_no: next_line_no,
                item_id: cmd.item_id,
                quantity: cmd.quantity,
                unit_price: cmd.unit_price,
                tax_rate: cmd.tax_rate,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &Confirm) -> Result<Vec<ReceiptEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_receipt_id(cmd.receipt_id)?;

        if self.status != ReceiptStatus::Draft {
            return Err(DomainError::invariant(
                "only draft purchase receipts can be confirmed",
            ));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot confirm purchase receipt without lines",
            ));
        }

        Ok(vec![ReceiptEvent::ReceiptConfirmed(ReceiptConfirmed {
            receipt_id: cmd.receipt_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveGoods) -> Result<Vec<ReceiptEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_receipt_id(cmd.receipt_id)?;

        // Invariant: cannot receive before confirmation.
        if self.status != ReceiptStatus::Confirmed {
            return Err(DomainError::invariant(
                "cannot receive goods before purchase receipt is confirmed",
            ));
        }
        let destination = self
            .destination
            .ok_or_else(|| DomainError::invariant("destination must be set"))?;
        if cmd.receipt_number.trim().is_empty() {
            return Err(DomainError::validation("receipt number cannot be empty"));
        }

        Ok(vec![ReceiptEvent::GoodsReceived(GoodsReceived {
            receipt_id: cmd.receipt_id,
            receipt_number: cmd.receipt_number.clone(),
            destination,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<ReceiptEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_receipt_id(cmd.receipt_id)?;

        if self.status == ReceiptStatus::Cancelled {
            return Err(DomainError::invariant("purchase receipt is already cancelled"));
        }

        Ok(vec![ReceiptEvent::ReceiptCancelled(ReceiptCancelled {
            receipt_id: cmd.receipt_id,
            was_received: self.status == ReceiptStatus::Received,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created() -> PurchaseReceipt {
        let id = ReceiptId::new();
        let mut receipt = PurchaseReceipt::empty(id);
        receipt
            .execute(&ReceiptCommand::CreateReceipt(CreateReceipt {
                receipt_id: id,
                vendor: "Island Linen Co.".to_string(),
                receipt_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                destination: LocationId::new(),
                actor: ActorId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        receipt
    }

    fn add_line(receipt: &mut PurchaseReceipt, qty: Decimal, price: Decimal, tax: Decimal) {
        let id = receipt.id_typed();
        receipt
            .execute(&ReceiptCommand::AddLine(AddLine {
                receipt_id: id,
                item_id: ItemId::new(),
                quantity: qty,
                unit_price: price,
                tax_rate: tax,
                occurred_at: test_time(),
            }))
            .unwrap();
    }

    fn confirm(receipt: &mut PurchaseReceipt) {
        let id = receipt.id_typed();
        receipt
            .execute(&ReceiptCommand::Confirm(Confirm {
                receipt_id: id,
                occurred_at: test_time(),
            }))
            .unwrap();
    }

    fn receive_cmd(receipt: &PurchaseReceipt) -> ReceiptCommand {
        ReceiptCommand::ReceiveGoods(ReceiveGoods {
            receipt_id: receipt.id_typed(),
            receipt_number: "PR-000001".to_string(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn line_amounts_include_tax() {
        let mut receipt = created();
        add_line(&mut receipt, dec!(10), dec!(12.50), dec!(12));
        add_line(&mut receipt, dec!(3), dec!(1.99), dec!(0));
        assert_eq!(receipt.lines()[0].line_no, 1);
        assert_eq!(receipt.lines()[1].line_no, 2);
        assert_eq!(receipt.net_total(), dec!(130.97));
        assert_eq!(receipt.tax_total(), dec!(15.00));
        assert_eq!(receipt.gross_total(), dec!(145.97));
    }

    #[test]
    fn cannot_receive_before_confirmation() {
        let mut receipt = created();
        add_line(&mut receipt, dec!(1), dec!(1), dec!(0));
        let err = receipt.handle(&receive_cmd(&receipt)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cannot_confirm_without_lines() {
        let receipt = created();
        let err = receipt
            .handle(&ReceiptCommand::Confirm(Confirm {
                receipt_id: receipt.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn receive_carries_lines_and_number() {
        let mut receipt = created();
        add_line(&mut receipt, dec!(50), dec!(10), dec!(0));
        confirm(&mut receipt);
        let events = receipt.execute(&receive_cmd(&receipt)).unwrap();
        match &events[0] {
            ReceiptEvent::GoodsReceived(e) => {
                assert_eq!(e.lines.len(), 1);
                assert_eq!(e.receipt_number, "PR-000001");
            }
            other => panic!("expected GoodsReceived, got {other:?}"),
        }
        assert_eq!(receipt.status(), ReceiptStatus::Received);
        assert_eq!(receipt.receipt_number(), Some("PR-000001"));
    }

    #[test]
    fn lines_frozen_after_confirmation() {
        let mut receipt = created();
        add_line(&mut receipt, dec!(1), dec!(1), dec!(0));
        confirm(&mut receipt);
        let err = receipt
            .handle(&ReceiptCommand::AddLine(AddLine {
                receipt_id: receipt.id_typed(),
                item_id: ItemId::new(),
                quantity: dec!(1),
                unit_price: dec!(1),
                tax_rate: dec!(0),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cancel_flags_received_receipts() {
        let mut draft = created();
        let events = draft
            .execute(&ReceiptCommand::Cancel(Cancel {
                receipt_id: draft.id_typed(),
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(matches!(
            &events[0],
            ReceiptEvent::ReceiptCancelled(e) if !e.was_received
        ));

        let mut received = created();
        add_line(&mut received, dec!(5), dec!(130), dec!(0));
        confirm(&mut received);
        received.execute(&receive_cmd(&received)).unwrap();
        let cancel = ReceiptCommand::Cancel(Cancel {
            receipt_id: received.id_typed(),
            reason: Some("wrong delivery".into()),
            occurred_at: test_time(),
        });
        let events = received.execute(&cancel).unwrap();
        assert!(matches!(
            &events[0],
            ReceiptEvent::ReceiptCancelled(e) if e.was_received
        ));
        assert_eq!(received.status(), ReceiptStatus::Cancelled);

        // twice is an error
        assert!(received.handle(&cancel).is_err());
    }

    #[test]
    fn rejects_out_of_range_tax_rate() {
        let receipt = created();
        let err = receipt
            .handle(&ReceiptCommand::AddLine(AddLine {
                receipt_id: receipt.id_typed(),
                item_id: ItemId::new(),
                quantity: dec!(1),
                unit_price: dec!(1),
                tax_rate: dec!(101),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
