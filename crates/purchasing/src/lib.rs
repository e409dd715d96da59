//! Purchasing domain module (vendor purchase receipts).
//!
//! This crate contains business rules for purchase receipts, implemented purely
//! as deterministic domain logic (no IO, no storage). Stock, cost and journal
//! effects of a received receipt are carried out by the receiving workflow in
//! `stockbook-infra`.

pub mod receipt;

pub use receipt::{
    AddLine, Cancel, Confirm, CreateReceipt, GoodsReceived, PurchaseReceipt, ReceiptCancelled,
    ReceiptCommand, ReceiptConfirmed, ReceiptCreated, ReceiptEvent, ReceiptLine,
    ReceiptLineAdded, ReceiptStatus, ReceiveGoods,
};
