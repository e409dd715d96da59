//! `stockbook-core` - domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod decimal;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use decimal::{differs, ensure_positive, round_money, value_of};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    ActorId, DisposalId, ItemId, JournalEntryId, LedgerEntryId, LocationId, MovementId, ReceiptId,
};
