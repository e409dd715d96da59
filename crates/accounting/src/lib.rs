//! Accounting module (double-entry journal for stock postings).
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod accounts;
pub mod journal;

pub use accounts::{Account, AccountKind, AccountRole, ChartOfAccounts, InMemoryChartOfAccounts};
pub use journal::{
    Journal, JournalCommand, JournalEntry, JournalEntryLine, JournalEntryPosted, JournalEvent,
    PostJournalEntry, PostingKey, ReferenceType, validate_lines,
};
