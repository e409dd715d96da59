use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    ActorId, Aggregate, AggregateRoot, DomainError, JournalEntryId, round_money,
};

use crate::accounts::Account;

/// The kind of physical event a journal entry books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Receipt,
    ReceiptCancellation,
    Consumption,
    Disposal,
    Adjustment,
}

impl ReferenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceType::Receipt => "receipt",
            ReferenceType::ReceiptCancellation => "receipt_cancellation",
            ReferenceType::Consumption => "consumption",
            ReferenceType::Disposal => "disposal",
            ReferenceType::Adjustment => "adjustment",
        }
    }
}

/// One physical event maps to at most one journal entry under this key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostingKey {
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

impl PostingKey {
    pub fn new(reference_type: ReferenceType, reference_id: impl Into<String>) -> Self {
        Self {
            reference_type,
            reference_id: reference_id.into(),
        }
    }
}

impl core::fmt::Display for PostingKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.reference_type.as_str(), self.reference_id)
    }
}

/// One side of a journal entry (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account: Account,
    /// Positive amount, 2 decimal places.
    pub amount: Decimal,
    /// true = debit, false = credit.
    pub is_debit: bool,
}

impl JournalEntryLine {
    pub fn debit(account: Account, amount: Decimal) -> Self {
        Self {
            account,
            amount,
            is_debit: true,
        }
    }

    pub fn credit(account: Account, amount: Decimal) -> Self {
        Self {
            account,
            amount,
            is_debit: false,
        }
    }
}

/// A posted, balanced journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub key: PostingKey,
    pub lines: Vec<JournalEntryLine>,
    pub description: Option<String>,
    pub actor: ActorId,
    pub posted_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn debit_total(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.is_debit)
            .map(|l| l.amount)
            .sum()
    }

    pub fn credit_total(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| !l.is_debit)
            .map(|l| l.amount)
            .sum()
    }

    /// Signed amount booked to `code` (debit positive).
    pub fn net_for(&self, code: &str) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.account.code == code)
            .map(|l| if l.is_debit { l.amount } else { -l.amount })
            .sum()
    }
}

/// Aggregate root: Journal (double-entry book of stock postings).
///
/// Holds posted entries and the key index that makes posting idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "JournalSnapshot", into = "JournalSnapshot")]
pub struct Journal {
    book: String,
    entries: Vec<JournalEntry>,
    index: BTreeMap<PostingKey, usize>,
    version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalSnapshot {
    book: String,
    entries: Vec<JournalEntry>,
}

impl From<JournalSnapshot> for Journal {
    fn from(snapshot: JournalSnapshot) -> Self {
        let mut journal = Journal::new(snapshot.book);
        for entry in snapshot.entries {
            journal.apply(&JournalEvent::JournalEntryPosted(JournalEntryPosted { entry }));
        }
        journal
    }
}

impl From<Journal> for JournalSnapshot {
    fn from(journal: Journal) -> Self {
        Self {
            book: journal.book,
            entries: journal.entries,
        }
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new("stock")
    }
}

impl Journal {
    pub fn new(book: impl Into<String>) -> Self {
        Self {
            book: book.into(),
            entries: Vec::new(),
            index: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn find(&self, key: &PostingKey) -> Option<&JournalEntry> {
        self.index.get(key).and_then(|&i| self.entries.get(i))
    }

    pub fn get(&self, id: JournalEntryId) -> Option<&JournalEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Net balance per account code across all entries (debit positive).
    pub fn balances(&self) -> BTreeMap<String, Decimal> {
        let mut out = BTreeMap::new();
        for line in self.entries.iter().flat_map(|e| &e.lines) {
            let signed = if line.is_debit {
                line.amount
            } else {
                -line.amount
            };
            *out.entry(line.account.code.clone())
                .or_insert(Decimal::ZERO) += signed;
        }
        out
    }
}

impl AggregateRoot for Journal {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.book
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub entry_id: JournalEntryId,
    pub key: PostingKey,
    pub lines: Vec<JournalEntryLine>,
    pub description: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    PostJournalEntry(PostJournalEntry),
}

/// Event: JournalEntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub entry: JournalEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    JournalEntryPosted(JournalEntryPosted),
}

impl Aggregate for Journal {
    type Command = JournalCommand;
    type Event = JournalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEvent::JournalEntryPosted(e) => {
                if !self.index.contains_key(&e.entry.key) {
                    self.index.insert(e.entry.key.clone(), self.entries.len());
                    self.entries.push(e.entry.clone());
                }
            }
        }

        self.version += 1;
    }

    /// Already-posted keys yield no events; the caller returns the existing
    /// entry via [`Journal::find`].
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
        }
    }
}

impl Journal {
    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<JournalEvent>, DomainError> {
        if self.index.contains_key(&cmd.key) {
            return Ok(Vec::new());
        }
        if cmd.key.reference_id.trim().is_empty() {
            return Err(DomainError::validation("journal entry requires a reference id"));
        }

        let lines = validate_lines(&cmd.lines)?;

        Ok(vec![JournalEvent::JournalEntryPosted(JournalEntryPosted {
            entry: JournalEntry {
                id: cmd.entry_id,
                key: cmd.key.clone(),
                lines,
                description: cmd.description.clone(),
                actor: cmd.actor,
                posted_at: cmd.occurred_at,
            },
        })])
    }
}

/// Round every line to money scale and check the posting balances exactly.
pub fn validate_lines(lines: &[JournalEntryLine]) -> Result<Vec<JournalEntryLine>, DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("journal entry must have lines"));
    }

    let mut rounded = Vec::with_capacity(lines.len());
    let mut debit_total = Decimal::ZERO;
    let mut credit_total = Decimal::ZERO;

    for line in lines {
        let amount = round_money(line.amount);
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be positive"));
        }
        if line.is_debit {
            debit_total += amount;
        } else {
            credit_total += amount;
        }
        rounded.push(JournalEntryLine {
            amount,
            ..line.clone()
        });
    }

    if debit_total != credit_total {
        return Err(DomainError::UnbalancedPosting {
            debit: debit_total,
            credit: credit_total,
        });
    }

    Ok(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountKind;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_account(code: &str, kind: AccountKind) -> Account {
        Account::new(code, code, kind)
    }

    fn post(key: PostingKey, lines: Vec<JournalEntryLine>) -> JournalCommand {
        JournalCommand::PostJournalEntry(PostJournalEntry {
            entry_id: JournalEntryId::new(),
            key,
            lines,
            description: Some("Test entry".to_string()),
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn balanced(amount: Decimal) -> Vec<JournalEntryLine> {
        vec![
            JournalEntryLine::debit(test_account("5400", AccountKind::Expense), amount),
            JournalEntryLine::credit(test_account("1300", AccountKind::Asset), amount),
        ]
    }

    #[test]
    fn post_journal_entry_emits_event_when_balanced() {
        let journal = Journal::default();
        let key = PostingKey::new(ReferenceType::Disposal, "WST-000001");
        let events = journal.handle(&post(key.clone(), balanced(dec!(50)))).unwrap();
        assert_eq!(events.len(), 1);
        let JournalEvent::JournalEntryPosted(e) = &events[0];
        assert_eq!(e.entry.key, key);
        assert_eq!(e.entry.debit_total(), dec!(50));
        assert_eq!(e.entry.credit_total(), dec!(50));
    }

    #[test]
    fn unbalanced_entry_is_rejected() {
        let journal = Journal::default();
        let lines = vec![
            JournalEntryLine::debit(test_account("1300", AccountKind::Asset), dec!(100)),
            JournalEntryLine::credit(test_account("2100", AccountKind::Liability), dec!(90)),
        ];
        let err = journal
            .handle(&post(PostingKey::new(ReferenceType::Receipt, "PR-1"), lines))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::UnbalancedPosting {
                debit: dec!(100),
                credit: dec!(90)
            }
        );
    }

    #[test]
    fn balance_is_checked_after_rounding() {
        let journal = Journal::default();
        // 33.333 + 33.333 rounds to 66.66 on the debit side
        let lines = vec![
            JournalEntryLine::debit(test_account("1300", AccountKind::Asset), dec!(33.333)),
            JournalEntryLine::debit(test_account("1410", AccountKind::Asset), dec!(33.333)),
            JournalEntryLine::credit(test_account("2100", AccountKind::Liability), dec!(66.666)),
        ];
        let err = journal
            .handle(&post(PostingKey::new(ReferenceType::Receipt, "PR-1"), lines))
            .unwrap_err();
        assert!(matches!(err, DomainError::UnbalancedPosting { .. }));
    }

    #[test]
    fn zero_and_empty_lines_are_rejected() {
        let journal = Journal::default();
        let key = PostingKey::new(ReferenceType::Adjustment, "ADJ-1");
        assert!(journal.handle(&post(key.clone(), Vec::new())).is_err());
        assert!(matches!(
            journal.handle(&post(key, balanced(dec!(0.001)))),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn reposting_same_key_yields_no_events() {
        let mut journal = Journal::default();
        let key = PostingKey::new(ReferenceType::Consumption, "CON-000001");
        journal.execute(&post(key.clone(), balanced(dec!(20)))).unwrap();
        let first = journal.find(&key).unwrap().id;

        let again = journal.execute(&post(key.clone(), balanced(dec!(20)))).unwrap();
        assert!(again.is_empty());
        assert_eq!(journal.entries().len(), 1);
        assert_eq!(journal.find(&key).unwrap().id, first);
    }

    #[test]
    fn snapshot_round_trip_rebuilds_index() {
        let mut journal = Journal::default();
        let key = PostingKey::new(ReferenceType::Disposal, "WST-000001");
        journal.execute(&post(key.clone(), balanced(dec!(50)))).unwrap();

        let json = serde_json::to_string(&journal).unwrap();
        let restored: Journal = serde_json::from_str(&json).unwrap();
        assert!(restored.find(&key).is_some());
        assert_eq!(restored.balances().get("1300"), Some(&dec!(-50)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: For any generated sequence of balanced journal entries,
        /// the sum of debits minus credits across all posted entries is zero.
        #[test]
        fn debits_equal_credits_in_posted_entries(
            amounts in prop::collection::vec(1i64..100_000_000i64, 1..10)
        ) {
            let mut journal = Journal::default();

            for (i, cents) in amounts.into_iter().enumerate() {
                let amount = Decimal::new(cents, 2);
                let key = PostingKey::new(ReferenceType::Receipt, format!("PR-{i}"));
                journal.execute(&post(key, balanced(amount))).unwrap();
            }

            let total: Decimal = journal.balances().values().copied().sum();
            prop_assert_eq!(total, Decimal::ZERO);
            for entry in journal.entries() {
                prop_assert_eq!(entry.debit_total(), entry.credit_total());
            }
        }
    }
}
