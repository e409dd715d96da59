//! Waste, spoilage and damage records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    ActorId, DisposalId, DomainError, DomainResult, Entity, ItemId, JournalEntryId, LedgerEntryId,
    LocationId, ensure_positive,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposalReason {
    Waste,
    Spoilage,
    Damage,
    Expired,
    Other(String),
}

impl DisposalReason {
    pub fn label(&self) -> &str {
        match self {
            DisposalReason::Waste => "waste",
            DisposalReason::Spoilage => "spoilage",
            DisposalReason::Damage => "damage",
            DisposalReason::Expired => "expired",
            DisposalReason::Other(text) => text,
        }
    }
}

/// What is being disposed of.
///
/// Prepared goods (plated food, mixed drinks) have no item record, so the
/// caller supplies their name and cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DisposalSubject {
    Item { item_id: ItemId },
    PreparedGood { name: String, unit_cost: Decimal },
}

impl DisposalSubject {
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            DisposalSubject::Item { item_id } => Some(*item_id),
            DisposalSubject::PreparedGood { .. } => None,
        }
    }
}

/// Input to the disposal engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposalRequest {
    pub subject: DisposalSubject,
    pub location: LocationId,
    pub quantity: Decimal,
    pub reason: DisposalReason,
    pub note: Option<String>,
}

impl DisposalRequest {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity, "disposal quantity")?;
        if let DisposalSubject::PreparedGood { name, unit_cost } = &self.subject {
            if name.trim().is_empty() {
                return Err(DomainError::validation("prepared good requires a name"));
            }
            if *unit_cost < Decimal::ZERO {
                return Err(DomainError::validation("unit cost cannot be negative"));
            }
        }
        if let DisposalReason::Other(text) = &self.reason {
            if text.trim().is_empty() {
                return Err(DomainError::validation("disposal reason cannot be empty"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposalRecord {
    pub id: DisposalId,
    pub subject: DisposalSubject,
    pub location: LocationId,
    pub quantity: Decimal,
    pub reason: DisposalReason,
    pub note: Option<String>,
    pub reported_by: ActorId,
    pub unit_cost: Decimal,
    pub total_value: Decimal,
    pub reference: String,
    /// `None` for prepared goods.
    pub ledger_entry_id: Option<LedgerEntryId>,
    /// `None` when the disposal carried no value.
    pub journal_entry_id: Option<JournalEntryId>,
    pub recorded_at: DateTime<Utc>,
}

impl Entity for DisposalRecord {
    type Id = DisposalId;

    fn id(&self) -> DisposalId {
        self.id
    }
}
