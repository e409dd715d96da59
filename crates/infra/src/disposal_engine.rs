//! Disposal engine: waste, spoilage and damage write-offs.
//!
//! Raw items leave stock through one disposal ledger entry valued at the
//! current unit cost. Prepared goods have no stock representation, so only the
//! write-off journal is posted for them.

use tracing::{info, instrument};

use stockbook_accounting::ChartOfAccounts;
use stockbook_core::{ActorId, DisposalId};
use stockbook_inventory::{
    DisposalRecord, DisposalRequest, DisposalSubject, DocumentKind, LedgerEntryDraft,
    TransactionKind,
};

use crate::error::EngineResult;
use crate::stock_book::{StockBook, active_item, active_location, ensure_available};
use crate::store::StockStore;
use crate::cost_engine::{self, Valuation};
use crate::{ledger, references};

impl<S, C> StockBook<S, C>
where
    S: StockStore,
    C: ChartOfAccounts,
{
    #[instrument(
        skip(self, request),
        fields(location = %request.location, quantity = %request.quantity, reason = request.reason.label()),
        err
    )]
    pub fn dispose(&self, request: DisposalRequest, actor: ActorId) -> EngineResult<DisposalRecord> {
        request.validate()?;
        self.transact(|uow| {
            active_location(uow, request.location)?;

            let cost = match &request.subject {
                DisposalSubject::Item { item_id } => {
                    active_item(uow, *item_id)?;
                    ensure_available(uow, *item_id, request.location, request.quantity)?;
                    cost_engine::valuation(uow, *item_id, request.quantity)?
                }
                DisposalSubject::PreparedGood { unit_cost, .. } => {
                    Valuation::at(request.quantity, *unit_cost)
                }
            };

            let reference =
                references::allocate(uow, &self.config.references, DocumentKind::Disposal);

            let ledger_entry = match request.subject.item_id() {
                Some(item_id) => {
                    let mut note = request.reason.label().to_string();
                    if let Some(extra) = &request.note {
                        note = format!("{note}: {extra}");
                    }
                    Some(ledger::record(
                        uow,
                        LedgerEntryDraft::new(
                            item_id,
                            TransactionKind::Disposal,
                            request.quantity,
                            cost.unit_cost,
                            &reference,
                            actor,
                        )
                        .from_location(request.location)
                        .with_note(note),
                    )?)
                }
                None => None,
            };

            let journal_entry = self
                .bridge
                .post_disposal(uow, &reference, cost.value, actor)?;

            let record = DisposalRecord {
                id: DisposalId::new(),
                subject: request.subject.clone(),
                location: request.location,
                quantity: request.quantity,
                reason: request.reason.clone(),
                note: request.note.clone(),
                reported_by: actor,
                unit_cost: cost.unit_cost,
                total_value: cost.value,
                reference: reference.clone(),
                ledger_entry_id: ledger_entry.map(|e| e.id),
                journal_entry_id: journal_entry.map(|e| e.id),
                recorded_at: uow.now(),
            };
            uow.put_disposal(record.clone());

            info!(
                reference = %reference,
                value = %cost.value,
                prepared = record.ledger_entry_id.is_none(),
                "disposal recorded"
            );
            Ok(record)
        })
    }
}
