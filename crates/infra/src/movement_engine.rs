//! Movement engine: transfers between locations and consumption.
//!
//! A movement runs in two units of work. The first requests and validates it
//! (source resolution, referential checks, per-item availability) and always
//! persists the outcome, so rejected movements stay on record for audit. The
//! second re-checks the cache versions observed during validation, allocates
//! the `ISS` reference and writes one transfer-out/transfer-in pair per line.

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use stockbook_accounting::{ChartOfAccounts, JournalEntry};
use stockbook_core::{
    ActorId, Aggregate, DomainError, DomainResult, Entity, ExpectedVersion, ItemId, LocationId,
    MovementId, ensure_positive,
};
use stockbook_inventory::{
    CommitMovement, DocumentKind, LedgerEntry, LedgerEntryDraft, LocationKind, MovementCommand,
    MovementEvent, MovementLine, MovementStatus, RejectMovement, RequestMovement, SourceAvailability,
    StockMovement, TransactionKind, ValidateMovement, requested_per_item,
};

use crate::config::RoutingConfig;
use crate::error::{EngineError, EngineResult};
use crate::stock_book::{StockBook, active_item, active_location, ensure_available};
use crate::store::{StockStore, StockView, UnitOfWork};
use crate::{cost_engine, ledger, references, stock_cache};

/// Transfer or issue request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    /// `None` routes from the default source.
    pub source: Option<LocationId>,
    pub destination: LocationId,
    pub lines: Vec<MovementLine>,
    /// Administrative override: proceed even when the source is short.
    pub allow_negative: bool,
    pub actor: ActorId,
}

/// Service or kitchen consumption of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionRequest {
    pub item_id: ItemId,
    pub location: Option<LocationId>,
    pub quantity: Decimal,
    /// Department whose expense account is debited instead of COGS.
    pub department: Option<String>,
    pub note: Option<String>,
    pub actor: ActorId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionRecord {
    pub reference: String,
    pub ledger_entry: LedgerEntry,
    pub journal_entry: Option<JournalEntry>,
}

/// Resolve the source of a movement.
///
/// Explicit source, else the configured default warehouse, else the first
/// active warehouse, else the first active location. `exclude` (the
/// destination) is never picked by the fallbacks.
pub fn resolve_source(
    view: &impl StockView,
    routing: &RoutingConfig,
    explicit: Option<LocationId>,
    exclude: Option<LocationId>,
) -> DomainResult<LocationId> {
    if let Some(source) = explicit {
        active_location(view, source)?;
        return Ok(source);
    }
    if let Some(default) = routing.default_warehouse {
        if Some(default) != exclude {
            if let Some(location) = view.location(default) {
                if location.is_active() {
                    return Ok(default);
                }
            }
        }
    }
    let candidates: Vec<_> = view
        .locations()
        .into_iter()
        .filter(|l| l.is_active() && Some(l.id()) != exclude)
        .collect();
    candidates
        .iter()
        .find(|l| l.kind() == LocationKind::Warehouse)
        .or_else(|| candidates.first())
        .map(|l| l.id())
        .ok_or_else(|| DomainError::not_found("no active source location"))
}

impl<S, C> StockBook<S, C>
where
    S: StockStore,
    C: ChartOfAccounts,
{
    /// Request, validate and commit a movement.
    #[instrument(
        skip(self, request),
        fields(destination = %request.destination, lines = request.lines.len(), actor = %request.actor),
        err
    )]
    pub fn issue(&self, request: MovementRequest) -> EngineResult<StockMovement> {
        let movement = self.request_movement(request)?;
        self.commit_movement(movement.id_typed())
    }

    /// Request and validate a movement without committing it.
    ///
    /// The movement is persisted either way; a rejected movement is returned
    /// as the error that rejected it.
    #[instrument(skip(self, request), fields(destination = %request.destination), err)]
    pub fn request_movement(&self, request: MovementRequest) -> EngineResult<StockMovement> {
        let (movement, outcome) = self.transact(|uow| {
            let id = MovementId::new();
            let mut movement = StockMovement::empty(id);
            movement.execute(&MovementCommand::Request(RequestMovement {
                movement_id: id,
                source: request.source,
                destination: request.destination,
                lines: request.lines.clone(),
                allow_negative: request.allow_negative,
                actor: request.actor,
                occurred_at: uow.now(),
            }))?;

            let outcome = match self.validate_movement(uow, &mut movement) {
                Err(rejection) => {
                    if movement.status() == MovementStatus::Requested {
                        movement.execute(&MovementCommand::Reject(RejectMovement {
                            movement_id: id,
                            reason: rejection.to_string(),
                            occurred_at: uow.now(),
                        }))?;
                    }
                    Err(rejection)
                }
                Ok(()) => Ok(()),
            };
            uow.put_movement(movement.clone());
            Ok((movement, outcome))
        })?;

        match outcome {
            Ok(()) => Ok(movement),
            Err(rejection) => {
                warn!(
                    movement = %movement.id_typed(),
                    reason = movement.rejection_reason().unwrap_or_default(),
                    "movement rejected"
                );
                Err(rejection.into())
            }
        }
    }

    /// Referential and availability checks. On `Err` the caller rejects the
    /// movement if validation did not already do so.
    fn validate_movement(
        &self,
        uow: &mut UnitOfWork<'_>,
        movement: &mut StockMovement,
    ) -> DomainResult<()> {
        let destination = movement
            .destination()
            .ok_or_else(|| DomainError::invariant("movement has no destination"))?;
        active_location(uow, destination)?;
        for line in movement.lines() {
            active_item(uow, line.item_id)?;
        }
        let source = resolve_source(
            uow,
            &self.config.routing,
            movement.requested_source(),
            Some(destination),
        )?;

        let availability = requested_per_item(movement.lines())
            .into_keys()
            .map(|item_id| SourceAvailability {
                item_id,
                available: stock_cache::get(uow, item_id, source),
                cache_version: stock_cache::version(uow, item_id, source),
            })
            .collect();

        let movement_id = movement.id_typed();
        let events = movement.execute(&MovementCommand::Validate(ValidateMovement {
            movement_id,
            resolved_source: source,
            availability,
            occurred_at: uow.now(),
        }))?;

        for event in events {
            match event {
                MovementEvent::Rejected(rejected) => {
                    return Err(match rejected.shortfalls.first() {
                        Some(shortfall) => shortfall.to_error(),
                        None => DomainError::validation(rejected.reason),
                    });
                }
                MovementEvent::Validated(validated) if !validated.overridden.is_empty() => {
                    for shortfall in &validated.overridden {
                        warn!(
                            movement = %movement_id,
                            item = %shortfall.item_id,
                            location = %shortfall.location_id,
                            requested = %shortfall.requested,
                            available = %shortfall.available,
                            "allow_negative override: source will go negative"
                        );
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Commit a validated movement.
    ///
    /// Fails with `Conflict` (and rejects the movement) when a source cache
    /// row changed since validation.
    #[instrument(skip(self), err)]
    pub fn commit_movement(&self, id: MovementId) -> EngineResult<StockMovement> {
        let outcome = self.transact(|uow| {
            let mut movement = uow
                .movement(id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("movement {id}")))?;
            let source = movement
                .source()
                .ok_or_else(|| DomainError::invariant(format!("movement {id} is not validated")))?;
            let destination = movement
                .destination()
                .ok_or_else(|| DomainError::invariant("movement has no destination"))?;

            if let Err(stale) = check_observed_versions(uow, &movement, source) {
                movement.execute(&MovementCommand::Reject(RejectMovement {
                    movement_id: id,
                    reason: format!("stale validation: {stale}"),
                    occurred_at: uow.now(),
                }))?;
                uow.put_movement(movement);
                return Ok(Err(stale));
            }

            let reference = references::allocate(uow, &self.config.references, DocumentKind::Issue);
            movement.execute(&MovementCommand::Commit(CommitMovement {
                movement_id: id,
                reference: reference.clone(),
                occurred_at: uow.now(),
            }))?;

            let actor = movement
                .requested_by()
                .ok_or_else(|| DomainError::invariant(format!("movement {id} has no requester")))?;
            for line in movement.lines() {
                active_item(uow, line.item_id)?;
                let cost = cost_engine::valuation(uow, line.item_id, line.quantity)?;
                ledger::record(
                    uow,
                    LedgerEntryDraft::new(
                        line.item_id,
                        TransactionKind::TransferOut,
                        line.quantity,
                        cost.unit_cost,
                        &reference,
                        actor,
                    )
                    .from_location(source),
                )?;
                ledger::record(
                    uow,
                    LedgerEntryDraft::new(
                        line.item_id,
                        TransactionKind::TransferIn,
                        line.quantity,
                        cost.unit_cost,
                        &reference,
                        actor,
                    )
                    .to_location(destination),
                )?;
            }

            info!(
                movement = %id,
                reference = %reference,
                source = %source,
                destination = %destination,
                lines = movement.lines().len(),
                "movement committed"
            );
            uow.put_movement(movement.clone());
            Ok(Ok(movement))
        })?;

        outcome.map_err(|stale| {
            warn!(movement = %id, error = %stale, "movement rejected at commit");
            EngineError::from(stale)
        })
    }

    /// Consume stock at a location (service, kitchen, housekeeping).
    #[instrument(
        skip(self, request),
        fields(item = %request.item_id, quantity = %request.quantity, actor = %request.actor),
        err
    )]
    pub fn consume(&self, request: ConsumptionRequest) -> EngineResult<ConsumptionRecord> {
        ensure_positive(request.quantity, "consumption quantity")?;
        self.transact(|uow| {
            active_item(uow, request.item_id)?;
            let cost = cost_engine::valuation(uow, request.item_id, request.quantity)?;
            let source = resolve_source(uow, &self.config.routing, request.location, None)?;
            ensure_available(uow, request.item_id, source, request.quantity)?;

            let reference =
                references::allocate(uow, &self.config.references, DocumentKind::Consumption);
            let mut draft = LedgerEntryDraft::new(
                request.item_id,
                TransactionKind::Consumption,
                request.quantity,
                cost.unit_cost,
                &reference,
                request.actor,
            )
            .from_location(source);
            if let Some(note) = &request.note {
                draft = draft.with_note(note);
            }
            let ledger_entry = ledger::record(uow, draft)?;

            let journal_entry = self.bridge.post_consumption(
                uow,
                &reference,
                cost.value,
                request.department.as_deref(),
                request.actor,
            )?;

            info!(
                reference = %reference,
                item = %request.item_id,
                location = %source,
                value = %cost.value,
                "stock consumed"
            );
            Ok(ConsumptionRecord {
                reference,
                ledger_entry,
                journal_entry,
            })
        })
    }
}

fn check_observed_versions(
    view: &impl StockView,
    movement: &StockMovement,
    source: LocationId,
) -> DomainResult<()> {
    for (item, observed) in movement.observed_versions() {
        ExpectedVersion::Exact(*observed).check(stock_cache::version(view, *item, source))?;
    }
    Ok(())
}
