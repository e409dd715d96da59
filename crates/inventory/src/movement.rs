//! Stock movement (issue/transfer) aggregate.
//!
//! requested → validated → committed | rejected.
//!
//! The aggregate only decides; availability figures and resolved locations are
//! supplied by the movement engine, which also writes the transfer pair.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    ActorId, Aggregate, AggregateRoot, DomainError, ItemId, LocationId, MovementId,
    ensure_positive,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementStatus {
    Requested,
    Validated,
    Committed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
}

impl MovementLine {
    pub fn new(item_id: ItemId, quantity: Decimal) -> Self {
        Self { item_id, quantity }
    }
}

/// Quantity requested per item, summed across lines.
pub fn requested_per_item(lines: &[MovementLine]) -> BTreeMap<ItemId, Decimal> {
    let mut out = BTreeMap::new();
    for line in lines {
        *out.entry(line.item_id).or_insert(Decimal::ZERO) += line.quantity;
    }
    out
}

/// What the source holds for one item when the movement is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAvailability {
    pub item_id: ItemId,
    pub available: Decimal,
    /// Version of the (item, source) cache entry; 0 when no entry exists yet.
    pub cache_version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub requested: Decimal,
    pub available: Decimal,
}

impl Shortfall {
    pub fn to_error(&self) -> DomainError {
        DomainError::insufficient_stock(
            self.item_id,
            self.location_id,
            self.requested,
            self.available,
        )
    }
}

/// Aggregate root: StockMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    id: MovementId,
    requested_source: Option<LocationId>,
    source: Option<LocationId>,
    destination: Option<LocationId>,
    lines: Vec<MovementLine>,
    status: MovementStatus,
    allow_negative: bool,
    overridden: Vec<Shortfall>,
    observed_versions: BTreeMap<ItemId, u64>,
    reference: Option<String>,
    rejection_reason: Option<String>,
    requested_by: Option<ActorId>,
    requested_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl StockMovement {
    /// Create an empty, not-yet-requested aggregate instance.
    pub fn empty(id: MovementId) -> Self {
        Self {
            id,
            requested_source: None,
            source: None,
            destination: None,
            lines: Vec::new(),
            status: MovementStatus::Requested,
            allow_negative: false,
            overridden: Vec::new(),
            observed_versions: BTreeMap::new(),
            reference: None,
            rejection_reason: None,
            requested_by: None,
            requested_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MovementId {
        self.id
    }

    /// Source as given by the caller (`None` = default routing).
    pub fn requested_source(&self) -> Option<LocationId> {
        self.requested_source
    }

    /// Source after routing; set once validated (or rejected after routing).
    pub fn source(&self) -> Option<LocationId> {
        self.source
    }

    pub fn destination(&self) -> Option<LocationId> {
        self.destination
    }

    pub fn lines(&self) -> &[MovementLine] {
        &self.lines
    }

    pub fn status(&self) -> MovementStatus {
        self.status
    }

    pub fn allow_negative(&self) -> bool {
        self.allow_negative
    }

    /// Shortfalls the override let through.
    pub fn overridden_shortfalls(&self) -> &[Shortfall] {
        &self.overridden
    }

    pub fn observed_versions(&self) -> &BTreeMap<ItemId, u64> {
        &self.observed_versions
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn requested_by(&self) -> Option<ActorId> {
        self.requested_by
    }
}

impl AggregateRoot for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMovement {
    pub movement_id: MovementId,
    pub source: Option<LocationId>,
    pub destination: LocationId,
    pub lines: Vec<MovementLine>,
    pub allow_negative: bool,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ValidateMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateMovement {
    pub movement_id: MovementId,
    pub resolved_source: LocationId,
    pub availability: Vec<SourceAvailability>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CommitMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMovement {
    pub movement_id: MovementId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectMovement (referential failures found by the engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectMovement {
    pub movement_id: MovementId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementCommand {
    Request(RequestMovement),
    Validate(ValidateMovement),
    Commit(CommitMovement),
    Reject(RejectMovement),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequested {
    pub movement_id: MovementId,
    pub source: Option<LocationId>,
    pub destination: LocationId,
    pub lines: Vec<MovementLine>,
    pub allow_negative: bool,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementValidated {
    pub movement_id: MovementId,
    pub source: LocationId,
    pub observed_versions: BTreeMap<ItemId, u64>,
    /// Non-empty only when `allow_negative` was set.
    pub overridden: Vec<Shortfall>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCommitted {
    pub movement_id: MovementId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRejected {
    pub movement_id: MovementId,
    pub source: Option<LocationId>,
    pub reason: String,
    pub shortfalls: Vec<Shortfall>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementEvent {
    Requested(MovementRequested),
    Validated(MovementValidated),
    Committed(MovementCommitted),
    Rejected(MovementRejected),
}

impl Aggregate for StockMovement {
    type Command = MovementCommand;
    type Event = MovementEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MovementEvent::Requested(e) => {
                self.id = e.movement_id;
                self.requested_source = e.source;
                self.destination = Some(e.destination);
                self.lines = e.lines.clone();
                self.allow_negative = e.allow_negative;
                self.requested_by = Some(e.actor);
                self.requested_at = Some(e.occurred_at);
                self.status = MovementStatus::Requested;
                self.created = true;
            }
            MovementEvent::Validated(e) => {
                self.source = Some(e.source);
                self.observed_versions = e.observed_versions.clone();
                self.overridden = e.overridden.clone();
                self.status = MovementStatus::Validated;
            }
            MovementEvent::Committed(e) => {
                self.reference = Some(e.reference.clone());
                self.status = MovementStatus::Committed;
            }
            MovementEvent::Rejected(e) => {
                if e.source.is_some() {
                    self.source = e.source;
                }
                self.rejection_reason = Some(e.reason.clone());
                self.status = MovementStatus::Rejected;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MovementCommand::Request(cmd) => self.handle_request(cmd),
            MovementCommand::Validate(cmd) => self.handle_validate(cmd),
            MovementCommand::Commit(cmd) => self.handle_commit(cmd),
            MovementCommand::Reject(cmd) => self.handle_reject(cmd),
        }
    }
}

impl StockMovement {
    fn ensure_movement_id(&self, movement_id: MovementId) -> Result<(), DomainError> {
        if self.id != movement_id {
            return Err(DomainError::invariant("movement_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: MovementStatus, action: &str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("movement {}", self.id)));
        }
        if self.status != expected {
            return Err(DomainError::invariant(format!(
                "cannot {action} a movement in status {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_request(&self, cmd: &RequestMovement) -> Result<Vec<MovementEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("movement already exists"));
        }
        self.ensure_movement_id(cmd.movement_id)?;

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("movement requires at least one line"));
        }
        for line in &cmd.lines {
            ensure_positive(line.quantity, "movement quantity")?;
        }
        if cmd.source == Some(cmd.destination) {
            return Err(DomainError::validation(
                "source and destination must differ",
            ));
        }

        Ok(vec![MovementEvent::Requested(MovementRequested {
            movement_id: cmd.movement_id,
            source: cmd.source,
            destination: cmd.destination,
            lines: cmd.lines.clone(),
            allow_negative: cmd.allow_negative,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_validate(&self, cmd: &ValidateMovement) -> Result<Vec<MovementEvent>, DomainError> {
        self.ensure_status(MovementStatus::Requested, "validate")?;
        self.ensure_movement_id(cmd.movement_id)?;

        if self.destination == Some(cmd.resolved_source) {
            return Ok(vec![MovementEvent::Rejected(MovementRejected {
                movement_id: cmd.movement_id,
                source: Some(cmd.resolved_source),
                reason: "source and destination must differ".to_string(),
                shortfalls: Vec::new(),
                occurred_at: cmd.occurred_at,
            })]);
        }

        let mut shortfalls = Vec::new();
        let mut observed_versions = BTreeMap::new();
        for (item_id, requested) in requested_per_item(&self.lines) {
            let availability = cmd
                .availability
                .iter()
                .find(|a| a.item_id == item_id)
                .ok_or_else(|| {
                    DomainError::invariant(format!("no availability supplied for item {item_id}"))
                })?;
            observed_versions.insert(item_id, availability.cache_version);
            if availability.available < requested {
                shortfalls.push(Shortfall {
                    item_id,
                    location_id: cmd.resolved_source,
                    requested,
                    available: availability.available,
                });
            }
        }

        if !shortfalls.is_empty() && !self.allow_negative {
            let reason = shortfalls
                .iter()
                .map(|s| {
                    format!(
                        "item {} short at {}: requested {}, available {}",
                        s.item_id, s.location_id, s.requested, s.available
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Ok(vec![MovementEvent::Rejected(MovementRejected {
                movement_id: cmd.movement_id,
                source: Some(cmd.resolved_source),
                reason: format!("insufficient stock: {reason}"),
                shortfalls,
                occurred_at: cmd.occurred_at,
            })]);
        }

        Ok(vec![MovementEvent::Validated(MovementValidated {
            movement_id: cmd.movement_id,
            source: cmd.resolved_source,
            observed_versions,
            overridden: shortfalls,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_commit(&self, cmd: &CommitMovement) -> Result<Vec<MovementEvent>, DomainError> {
        self.ensure_status(MovementStatus::Validated, "commit")?;
        self.ensure_movement_id(cmd.movement_id)?;

        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("commit requires a reference code"));
        }

        Ok(vec![MovementEvent::Committed(MovementCommitted {
            movement_id: cmd.movement_id,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Open movements (requested, or validated but not yet committed) can be
    /// rejected.
    fn handle_reject(&self, cmd: &RejectMovement) -> Result<Vec<MovementEvent>, DomainError> {
        if self.status != MovementStatus::Validated {
            self.ensure_status(MovementStatus::Requested, "reject")?;
        }
        self.ensure_movement_id(cmd.movement_id)?;

        Ok(vec![MovementEvent::Rejected(MovementRejected {
            movement_id: cmd.movement_id,
            source: None,
            reason: cmd.reason.clone(),
            shortfalls: Vec::new(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct Fixture {
        movement: StockMovement,
        id: MovementId,
        item: ItemId,
        source: LocationId,
        destination: LocationId,
    }

    fn requested(qty: Decimal, allow_negative: bool) -> Fixture {
        let id = MovementId::new();
        let item = ItemId::new();
        let destination = LocationId::new();
        let mut movement = StockMovement::empty(id);
        movement
            .execute(&MovementCommand::Request(RequestMovement {
                movement_id: id,
                source: None,
                destination,
                lines: vec![MovementLine::new(item, qty)],
                allow_negative,
                actor: ActorId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        Fixture {
            movement,
            id,
            item,
            source: LocationId::new(),
            destination,
        }
    }

    fn validate(f: &mut Fixture, available: Decimal) -> Vec<MovementEvent> {
        f.movement
            .execute(&MovementCommand::Validate(ValidateMovement {
                movement_id: f.id,
                resolved_source: f.source,
                availability: vec![SourceAvailability {
                    item_id: f.item,
                    available,
                    cache_version: 4,
                }],
                occurred_at: Utc::now(),
            }))
            .unwrap()
    }

    #[test]
    fn request_rejects_empty_and_non_positive_lines() {
        let id = MovementId::new();
        let movement = StockMovement::empty(id);
        let mut cmd = RequestMovement {
            movement_id: id,
            source: None,
            destination: LocationId::new(),
            lines: vec![],
            allow_negative: false,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        };
        assert!(movement.handle(&MovementCommand::Request(cmd.clone())).is_err());

        cmd.lines = vec![MovementLine::new(ItemId::new(), dec!(0))];
        assert!(matches!(
            movement.handle(&MovementCommand::Request(cmd)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn request_rejects_same_source_and_destination() {
        let id = MovementId::new();
        let loc = LocationId::new();
        let err = StockMovement::empty(id)
            .handle(&MovementCommand::Request(RequestMovement {
                movement_id: id,
                source: Some(loc),
                destination: loc,
                lines: vec![MovementLine::new(ItemId::new(), dec!(1))],
                allow_negative: false,
                actor: ActorId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn sufficient_stock_validates_and_captures_versions() {
        let mut f = requested(dec!(20), false);
        validate(&mut f, dec!(50));
        assert_eq!(f.movement.status(), MovementStatus::Validated);
        assert_eq!(f.movement.source(), Some(f.source));
        assert_eq!(f.movement.observed_versions().get(&f.item), Some(&4));
    }

    #[test]
    fn shortfall_rejects_whole_movement() {
        let mut f = requested(dec!(20), false);
        let events = validate(&mut f, dec!(5));
        assert_eq!(f.movement.status(), MovementStatus::Rejected);
        match &events[0] {
            MovementEvent::Rejected(e) => {
                assert_eq!(e.shortfalls.len(), 1);
                assert_eq!(e.shortfalls[0].available, dec!(5));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(f.movement.rejection_reason().unwrap().contains("insufficient"));
    }

    #[test]
    fn override_records_shortfall_and_validates() {
        let mut f = requested(dec!(20), true);
        validate(&mut f, dec!(5));
        assert_eq!(f.movement.status(), MovementStatus::Validated);
        assert_eq!(f.movement.overridden_shortfalls().len(), 1);
    }

    #[test]
    fn lines_for_same_item_are_summed() {
        let item = ItemId::new();
        let totals = requested_per_item(&[
            MovementLine::new(item, dec!(3)),
            MovementLine::new(ItemId::new(), dec!(1)),
            MovementLine::new(item, dec!(4)),
        ]);
        assert_eq!(totals.get(&item), Some(&dec!(7)));
    }

    #[test]
    fn commit_requires_validation() {
        let mut f = requested(dec!(1), false);
        let commit = MovementCommand::Commit(CommitMovement {
            movement_id: f.id,
            reference: "ISS-000001".into(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            f.movement.handle(&commit),
            Err(DomainError::InvariantViolation(_))
        ));

        validate(&mut f, dec!(1));
        f.movement.execute(&commit).unwrap();
        assert_eq!(f.movement.status(), MovementStatus::Committed);
        assert_eq!(f.movement.reference(), Some("ISS-000001"));
        assert_eq!(f.movement.version(), 3);
        assert_ne!(f.movement.destination(), Some(f.source));
        assert_eq!(f.movement.destination(), Some(f.destination));
    }

    #[test]
    fn validated_movement_can_still_be_rejected() {
        let mut f = requested(dec!(2), false);
        validate(&mut f, dec!(5));
        f.movement
            .execute(&MovementCommand::Reject(RejectMovement {
                movement_id: f.id,
                reason: "stale validation".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert_eq!(f.movement.status(), MovementStatus::Rejected);
        assert_eq!(f.movement.source(), Some(f.source));
        assert_eq!(f.movement.rejection_reason(), Some("stale validation"));
    }
}
