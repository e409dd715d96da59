//! Weighted-average cost maintenance.
//!
//! Runs inside the caller's unit of work, before the matching ledger entry is
//! recorded, so the on-hand quantity it reads excludes the movement itself.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use stockbook_core::{DomainError, DomainResult, ItemId, value_of};
use stockbook_inventory::{cost_after_cancellation, weighted_average_cost};

use crate::store::{StockView, UnitOfWork};

/// Unit cost before and after a costing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostChange {
    pub item_id: ItemId,
    pub before: Decimal,
    pub after: Decimal,
}

/// Blend a receipt into the item's unit cost.
pub fn apply_receipt(
    uow: &mut UnitOfWork<'_>,
    item: ItemId,
    received_qty: Decimal,
    received_cost: Decimal,
) -> DomainResult<CostChange> {
    let (on_hand, before) = current(uow, item)?;
    let after = weighted_average_cost(on_hand, before, received_qty, received_cost);
    set(uow, item, before, after)
}

/// Take a cancelled receipt back out of the unit cost.
pub fn reverse_receipt(
    uow: &mut UnitOfWork<'_>,
    item: ItemId,
    cancelled_qty: Decimal,
    cancelled_cost: Decimal,
) -> DomainResult<CostChange> {
    let (on_hand, before) = current(uow, item)?;
    let after = cost_after_cancellation(on_hand, before, cancelled_qty, cancelled_cost);
    set(uow, item, before, after)
}

/// Unit cost and total value of an outgoing quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Valuation {
    pub unit_cost: Decimal,
    pub value: Decimal,
}

impl Valuation {
    /// `quantity` units at a caller-supplied cost.
    pub fn at(quantity: Decimal, unit_cost: Decimal) -> Self {
        Self {
            unit_cost,
            value: value_of(quantity, unit_cost),
        }
    }
}

/// Value `quantity` units of `item` at its current weighted-average cost.
pub fn valuation(view: &impl StockView, item: ItemId, quantity: Decimal) -> DomainResult<Valuation> {
    let (_, cost) = current(view, item)?;
    Ok(Valuation::at(quantity, cost))
}

fn current(view: &impl StockView, item: ItemId) -> DomainResult<(Decimal, Decimal)> {
    view.item(item)
        .map(|i| (i.global_quantity(), i.unit_cost()))
        .ok_or_else(|| DomainError::not_found(format!("item {item}")))
}

fn set(
    uow: &mut UnitOfWork<'_>,
    item: ItemId,
    before: Decimal,
    after: Decimal,
) -> DomainResult<CostChange> {
    if before != after {
        let now = uow.now();
        uow.item_mut(item)?.set_unit_cost(after, now);
        debug!(item = %item, before = %before, after = %after, "unit cost updated");
    }
    Ok(CostChange {
        item_id: item,
        before,
        after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::store::{InMemoryStockStore, StockStore};
    use rust_decimal_macros::dec;
    use stockbook_core::Entity;
    use stockbook_inventory::Item;

    fn store_with(qty: Decimal, cost: Decimal) -> (InMemoryStockStore, ItemId) {
        let store = InMemoryStockStore::new();
        let item = Item::new(ItemId::new(), "COF-01", "Coffee", "kg").with_unit_cost(cost);
        let id = item.id();
        store
            .transact(|uow| {
                uow.insert_item(item);
                let now = uow.now();
                uow.item_mut(id)?.set_global_quantity(qty, now);
                Ok::<_, EngineError>(())
            })
            .unwrap();
        (store, id)
    }

    #[test]
    fn receipt_blends_cost() {
        let (store, item) = store_with(dec!(10), dec!(100));
        let change = store
            .transact(|uow| apply_receipt(uow, item, dec!(10), dec!(120)).map_err(EngineError::from))
            .unwrap();
        assert_eq!(change.before, dec!(100));
        assert_eq!(change.after, dec!(110));
        let outgoing = store.read(|s| valuation(s, item, dec!(2))).unwrap().unwrap();
        assert_eq!(outgoing.unit_cost, dec!(110));
        assert_eq!(outgoing.value, dec!(220));
    }

    #[test]
    fn cancellation_restores_previous_cost() {
        let (store, item) = store_with(dec!(20), dec!(110));
        let change = store
            .transact(|uow| {
                reverse_receipt(uow, item, dec!(10), dec!(120)).map_err(EngineError::from)
            })
            .unwrap();
        assert_eq!(change.after, dec!(100));
    }

    #[test]
    fn unknown_item_is_not_found() {
        let store = InMemoryStockStore::new();
        let result = store.transact(|uow| {
            apply_receipt(uow, ItemId::new(), dec!(1), dec!(1)).map_err(EngineError::from)
        });
        assert!(matches!(
            result,
            Err(EngineError::Domain(DomainError::NotFound(_)))
        ));
    }

    #[test]
    fn outgoing_value_is_rounded_to_cents() {
        let (store, item) = store_with(dec!(3), dec!(3.33));
        let outgoing = store.read(|s| valuation(s, item, dec!(0.5))).unwrap().unwrap();
        assert_eq!(outgoing.value, dec!(1.67));
        assert_eq!(Valuation::at(dec!(2), dec!(18.25)).value, dec!(36.5));
    }
}
