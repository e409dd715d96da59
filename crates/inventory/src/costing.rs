//! Weighted-average costing.

use rust_decimal::Decimal;

use stockbook_core::round_money;

/// New unit cost after receiving `received_qty` units at `received_cost`.
///
/// A non-positive on-hand quantity contributes nothing, so the first receipt
/// (or one arriving after an overdraw) takes the received cost as-is. When the
/// combined quantity is zero the cost is left unchanged.
pub fn weighted_average_cost(
    on_hand_qty: Decimal,
    current_cost: Decimal,
    received_qty: Decimal,
    received_cost: Decimal,
) -> Decimal {
    let base = on_hand_qty.max(Decimal::ZERO);
    let total_qty = base + received_qty;
    if total_qty <= Decimal::ZERO {
        return current_cost;
    }
    round_money((base * current_cost + received_qty * received_cost) / total_qty)
}

/// Unit cost after backing out a cancelled receipt line.
///
/// Left unchanged when nothing remains or the remaining value would be
/// negative.
pub fn cost_after_cancellation(
    on_hand_qty: Decimal,
    current_cost: Decimal,
    cancelled_qty: Decimal,
    cancelled_cost: Decimal,
) -> Decimal {
    let remaining_value = on_hand_qty * current_cost - cancelled_qty * cancelled_cost;
    let remaining_qty = (on_hand_qty - cancelled_qty).max(Decimal::ZERO);
    if remaining_qty.is_zero() || remaining_value < Decimal::ZERO {
        return current_cost;
    }
    round_money(remaining_value / remaining_qty)
}
