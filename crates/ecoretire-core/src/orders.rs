//! Cheapest-first and budget-bounded order selection over sell orders read from the ledger.

use crate::money::{ceil_div, decimal_string_to_micro, floor_div, micro_to_decimal_string, MICRO};
use crate::types::SellOrder;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct SelectedOrder {
    pub order_id: String,
    /// 6-decimal quantity string taken from this order.
    pub quantity: String,
    /// Micro-units of `payment_denom` charged for this order's slice.
    pub cost_micro: u128,
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub orders: Vec<SelectedOrder>,
    /// Total micro-quantity of credits selected.
    pub total_quantity_micro: u128,
    pub total_cost_micro: u128,
    pub payment_denom: String,
    pub insufficient_supply: bool,
    pub remaining_budget_micro: Option<u128>,
    pub exhausted_budget: bool,
}

fn credit_type_matches(credit_type: Option<&str>, order: &SellOrder) -> bool {
    match credit_type {
        None => true,
        Some("carbon") => order.credit_class_type == "C",
        Some("biodiversity") => order.credit_class_type != "C",
        Some(_) => true,
    }
}

fn choose_denom(preferred_denom: Option<&str>, allowed_denoms: &[String], native_denom: &str) -> String {
    if let Some(preferred) = preferred_denom {
        if allowed_denoms.iter().any(|d| d == preferred) {
            return preferred.to_string();
        }
    }
    if allowed_denoms.iter().any(|d| d == native_denom) {
        return native_denom.to_string();
    }
    allowed_denoms
        .first()
        .cloned()
        .unwrap_or_else(|| native_denom.to_string())
}

/// Filters and sorts orders ascending by ask amount, preserving original order on ties.
fn eligible_sorted<'a>(
    orders: &'a [SellOrder],
    credit_type: Option<&str>,
    denom: &str,
    now: DateTime<Utc>,
) -> Vec<&'a SellOrder> {
    let mut eligible: Vec<(usize, &SellOrder)> = orders
        .iter()
        .enumerate()
        .filter(|(_, o)| {
            !o.disable_auto_retire
                && o.ask_denom == denom
                && credit_type_matches(credit_type, o)
                && o.expiration.map(|exp| exp > now).unwrap_or(true)
        })
        .collect();
    eligible.sort_by(|(ia, a), (ib, b)| a.ask_amount.cmp(&b.ask_amount).then(ia.cmp(ib)));
    eligible.into_iter().map(|(_, o)| o).collect()
}

pub fn select_best_orders(
    orders: &[SellOrder],
    credit_type: Option<&str>,
    target_quantity_micro: u128,
    preferred_denom: Option<&str>,
    allowed_denoms: &[String],
    native_denom: &str,
    now: DateTime<Utc>,
) -> SelectionResult {
    let denom = choose_denom(preferred_denom, allowed_denoms, native_denom);
    let sorted = eligible_sorted(orders, credit_type, &denom, now);

    let mut selected = Vec::new();
    let mut remaining = target_quantity_micro;
    let mut total_cost: u128 = 0;
    let mut total_qty: u128 = 0;

    for order in sorted {
        if remaining == 0 {
            break;
        }
        let available = decimal_string_to_micro(&order.quantity).unwrap_or(0);
        if available == 0 {
            continue;
        }
        let take = available.min(remaining);
        let cost = ceil_div(order.ask_amount * take, MICRO);
        selected.push(SelectedOrder {
            order_id: order.id.clone(),
            quantity: micro_to_decimal_string(take),
            cost_micro: cost,
        });
        total_cost += cost;
        total_qty += take;
        remaining -= take;
    }

    SelectionResult {
        orders: selected,
        total_quantity_micro: total_qty,
        total_cost_micro: total_cost,
        payment_denom: denom,
        insufficient_supply: remaining > 0,
        remaining_budget_micro: None,
        exhausted_budget: false,
    }
}

pub fn select_orders_for_budget(
    orders: &[SellOrder],
    credit_type: Option<&str>,
    budget_micro: u128,
    preferred_denom: Option<&str>,
    allowed_denoms: &[String],
    native_denom: &str,
    now: DateTime<Utc>,
) -> SelectionResult {
    let denom = choose_denom(preferred_denom, allowed_denoms, native_denom);
    let sorted = eligible_sorted(orders, credit_type, &denom, now);

    let mut selected = Vec::new();
    let mut remaining_budget = budget_micro;
    let mut total_cost: u128 = 0;
    let mut total_qty: u128 = 0;

    for order in sorted {
        if remaining_budget == 0 {
            break;
        }
        if order.ask_amount == 0 {
            continue;
        }
        let available = decimal_string_to_micro(&order.quantity).unwrap_or(0);
        if available == 0 {
            continue;
        }
        let affordable = floor_div(remaining_budget * MICRO, order.ask_amount);
        let take = available.min(affordable);
        if take == 0 {
            continue;
        }
        let cost = ceil_div(order.ask_amount * take, MICRO).min(remaining_budget);
        selected.push(SelectedOrder {
            order_id: order.id.clone(),
            quantity: micro_to_decimal_string(take),
            cost_micro: cost,
        });
        total_cost += cost;
        total_qty += take;
        remaining_budget -= cost;
    }

    SelectionResult {
        orders: selected,
        total_quantity_micro: total_qty,
        total_cost_micro: total_cost,
        payment_denom: denom,
        insufficient_supply: false,
        remaining_budget_micro: Some(remaining_budget),
        exhausted_budget: remaining_budget == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, ask: u128, qty: &str) -> SellOrder {
        SellOrder {
            id: id.to_string(),
            batch_denom: "C01-001".to_string(),
            quantity: qty.to_string(),
            ask_amount: ask,
            ask_denom: "uusd".to_string(),
            disable_auto_retire: false,
            expiration: None,
            credit_class_type: "C".to_string(),
        }
    }

    #[test]
    fn cheapest_first_fill_across_three_orders() {
        let orders = vec![
            order("expensive", 2200, "2"),
            order("cheapest", 1000, "1"),
            order("mid", 1500, "3"),
        ];
        let result = select_best_orders(
            &orders,
            None,
            decimal_string_to_micro("3.5").unwrap(),
            None,
            &["uusd".to_string()],
            "uusd",
            Utc::now(),
        );
        assert_eq!(result.orders.len(), 2);
        assert_eq!(result.orders[0].order_id, "cheapest");
        assert_eq!(result.orders[0].quantity, "1.000000");
        assert_eq!(result.orders[1].order_id, "mid");
        assert_eq!(result.orders[1].quantity, "2.500000");
        assert_eq!(result.total_cost_micro, 4_750);
        assert!(!result.insufficient_supply);
    }

    #[test]
    fn budget_bounded_selection_never_overspends() {
        // The cheapest order alone (1000/unit, 5 units available) can absorb the
        // full 3500-micro budget before "pricier" is ever touched: affordable =
        // floor(3500 * 1e6 / 1000) = 3_500_000, which is below its 5_000_000
        // available quantity, so the loop exhausts the budget on one order.
        let orders = vec![order("cheap", 1000, "5"), order("pricier", 2000, "5")];
        let result = select_orders_for_budget(
            &orders,
            None,
            3500,
            None,
            &["uusd".to_string()],
            "uusd",
            Utc::now(),
        );
        assert_eq!(result.total_cost_micro, 3500);
        assert_eq!(result.total_quantity_micro, decimal_string_to_micro("3.5").unwrap());
        assert_eq!(result.orders.len(), 1);
        assert_eq!(result.orders[0].order_id, "cheap");
        assert_eq!(result.remaining_budget_micro, Some(0));
        let total_check: u128 = result.orders.iter().map(|o| o.cost_micro).sum();
        assert!(total_check <= 3500);
    }

    #[test]
    fn insufficient_supply_flag_set_when_orders_exhausted() {
        let orders = vec![order("only", 1000, "1")];
        let result = select_best_orders(
            &orders,
            None,
            decimal_string_to_micro("5").unwrap(),
            None,
            &["uusd".to_string()],
            "uusd",
            Utc::now(),
        );
        assert!(result.insufficient_supply);
    }
}
