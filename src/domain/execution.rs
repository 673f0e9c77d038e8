//! Trade execution and fill simulation.
//!
//! Fills happen at the bar close with a flat proportional fee on both sides.
//! Buys are all-or-nothing against available cash; sells are a fraction of
//! the held quantity and so can never exceed it.

use chrono::NaiveDateTime;

use super::decision::Decision;
use super::opinion::Action;
use super::portfolio::{PortfolioState, Trade};

/// Fee on a notional amount.
pub fn calculate_fee(notional: f64, fee_rate: f64) -> f64 {
    notional * fee_rate
}

/// Why a decision did not turn into a fill.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientCash { required: f64, available: f64 },
    NothingToSell,
    ZeroNotional,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Filled(Trade),
    Skipped(SkipReason),
    Held,
}

/// Buy `size` of available cash worth of `asset`.
///
/// Steps:
/// 1. spend = cash * size
/// 2. total_cost = spend * (1 + fee_rate)
/// 3. Reject if total_cost exceeds cash (no partial fill)
/// 4. quantity = spend / price; deduct total_cost; add holding
pub fn execute_buy(
    state: &mut PortfolioState,
    asset: &str,
    price: f64,
    timestamp: NaiveDateTime,
    size: f64,
    fee_rate: f64,
) -> ExecutionOutcome {
    let spend = state.cash * size;
    if spend <= 0.0 {
        return ExecutionOutcome::Skipped(SkipReason::ZeroNotional);
    }

    let fee = calculate_fee(spend, fee_rate);
    let total_cost = spend * (1.0 + fee_rate);
    if total_cost > state.cash {
        return ExecutionOutcome::Skipped(SkipReason::InsufficientCash {
            required: total_cost,
            available: state.cash,
        });
    }

    let quantity = spend / price;
    state.cash -= total_cost;
    state.add_holding(asset, quantity);

    let trade = Trade {
        timestamp,
        asset: asset.to_string(),
        action: Action::Buy,
        quantity,
        price,
        cost_or_revenue: total_cost,
        fee,
    };
    state.record_trade(trade.clone());
    ExecutionOutcome::Filled(trade)
}

/// Sell `size` of the held quantity of `asset`.
///
/// Steps:
/// 1. quantity = held * size; skip if nothing would be sold
/// 2. revenue = quantity * price * (1 - fee_rate)
/// 3. Credit revenue; reduce holding, removing it once empty
pub fn execute_sell(
    state: &mut PortfolioState,
    asset: &str,
    price: f64,
    timestamp: NaiveDateTime,
    size: f64,
    fee_rate: f64,
) -> ExecutionOutcome {
    let quantity = state.holding(asset) * size;
    if quantity <= 0.0 {
        return ExecutionOutcome::Skipped(SkipReason::NothingToSell);
    }

    let gross = quantity * price;
    let fee = calculate_fee(gross, fee_rate);
    let revenue = quantity * price * (1.0 - fee_rate);

    state.cash += revenue;
    state.reduce_holding(asset, quantity);

    let trade = Trade {
        timestamp,
        asset: asset.to_string(),
        action: Action::Sell,
        quantity,
        price,
        cost_or_revenue: revenue,
        fee,
    };
    state.record_trade(trade.clone());
    ExecutionOutcome::Filled(trade)
}

/// Execute a decision against a known close price.
pub fn execute(
    state: &mut PortfolioState,
    decision: &Decision,
    price: f64,
    timestamp: NaiveDateTime,
    fee_rate: f64,
) -> ExecutionOutcome {
    match decision.action {
        Action::Buy => execute_buy(
            state,
            &decision.asset,
            price,
            timestamp,
            decision.size,
            fee_rate,
        ),
        Action::Sell => execute_sell(
            state,
            &decision.asset,
            price,
            timestamp,
            decision.size,
            fee_rate,
        ),
        Action::Hold => ExecutionOutcome::Held,
    }
}
