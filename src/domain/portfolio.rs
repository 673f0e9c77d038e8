//! Portfolio state and the trade log.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use super::opinion::Action;

/// An executed simulated fill.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub action: Action,
    pub quantity: f64,
    pub price: f64,
    /// Total cash spent including fee (buy) or net cash received (sell).
    pub cost_or_revenue: f64,
    pub fee: f64,
}

/// Cash and holdings for one backtest run.
///
/// Holdings are kept in asset order so that valuation sums are reproducible.
/// A position that is sold down to zero is removed rather than kept at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub cash: f64,
    pub initial_cash: f64,
    pub holdings: BTreeMap<String, f64>,
    pub trades: Vec<Trade>,
}

impl PortfolioState {
    pub fn new(initial_cash: f64) -> Self {
        PortfolioState {
            cash: initial_cash,
            initial_cash,
            holdings: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn holding(&self, asset: &str) -> f64 {
        self.holdings.get(asset).copied().unwrap_or(0.0)
    }

    pub fn add_holding(&mut self, asset: &str, quantity: f64) {
        *self.holdings.entry(asset.to_string()).or_insert(0.0) += quantity;
    }

    /// Reduce a holding, dropping the entry once it reaches zero.
    pub fn reduce_holding(&mut self, asset: &str, quantity: f64) {
        if let Some(held) = self.holdings.get_mut(asset) {
            *held -= quantity;
            if *held <= 0.0 {
                self.holdings.remove(asset);
            }
        }
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    /// Value of all holdings given a price lookup; assets without a known
    /// price contribute nothing.
    pub fn holdings_value<F>(&self, price_of: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.holdings
            .iter()
            .filter_map(|(asset, &quantity)| price_of(asset).map(|price| quantity * price))
            .sum()
    }
}
