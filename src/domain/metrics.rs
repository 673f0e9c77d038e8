//! Timeline-derived columns and summary performance metrics.

use serde::Serialize;

use super::backtest::TimelineRow;
use super::opinion::Action;
use super::portfolio::Trade;

pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Fill `returns`, `cumulative_returns` and `drawdown` from `portfolio_value`.
///
/// Cumulative returns and drawdowns are percentages; `returns[0]` is 0.
pub fn fill_derived_columns(rows: &mut [TimelineRow]) {
    let mut previous: Option<f64> = None;
    let mut growth = 1.0_f64;
    let mut peak = f64::NEG_INFINITY;

    for row in rows.iter_mut() {
        let value = row.portfolio_value;
        row.returns = match previous {
            Some(prev) if prev > 0.0 => value / prev - 1.0,
            _ => 0.0,
        };
        growth *= 1.0 + row.returns;
        row.cumulative_returns = growth * 100.0 - 100.0;

        peak = peak.max(value);
        row.drawdown = if peak > 0.0 {
            (value - peak) / peak * 100.0
        } else {
            0.0
        };
        previous = Some(value);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub final_value: f64,
    /// Percent.
    pub total_return: f64,
    /// Percent, compounded to a 252-period year.
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Percent, never positive.
    pub max_drawdown: f64,
    /// Longest run of rows spent below the running peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub buy_trades: usize,
    pub sell_trades: usize,
    pub total_fees: f64,
}

impl Metrics {
    pub fn compute(timeline: &[TimelineRow], trades: &[Trade], initial_cash: f64) -> Self {
        let final_value = timeline
            .last()
            .map(|row| row.portfolio_value)
            .unwrap_or(initial_cash);

        let total_return = if initial_cash > 0.0 {
            (final_value / initial_cash - 1.0) * 100.0
        } else {
            0.0
        };

        let periods = timeline.len() as f64;
        let annualized_return = if periods > 0.0 {
            let growth = (1.0 + total_return / 100.0).powf(PERIODS_PER_YEAR / periods);
            if growth.is_finite() {
                (growth - 1.0) * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let returns: Vec<f64> = timeline.iter().map(|row| row.returns).collect();
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&returns);

        let max_drawdown = timeline
            .iter()
            .map(|row| row.drawdown)
            .fold(0.0_f64, f64::min);
        let max_drawdown_duration = compute_drawdown_duration(timeline);

        let buy_trades = trades.iter().filter(|t| t.action == Action::Buy).count();
        let sell_trades = trades.iter().filter(|t| t.action == Action::Sell).count();
        let total_fees = trades.iter().map(|t| t.fee).sum();

        Metrics {
            final_value,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: trades.len(),
            buy_trades,
            sell_trades,
            total_fees,
        }
    }
}

fn compute_drawdown_duration(timeline: &[TimelineRow]) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for row in timeline {
        if row.drawdown < 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Annualized Sharpe and Sortino ratios of a per-period return series.
///
/// Sharpe uses the sample standard deviation. Either ratio is 0 when its
/// deviation is zero or undefined.
fn compute_risk_adjusted(returns: &[f64]) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;

    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    let sharpe = if stddev > 0.0 && stddev.is_finite() {
        mean / stddev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r.powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside.sqrt();

    let sortino = if downside_stddev > 0.0 && downside_stddev.is_finite() {
        mean / downside_stddev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
