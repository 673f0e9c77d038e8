//! Backtest engine: replays a decision stream against a price book.
//!
//! The engine owns one [`PortfolioState`] for the duration of a call. Each
//! decision is priced at the close of the bar stamped exactly at its
//! timestamp; decisions without such a bar, or dated after the reference
//! timeline ends, are skipped and logged. After
//! every decision the portfolio is marked to market and the snapshot is
//! forward-filled onto the reference asset's timeline.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use super::decision::TimedDecision;
use super::error::CryptofundError;
use super::execution::{self, ExecutionOutcome, SkipReason};
use super::metrics::{self, Metrics};
use super::portfolio::{PortfolioState, Trade};
use super::price_series::PriceBook;

pub const DEFAULT_INITIAL_CASH: f64 = 100_000.0;
pub const DEFAULT_FEE_RATE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    /// Proportional fee charged on both buys and sells.
    pub fee_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_cash: DEFAULT_INITIAL_CASH,
            fee_rate: DEFAULT_FEE_RATE,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), CryptofundError> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(CryptofundError::config_invalid(
                "backtest",
                "initial_cash",
                format!("must be positive, got {}", self.initial_cash),
            ));
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(CryptofundError::config_invalid(
                "backtest",
                "fee_rate",
                format!("must be in [0, 1), got {}", self.fee_rate),
            ));
        }
        Ok(())
    }
}

/// One row of the result timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRow {
    pub timestamp: NaiveDateTime,
    pub portfolio_value: f64,
    pub cash: f64,
    pub holdings_value: f64,
    pub returns: f64,
    /// Percent.
    pub cumulative_returns: f64,
    /// Percent below the running peak, never positive.
    pub drawdown: f64,
}

impl TimelineRow {
    /// Row with the derived columns zeroed; see [`metrics::fill_derived_columns`].
    pub fn new(timestamp: NaiveDateTime, cash: f64, holdings_value: f64) -> Self {
        TimelineRow {
            timestamp,
            portfolio_value: cash + holdings_value,
            cash,
            holdings_value,
            returns: 0.0,
            cumulative_returns: 0.0,
            drawdown: 0.0,
        }
    }
}

/// Mark-to-market valuation taken right after a decision was processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub holdings_value: f64,
    pub portfolio_value: f64,
    pub holdings: BTreeMap<String, f64>,
}

impl Snapshot {
    fn capture(state: &PortfolioState, book: &PriceBook, timestamp: NaiveDateTime) -> Self {
        let holdings_value = state.holdings_value(|asset| book.latest_close(asset, timestamp));
        Snapshot {
            timestamp,
            cash: state.cash,
            holdings_value,
            portfolio_value: state.cash + holdings_value,
            holdings: state.holdings.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipCause {
    UnknownAsset,
    NoBar,
    /// Later than the last reference timestamp, so no timeline row could show it.
    AfterTimeline,
    InsufficientCash { required: f64, available: f64 },
    NothingToSell,
    ZeroNotional,
}

impl From<SkipReason> for SkipCause {
    fn from(reason: SkipReason) -> Self {
        match reason {
            SkipReason::InsufficientCash {
                required,
                available,
            } => SkipCause::InsufficientCash {
                required,
                available,
            },
            SkipReason::NothingToSell => SkipCause::NothingToSell,
            SkipReason::ZeroNotional => SkipCause::ZeroNotional,
        }
    }
}

impl fmt::Display for SkipCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipCause::UnknownAsset => f.write_str("asset has no price series"),
            SkipCause::NoBar => f.write_str("no bar at decision timestamp"),
            SkipCause::AfterTimeline => f.write_str("after the end of the reference timeline"),
            SkipCause::InsufficientCash {
                required,
                available,
            } => write!(f, "insufficient cash ({required:.2} required, {available:.2} available)"),
            SkipCause::NothingToSell => f.write_str("nothing to sell"),
            SkipCause::ZeroNotional => f.write_str("zero notional"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDecision {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub cause: SkipCause,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub timeline: Vec<TimelineRow>,
    pub trades: Vec<Trade>,
    pub skipped: Vec<SkippedDecision>,
    pub snapshots: Vec<Snapshot>,
    pub final_state: PortfolioState,
    pub metrics: Metrics,
}

/// Reject streams whose timestamps ever go backwards.
fn check_order(decisions: &[TimedDecision]) -> Result<(), CryptofundError> {
    match decisions
        .windows(2)
        .find(|pair| pair[1].timestamp < pair[0].timestamp)
    {
        Some(pair) => Err(CryptofundError::OutOfOrder {
            asset: pair[1].decision.asset.clone(),
            timestamp: pair[1].timestamp,
            previous: pair[0].timestamp,
        }),
        None => Ok(()),
    }
}

fn resolve_price(
    book: &PriceBook,
    asset: &str,
    timestamp: NaiveDateTime,
    timeline_end: Option<NaiveDateTime>,
) -> Result<f64, SkipCause> {
    if timeline_end.is_some_and(|end| timestamp > end) {
        return Err(SkipCause::AfterTimeline);
    }
    let series = book.get(asset).ok_or(SkipCause::UnknownAsset)?;
    series.close_at(timestamp).ok_or(SkipCause::NoBar)
}

/// Run a full backtest.
///
/// The configuration, ordering and every decision are validated before the
/// first trade is simulated, so a failed call has no partial result.
pub fn run_backtest(
    decisions: &[TimedDecision],
    book: &PriceBook,
    config: &BacktestConfig,
) -> Result<BacktestResult, CryptofundError> {
    config.validate()?;
    check_order(decisions)?;
    for timed in decisions {
        timed.decision.validate()?;
    }

    info!(
        decisions = decisions.len(),
        reference = book.reference_asset(),
        initial_cash = config.initial_cash,
        fee_rate = config.fee_rate,
        "running backtest"
    );

    let reference = book.reference_timeline();
    let timeline_end = reference.last().copied();

    let mut state = PortfolioState::new(config.initial_cash);
    let mut snapshots = Vec::with_capacity(decisions.len());
    let mut skipped = Vec::new();

    for timed in decisions {
        let timestamp = timed.timestamp;
        let decision = &timed.decision;

        let cause = match resolve_price(book, &decision.asset, timestamp, timeline_end) {
            Ok(price) => {
                match execution::execute(&mut state, decision, price, timestamp, config.fee_rate) {
                    ExecutionOutcome::Filled(trade) => {
                        debug!(
                            %timestamp,
                            asset = %trade.asset,
                            action = %trade.action,
                            quantity = trade.quantity,
                            price = trade.price,
                            cash = state.cash,
                            "filled"
                        );
                        None
                    }
                    ExecutionOutcome::Held => None,
                    ExecutionOutcome::Skipped(reason) => Some(SkipCause::from(reason)),
                }
            }
            Err(cause) => {
                warn!(%timestamp, asset = %decision.asset, %cause, "decision skipped");
                Some(cause)
            }
        };

        if let Some(cause) = cause {
            if !matches!(
                cause,
                SkipCause::UnknownAsset | SkipCause::NoBar | SkipCause::AfterTimeline
            ) {
                debug!(%timestamp, asset = %decision.asset, %cause, "decision not executed");
            }
            skipped.push(SkippedDecision {
                timestamp,
                asset: decision.asset.clone(),
                cause,
            });
        }

        snapshots.push(Snapshot::capture(&state, book, timestamp));
    }

    let timeline = build_timeline(&reference, &snapshots, config.initial_cash);
    let metrics = Metrics::compute(&timeline, &state.trades, config.initial_cash);

    info!(
        rows = timeline.len(),
        trades = state.trades.len(),
        skipped = skipped.len(),
        final_value = metrics.final_value,
        "backtest complete"
    );

    Ok(BacktestResult {
        timeline,
        trades: state.trades.clone(),
        skipped,
        snapshots,
        final_state: state,
        metrics,
    })
}

/// One row per reference timestamp, each carrying the last snapshot at or
/// before it. Rows before the first snapshot hold the initial cash.
fn build_timeline(
    reference: &[NaiveDateTime],
    snapshots: &[Snapshot],
    initial_cash: f64,
) -> Vec<TimelineRow> {
    let mut rows = Vec::with_capacity(reference.len());
    let mut next = 0usize;
    let mut current: Option<&Snapshot> = None;

    for &timestamp in reference {
        while next < snapshots.len() && snapshots[next].timestamp <= timestamp {
            current = Some(&snapshots[next]);
            next += 1;
        }
        rows.push(match current {
            Some(snap) => TimelineRow::new(timestamp, snap.cash, snap.holdings_value),
            None => TimelineRow::new(timestamp, initial_cash, 0.0),
        });
    }

    metrics::fill_derived_columns(&mut rows);
    rows
}
