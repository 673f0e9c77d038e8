//! Report adapter writing CSV tables and a JSON metrics summary.
//!
//! Output directory layout:
//! - `timeline.csv`: one row per reference timestamp
//! - `trades.csv`: the trade log
//! - `metrics.json`: summary metrics

use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::CryptofundError;
use crate::domain::ohlcv::format_timestamp;
use crate::ports::report_port::ReportPort;

pub const TIMELINE_FILE: &str = "timeline.csv";
pub const TRADES_FILE: &str = "trades.csv";
pub const METRICS_FILE: &str = "metrics.json";

#[derive(Serialize)]
struct TimelineRecord {
    timestamp: String,
    portfolio_value: f64,
    cash: f64,
    holdings_value: f64,
    returns: f64,
    cumulative_returns: f64,
    drawdown: f64,
}

#[derive(Serialize)]
struct TradeRecord<'a> {
    timestamp: String,
    asset: &'a str,
    action: String,
    quantity: f64,
    price: f64,
    cost_or_revenue: f64,
    fee: f64,
}

pub struct CsvReportAdapter;

fn csv_error(path: &Path, e: impl std::fmt::Display) -> CryptofundError {
    CryptofundError::Data {
        reason: format!("failed to write {}: {}", path.display(), e),
    }
}

impl CsvReportAdapter {
    fn write_timeline(result: &BacktestResult, path: &Path) -> Result<(), CryptofundError> {
        let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
        for row in &result.timeline {
            wtr.serialize(TimelineRecord {
                timestamp: format_timestamp(row.timestamp),
                portfolio_value: row.portfolio_value,
                cash: row.cash,
                holdings_value: row.holdings_value,
                returns: row.returns,
                cumulative_returns: row.cumulative_returns,
                drawdown: row.drawdown,
            })
            .map_err(|e| csv_error(path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_trades(result: &BacktestResult, path: &Path) -> Result<(), CryptofundError> {
        let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
        if result.trades.is_empty() {
            wtr.write_record([
                "timestamp",
                "asset",
                "action",
                "quantity",
                "price",
                "cost_or_revenue",
                "fee",
            ])
            .map_err(|e| csv_error(path, e))?;
        }
        for trade in &result.trades {
            wtr.serialize(TradeRecord {
                timestamp: format_timestamp(trade.timestamp),
                asset: &trade.asset,
                action: trade.action.to_string(),
                quantity: trade.quantity,
                price: trade.price,
                cost_or_revenue: trade.cost_or_revenue,
                fee: trade.fee,
            })
            .map_err(|e| csv_error(path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), CryptofundError> {
        fs::create_dir_all(output_dir)?;

        Self::write_timeline(result, &output_dir.join(TIMELINE_FILE))?;
        Self::write_trades(result, &output_dir.join(TRADES_FILE))?;

        let metrics_path = output_dir.join(METRICS_FILE);
        let json = serde_json::to_string_pretty(&result.metrics)
            .map_err(|e| csv_error(&metrics_path, e))?;
        fs::write(&metrics_path, json)?;

        info!(dir = %output_dir.display(), "report written");
        Ok(())
    }
}
