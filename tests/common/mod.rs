#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use cryptofund::domain::backtest::BacktestConfig;
use cryptofund::domain::decision::{Decision, TimedDecision};
use cryptofund::domain::error::CryptofundError;
pub use cryptofund::domain::ohlcv::OhlcvBar;
use cryptofund::domain::opinion::{Action, Opinion, TimedOpinion};
use cryptofund::domain::price_series::{AssetSeries, PriceBook};
use cryptofund::ports::data_port::DataPort;
use cryptofund::ports::signal_port::SignalPort;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

pub struct MockDataPort {
    pub data: BTreeMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, asset: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(asset.to_string(), bars);
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        asset: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, CryptofundError> {
        if let Some(reason) = self.errors.get(asset) {
            return Err(CryptofundError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(asset)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|b| start.is_none_or(|s| b.timestamp >= s))
            .filter(|b| end.is_none_or(|e| b.timestamp <= e))
            .collect())
    }

    fn list_assets(&self) -> Result<Vec<String>, CryptofundError> {
        Ok(self.data.keys().cloned().collect())
    }
}

/// Replies with a fixed text per asset, recording every prompt it receives.
pub struct MockSignalPort {
    pub replies: HashMap<String, String>,
    pub prompts: RefCell<Vec<String>>,
}

impl MockSignalPort {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn reply(mut self, asset: &str, reply: &str) -> Self {
        self.replies.insert(asset.to_string(), reply.to_string());
        self
    }
}

impl SignalPort for MockSignalPort {
    fn complete(&self, prompt: &str) -> Result<String, CryptofundError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.replies
            .iter()
            .find(|(asset, _)| prompt.contains(&format!("Asset: {asset}\n")))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| CryptofundError::Signal {
                reason: "no scripted reply".into(),
            })
    }
}

pub fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn day(i: usize) -> NaiveDateTime {
    ts(2024, 1, 1) + Duration::days(i as i64)
}

pub fn make_bar(asset: &str, timestamp: NaiveDateTime, close: f64) -> OhlcvBar {
    OhlcvBar {
        asset: asset.to_string(),
        timestamp,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1000.0,
    }
}

/// Daily bars from 2024-01-01, one per close.
pub fn bars_from_closes(asset: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(asset, day(i), close))
        .collect()
}

pub fn generate_bars(asset: &str, count: usize, start_price: f64) -> Vec<OhlcvBar> {
    (0..count)
        .map(|i| make_bar(asset, day(i), start_price + i as f64))
        .collect()
}

pub fn make_book(series: Vec<(&str, Vec<OhlcvBar>)>) -> PriceBook {
    let series = series
        .into_iter()
        .map(|(asset, bars)| AssetSeries::new(asset.to_string(), bars).unwrap())
        .collect();
    PriceBook::new(series).unwrap()
}

pub fn make_opinion(analyst: &str, asset: &str, action: Action, confidence: f64) -> Opinion {
    Opinion::new(analyst, asset, action, confidence, "").unwrap()
}

pub fn timed_opinion(
    timestamp: NaiveDateTime,
    analyst: &str,
    asset: &str,
    action: Action,
    confidence: f64,
) -> TimedOpinion {
    TimedOpinion {
        timestamp,
        opinion: make_opinion(analyst, asset, action, confidence),
    }
}

pub fn decision(
    timestamp: NaiveDateTime,
    asset: &str,
    action: Action,
    size: f64,
) -> TimedDecision {
    TimedDecision {
        timestamp,
        decision: Decision {
            asset: asset.to_string(),
            action,
            size,
            confidence: 0.9,
        },
    }
}

pub fn backtest_config(initial_cash: f64, fee_rate: f64) -> BacktestConfig {
    BacktestConfig {
        initial_cash,
        fee_rate,
    }
}
