//! Core domain types and logic.

pub mod ohlcv;
pub mod price_series;
pub mod opinion;
pub mod decision;
pub mod aggregator;
pub mod risk;
pub mod persona;
pub mod portfolio;
pub mod execution;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
