//! Configuration loading and validation.
//!
//! Each section is read into its typed config with defaults for absent
//! keys. Present but unparsable values are rejected rather than replaced by
//! the default, and every range is checked before a run starts.

use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::aggregator::AggregatorConfig;
use crate::domain::backtest::BacktestConfig;
use crate::domain::error::CryptofundError;
use crate::domain::ohlcv::parse_timestamp;
use crate::domain::risk::RiskConfig;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    pub price_dir: PathBuf,
    /// Empty means every asset found in `price_dir`.
    pub assets: Vec<String>,
    pub reference_asset: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data: DataConfig,
    pub backtest: BacktestConfig,
    pub aggregator: AggregatorConfig,
    pub risk: RiskConfig,
    pub report_dir: Option<PathBuf>,
}

pub fn load_settings(config: &dyn ConfigPort) -> Result<Settings, CryptofundError> {
    Ok(Settings {
        data: load_data_config(config)?,
        backtest: load_backtest_config(config)?,
        aggregator: load_aggregator_config(config)?,
        risk: load_risk_config(config)?,
        report_dir: config
            .get_string("report", "output_dir")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from),
    })
}

pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, CryptofundError> {
    let defaults = BacktestConfig::default();
    let backtest = BacktestConfig {
        initial_cash: read_number(config, "backtest", "initial_cash", defaults.initial_cash)?,
        fee_rate: read_number(config, "backtest", "fee_rate", defaults.fee_rate)?,
    };
    backtest.validate()?;
    Ok(backtest)
}

pub fn load_aggregator_config(
    config: &dyn ConfigPort,
) -> Result<AggregatorConfig, CryptofundError> {
    let defaults = AggregatorConfig::default();
    let aggregator = AggregatorConfig {
        decision_threshold: read_number(
            config,
            "aggregator",
            "decision_threshold",
            defaults.decision_threshold,
        )?,
        max_position_size: read_number(
            config,
            "aggregator",
            "max_position_size",
            defaults.max_position_size,
        )?,
    };
    aggregator.validate()?;
    Ok(aggregator)
}

pub fn load_risk_config(config: &dyn ConfigPort) -> Result<RiskConfig, CryptofundError> {
    let defaults = RiskConfig::default();
    let risk = RiskConfig {
        enabled: config.get_bool("risk", "enabled", defaults.enabled),
        volatility_window: read_number(
            config,
            "risk",
            "volatility_window",
            defaults.volatility_window,
        )?,
        volatility_threshold_pct: read_number(
            config,
            "risk",
            "volatility_threshold_pct",
            defaults.volatility_threshold_pct,
        )?,
        confidence_haircut: read_number(
            config,
            "risk",
            "confidence_haircut",
            defaults.confidence_haircut,
        )?,
    };
    risk.validate()?;
    Ok(risk)
}

pub fn load_data_config(config: &dyn ConfigPort) -> Result<DataConfig, CryptofundError> {
    let price_dir = config
        .get_string("data", "price_dir")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CryptofundError::ConfigMissing {
            section: "data".into(),
            key: "price_dir".into(),
        })?;

    let assets = match config.get_string("data", "assets") {
        Some(raw) => parse_assets(&raw)?,
        None => Vec::new(),
    };

    let reference_asset = config
        .get_string("data", "reference_asset")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(reference) = &reference_asset {
        if !assets.is_empty() && !assets.contains(reference) {
            return Err(CryptofundError::config_invalid(
                "data",
                "reference_asset",
                format!("{reference} is not listed in assets"),
            ));
        }
    }

    let start = read_timestamp(config, "start")?;
    let end = read_timestamp(config, "end")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(CryptofundError::config_invalid(
                "data",
                "start",
                "start must not be after end",
            ));
        }
    }

    Ok(DataConfig {
        price_dir: PathBuf::from(price_dir.trim()),
        assets,
        reference_asset,
        start,
        end,
    })
}

/// Parse a comma-separated asset list, rejecting empty entries and duplicates.
fn parse_assets(raw: &str) -> Result<Vec<String>, CryptofundError> {
    let mut assets: Vec<String> = Vec::new();
    for entry in raw.split(',') {
        let asset = entry.trim();
        if asset.is_empty() {
            return Err(CryptofundError::config_invalid(
                "data",
                "assets",
                "empty entry in asset list",
            ));
        }
        if assets.iter().any(|a| a == asset) {
            return Err(CryptofundError::config_invalid(
                "data",
                "assets",
                format!("duplicate asset {asset}"),
            ));
        }
        assets.push(asset.to_string());
    }
    Ok(assets)
}

fn read_timestamp(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<NaiveDateTime>, CryptofundError> {
    match config.get_string("data", key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw).map(Some).ok_or_else(|| {
            CryptofundError::config_invalid(
                "data",
                key,
                format!("'{raw}' is not a date (expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)"),
            )
        }),
    }
}

fn read_number<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, CryptofundError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            CryptofundError::config_invalid(section, key, format!("'{raw}' is not a number"))
        }),
    }
}
