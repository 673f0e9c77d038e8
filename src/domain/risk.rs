//! Volatility-based confidence haircut applied to opinions before aggregation.

use chrono::NaiveDateTime;
use tracing::debug;

use super::error::CryptofundError;
use super::opinion::Opinion;
use super::price_series::PriceBook;

pub const DEFAULT_VOLATILITY_WINDOW: usize = 30;
pub const DEFAULT_VOLATILITY_THRESHOLD_PCT: f64 = 50.0;
pub const DEFAULT_CONFIDENCE_HAIRCUT: f64 = 0.8;

const PERIODS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub enabled: bool,
    pub volatility_window: usize,
    pub volatility_threshold_pct: f64,
    pub confidence_haircut: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            enabled: false,
            volatility_window: DEFAULT_VOLATILITY_WINDOW,
            volatility_threshold_pct: DEFAULT_VOLATILITY_THRESHOLD_PCT,
            confidence_haircut: DEFAULT_CONFIDENCE_HAIRCUT,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), CryptofundError> {
        if self.volatility_window < 2 {
            return Err(CryptofundError::config_invalid(
                "risk",
                "volatility_window",
                format!("must be at least 2, got {}", self.volatility_window),
            ));
        }
        if !self.volatility_threshold_pct.is_finite() || self.volatility_threshold_pct < 0.0 {
            return Err(CryptofundError::config_invalid(
                "risk",
                "volatility_threshold_pct",
                format!("must be non-negative, got {}", self.volatility_threshold_pct),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_haircut) {
            return Err(CryptofundError::config_invalid(
                "risk",
                "confidence_haircut",
                format!("must be in [0, 1], got {}", self.confidence_haircut),
            ));
        }
        Ok(())
    }
}

/// Annualized volatility, in percent, of the last `window` close-to-close
/// returns. `None` until `window + 1` closes are available.
pub fn annualized_volatility_pct(closes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || closes.len() < window + 1 {
        return None;
    }
    let tail = &closes[closes.len() - window - 1..];
    let returns: Vec<f64> = tail.windows(2).map(|w| w[1] / w[0] - 1.0).collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let vol = variance.sqrt() * PERIODS_PER_YEAR.sqrt() * 100.0;
    vol.is_finite().then_some(vol)
}

/// Scale the confidence of opinions on volatile assets.
///
/// Volatility is measured on bars at or before `at`. Assets without enough
/// history, or unknown to the book, pass through unchanged.
pub fn apply_volatility_haircut(
    opinions: &[Opinion],
    book: &PriceBook,
    at: NaiveDateTime,
    config: &RiskConfig,
) -> Vec<Opinion> {
    if !config.enabled {
        return opinions.to_vec();
    }

    opinions
        .iter()
        .map(|opinion| {
            let vol = book.get(&opinion.asset).and_then(|series| {
                let closes: Vec<f64> = series.bars_until(at).iter().map(|b| b.close).collect();
                annualized_volatility_pct(&closes, config.volatility_window)
            });
            match vol {
                Some(vol) if vol > config.volatility_threshold_pct => {
                    debug!(
                        analyst = %opinion.analyst,
                        asset = %opinion.asset,
                        volatility = vol,
                        "high volatility, reducing confidence"
                    );
                    Opinion {
                        confidence: opinion.confidence * config.confidence_haircut,
                        ..opinion.clone()
                    }
                }
                _ => opinion.clone(),
            }
        })
        .collect()
}
