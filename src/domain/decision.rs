//! Aggregated, tradeable decisions.

use chrono::NaiveDateTime;

use super::error::CryptofundError;
use super::opinion::Action;

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub asset: String,
    pub action: Action,
    /// Fraction of cash (buy) or of the held quantity (sell) to trade.
    pub size: f64,
    pub confidence: f64,
}

impl Decision {
    pub fn hold(asset: impl Into<String>, confidence: f64) -> Self {
        Decision {
            asset: asset.into(),
            action: Action::Hold,
            size: 0.0,
            confidence,
        }
    }

    pub fn validate(&self) -> Result<(), CryptofundError> {
        if !(0.0..=1.0).contains(&self.size) {
            return Err(self.invalid(format!("size {} outside [0, 1]", self.size)));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(self.invalid(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> CryptofundError {
        CryptofundError::InvalidDecision {
            asset: self.asset.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedDecision {
    pub timestamp: NaiveDateTime,
    pub decision: Decision,
}
