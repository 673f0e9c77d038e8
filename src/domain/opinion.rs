//! Analyst opinions and the buy/sell/hold action vocabulary.

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

use super::error::CryptofundError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown action '{0}' (expected buy, sell or hold)")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Action::Buy),
            "sell" => Ok(Action::Sell),
            "hold" => Ok(Action::Hold),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
        };
        f.pad(s)
    }
}

/// A single analyst's assessment of one asset at one evaluation point.
#[derive(Debug, Clone, PartialEq)]
pub struct Opinion {
    pub analyst: String,
    pub asset: String,
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
}

impl Opinion {
    pub fn new(
        analyst: impl Into<String>,
        asset: impl Into<String>,
        action: Action,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Result<Self, CryptofundError> {
        let opinion = Opinion {
            analyst: analyst.into(),
            asset: asset.into(),
            action,
            confidence,
            reasoning: reasoning.into(),
        };
        opinion.validate()?;
        Ok(opinion)
    }

    /// Build an opinion from a raw action string, as read from files or replies.
    pub fn parse(
        analyst: impl Into<String>,
        asset: impl Into<String>,
        action: &str,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Result<Self, CryptofundError> {
        let analyst = analyst.into();
        let asset = asset.into();
        let action = action.parse::<Action>().map_err(|e| CryptofundError::InvalidOpinion {
            analyst: analyst.clone(),
            asset: asset.clone(),
            reason: e.to_string(),
        })?;
        Opinion::new(analyst, asset, action, confidence, reasoning)
    }

    /// Out-of-range confidences are rejected, never clamped.
    pub fn validate(&self) -> Result<(), CryptofundError> {
        if self.asset.trim().is_empty() {
            return Err(self.invalid("asset must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(self.invalid(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> CryptofundError {
        CryptofundError::InvalidOpinion {
            analyst: self.analyst.clone(),
            asset: self.asset.clone(),
            reason: reason.into(),
        }
    }
}

/// An opinion stamped with its evaluation point.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedOpinion {
    pub timestamp: NaiveDateTime,
    pub opinion: Opinion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_from_str_is_case_insensitive() {
        assert_eq!("BUY".parse::<Action>().unwrap(), Action::Buy);
        assert_eq!(" Sell ".parse::<Action>().unwrap(), Action::Sell);
        assert_eq!("hold".parse::<Action>().unwrap(), Action::Hold);
    }

    #[test]
    fn action_from_str_rejects_unknown() {
        let err = "short".parse::<Action>().unwrap_err();
        assert_eq!(err.0, "short");
    }

    #[test]
    fn action_display_round_trips() {
        for action in [Action::Buy, Action::Sell, Action::Hold] {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn new_accepts_boundaries() {
        assert!(Opinion::new("saylor", "BTC", Action::Buy, 0.0, "").is_ok());
        assert!(Opinion::new("saylor", "BTC", Action::Buy, 1.0, "").is_ok());
    }

    #[test]
    fn new_rejects_confidence_above_one() {
        let err = Opinion::new("saylor", "BTC", Action::Buy, 1.2, "").unwrap_err();
        assert!(matches!(err, CryptofundError::InvalidOpinion { analyst, .. } if analyst == "saylor"));
    }

    #[test]
    fn new_rejects_negative_and_nan_confidence() {
        assert!(Opinion::new("a", "BTC", Action::Sell, -0.1, "").is_err());
        assert!(Opinion::new("a", "BTC", Action::Sell, f64::NAN, "").is_err());
    }

    #[test]
    fn new_rejects_empty_asset() {
        assert!(Opinion::new("a", "  ", Action::Hold, 0.5, "").is_err());
    }

    #[test]
    fn parse_rejects_unknown_action() {
        let err = Opinion::parse("musk", "DOGE", "moon", 0.9, "").unwrap_err();
        assert!(
            matches!(err, CryptofundError::InvalidOpinion { reason, .. } if reason.contains("moon"))
        );
    }
}
