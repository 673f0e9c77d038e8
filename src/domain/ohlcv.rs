//! OHLCV bar representation and timestamp parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::error::CryptofundError;

/// Canonical timestamp format used in reports and error messages.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub asset: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// Normalized bars carry finite, non-negative fields and a strictly positive close.
    pub fn validate(&self) -> Result<(), CryptofundError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(self.invalid(format!("{name} must be finite and non-negative")));
            }
        }
        if self.close <= 0.0 {
            return Err(self.invalid("close must be positive"));
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> CryptofundError {
        CryptofundError::InvalidBar {
            asset: self.asset.clone(),
            timestamp: self.timestamp,
            reason: reason.into(),
        }
    }
}

/// Parse a bar or signal timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, a bare `YYYY-MM-DD`
/// (midnight) or integer epoch milliseconds as exported by exchanges.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = value.parse().ok()?;
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc());
    }
    None
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
