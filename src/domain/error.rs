//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for cryptofund.
#[derive(Debug, thiserror::Error)]
pub enum CryptofundError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no price data for {asset}")]
    NoData { asset: String },

    #[error("no price series to simulate against")]
    EmptyPriceBook,

    #[error("invalid bar for {asset} at {timestamp}: {reason}")]
    InvalidBar {
        asset: String,
        timestamp: NaiveDateTime,
        reason: String,
    },

    #[error("invalid opinion from {analyst} on {asset}: {reason}")]
    InvalidOpinion {
        analyst: String,
        asset: String,
        reason: String,
    },

    #[error("invalid decision for {asset}: {reason}")]
    InvalidDecision { asset: String, reason: String },

    #[error("decision for {asset} at {timestamp} is earlier than the preceding decision at {previous}")]
    OutOfOrder {
        asset: String,
        timestamp: NaiveDateTime,
        previous: NaiveDateTime,
    },

    #[error("reply from {analyst} on {asset} could not be parsed: {reason}")]
    SignalParse {
        analyst: String,
        asset: String,
        reason: String,
    },

    #[error("signal source error: {reason}")]
    Signal { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CryptofundError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        CryptofundError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&CryptofundError> for std::process::ExitCode {
    fn from(err: &CryptofundError) -> Self {
        let code: u8 = match err {
            CryptofundError::Io(_) => 1,
            CryptofundError::ConfigParse { .. }
            | CryptofundError::ConfigMissing { .. }
            | CryptofundError::ConfigInvalid { .. }
            | CryptofundError::NoData { .. }
            | CryptofundError::EmptyPriceBook => 2,
            CryptofundError::Data { .. }
            | CryptofundError::InvalidBar { .. }
            | CryptofundError::Signal { .. } => 3,
            CryptofundError::InvalidOpinion { .. }
            | CryptofundError::InvalidDecision { .. }
            | CryptofundError::OutOfOrder { .. }
            | CryptofundError::SignalParse { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
