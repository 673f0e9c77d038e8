//! JSON files of timed opinions and decisions.
//!
//! Both are arrays of flat records. Timestamps are either strings in any
//! format [`parse_timestamp`] accepts or integer epoch milliseconds.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::domain::decision::{Decision, TimedDecision};
use crate::domain::error::CryptofundError;
use crate::domain::ohlcv::{format_timestamp, parse_timestamp};
use crate::domain::opinion::{Action, Opinion, TimedOpinion};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimestampField {
    Text(String),
    Millis(i64),
}

impl TimestampField {
    fn resolve(&self, path: &Path, index: usize) -> Result<NaiveDateTime, CryptofundError> {
        let parsed = match self {
            TimestampField::Text(text) => parse_timestamp(text),
            TimestampField::Millis(ms) => DateTime::from_timestamp_millis(*ms).map(|dt| dt.naive_utc()),
        };
        parsed.ok_or_else(|| CryptofundError::Data {
            reason: format!("{}: record {}: invalid timestamp", path.display(), index),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpinionRecord {
    timestamp: TimestampField,
    analyst: String,
    asset: String,
    action: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct DecisionRecord {
    timestamp: TimestampField,
    asset: String,
    action: String,
    size: f64,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct DecisionOut<'a> {
    timestamp: String,
    asset: &'a str,
    action: String,
    size: f64,
    confidence: f64,
}

fn read_records<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, CryptofundError> {
    let content = fs::read_to_string(path).map_err(|e| CryptofundError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    serde_json::from_str(&content).map_err(|e| CryptofundError::Data {
        reason: format!("{}: {}", path.display(), e),
    })
}

/// Read a timed opinion stream in file order.
///
/// Records with an unknown action or a confidence outside [0, 1] are
/// contract violations and fail the whole read.
pub fn read_opinions(path: &Path) -> Result<Vec<TimedOpinion>, CryptofundError> {
    let records: Vec<OpinionRecord> = read_records(path)?;
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let timestamp = record.timestamp.resolve(path, i)?;
            let opinion = Opinion::parse(
                record.analyst,
                record.asset,
                &record.action,
                record.confidence,
                record.reasoning,
            )?;
            Ok(TimedOpinion { timestamp, opinion })
        })
        .collect()
}

/// Read a timed decision stream in file order.
pub fn read_decisions(path: &Path) -> Result<Vec<TimedDecision>, CryptofundError> {
    let records: Vec<DecisionRecord> = read_records(path)?;
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let timestamp = record.timestamp.resolve(path, i)?;
            let action = record.action.parse::<Action>().map_err(|e| {
                CryptofundError::InvalidDecision {
                    asset: record.asset.clone(),
                    reason: e.to_string(),
                }
            })?;
            let decision = Decision {
                asset: record.asset,
                action,
                size: record.size,
                confidence: record.confidence,
            };
            decision.validate()?;
            Ok(TimedDecision {
                timestamp,
                decision,
            })
        })
        .collect()
}

/// Write a decision stream in the format [`read_decisions`] accepts.
pub fn write_decisions(path: &Path, decisions: &[TimedDecision]) -> Result<(), CryptofundError> {
    let records: Vec<DecisionOut> = decisions
        .iter()
        .map(|timed| DecisionOut {
            timestamp: format_timestamp(timed.timestamp),
            asset: &timed.decision.asset,
            action: timed.decision.action.to_string(),
            size: timed.decision.size,
            confidence: timed.decision.confidence,
        })
        .collect();
    let json = serde_json::to_string_pretty(&records).map_err(|e| CryptofundError::Data {
        reason: format!("failed to encode decisions: {e}"),
    })?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn read_opinions_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "opinions.json",
            r#"[
                {"timestamp": "2024-01-02", "analyst": "saylor", "asset": "BTC",
                 "action": "buy", "confidence": 0.9, "reasoning": "scarcity"},
                {"timestamp": 1704067200000, "analyst": "musk", "asset": "DOGE",
                 "action": "Hold", "confidence": 0.4}
            ]"#,
        );
        let opinions = read_opinions(&path).unwrap();
        assert_eq!(opinions.len(), 2);
        assert_eq!(
            opinions[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(opinions[0].opinion.reasoning, "scarcity");
        assert_eq!(opinions[1].opinion.action, Action::Hold);
        assert_eq!(opinions[1].opinion.reasoning, "");
        assert!(opinions[1].timestamp < opinions[0].timestamp);
    }

    #[test]
    fn read_opinions_rejects_out_of_range_confidence() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "bad.json",
            r#"[{"timestamp": "2024-01-02", "analyst": "a", "asset": "BTC",
                 "action": "buy", "confidence": 1.2}]"#,
        );
        let err = read_opinions(&path).unwrap_err();
        assert!(matches!(err, CryptofundError::InvalidOpinion { .. }));
    }

    #[test]
    fn read_opinions_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.json", "[{\"timestamp\": ");
        assert!(matches!(
            read_opinions(&path).unwrap_err(),
            CryptofundError::Data { .. }
        ));
    }

    #[test]
    fn decisions_written_are_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("decisions.json");
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let decisions = vec![TimedDecision {
            timestamp: ts,
            decision: Decision {
                asset: "ETH".into(),
                action: Action::Sell,
                size: 0.2,
                confidence: 0.75,
            },
        }];
        write_decisions(&path, &decisions).unwrap();
        assert_eq!(read_decisions(&path).unwrap(), decisions);
    }

    #[test]
    fn read_decisions_accepts_epoch_millis() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "decisions.json",
            r#"[{"timestamp": 1704067200000, "asset": "BTC", "action": "buy",
                 "size": 0.2, "confidence": 0.9},
                {"timestamp": "2024-01-02", "asset": "BTC", "action": "hold",
                 "size": 0.0, "confidence": 0.3}]"#,
        );
        let decisions = read_decisions(&path).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(
            decisions[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(decisions[0].decision.action, Action::Buy);
        assert_eq!(decisions[1].decision.action, Action::Hold);
    }

    #[test]
    fn read_decisions_rejects_oversized_sell() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "decisions.json",
            r#"[{"timestamp": "2024-01-02", "asset": "BTC", "action": "sell",
                 "size": 2.0, "confidence": 0.9}]"#,
        );
        assert!(matches!(
            read_decisions(&path).unwrap_err(),
            CryptofundError::InvalidDecision { .. }
        ));
    }

    #[test]
    fn read_decisions_rejects_unknown_action() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "decisions.json",
            r#"[{"timestamp": "2024-01-02", "asset": "BTC", "action": "short",
                 "size": 0.2, "confidence": 0.9}]"#,
        );
        assert!(read_decisions(&path).is_err());
    }
}
