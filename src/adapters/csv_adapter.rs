//! CSV file price data adapter.
//!
//! One file per asset, `{base_path}/{ASSET}.csv`, with the header
//! `timestamp,open,high,low,close,volume`.

use crate::domain::error::CryptofundError;
use crate::domain::ohlcv::{parse_timestamp, OhlcvBar};
use crate::ports::data_port::DataPort;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PriceRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{asset}.csv"))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        asset: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, CryptofundError> {
        let path = self.csv_path(asset);
        let content = fs::read_to_string(&path).map_err(|e| CryptofundError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.deserialize::<PriceRow>().enumerate() {
            let row = result.map_err(|e| CryptofundError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;

            let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| CryptofundError::Data {
                reason: format!(
                    "{}: row {}: invalid timestamp '{}'",
                    path.display(),
                    line + 1,
                    row.timestamp
                ),
            })?;

            if start.is_some_and(|s| timestamp < s) || end.is_some_and(|e| timestamp > e) {
                continue;
            }

            bars.push(OhlcvBar {
                asset: asset.to_string(),
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        debug!(asset, bars = bars.len(), path = %path.display(), "loaded price file");
        Ok(bars)
    }

    fn list_assets(&self) -> Result<Vec<String>, CryptofundError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| CryptofundError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut assets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CryptofundError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    assets.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        assets.sort();
        Ok(assets)
    }
}
