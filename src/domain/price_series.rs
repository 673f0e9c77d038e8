//! Per-asset price series and the price book the engine replays against.

use chrono::NaiveDateTime;
use std::collections::HashMap;

use super::error::CryptofundError;
use super::ohlcv::OhlcvBar;

#[derive(Debug, Clone)]
pub struct AssetSeries {
    pub asset: String,
    pub bars: Vec<OhlcvBar>,
    pub timestamp_index: HashMap<NaiveDateTime, usize>,
}

impl AssetSeries {
    /// Build a series from normalized bars.
    ///
    /// An empty series is a configuration error: there is nothing to price
    /// against. Bars must already be sorted with unique timestamps.
    pub fn new(asset: String, bars: Vec<OhlcvBar>) -> Result<Self, CryptofundError> {
        if bars.is_empty() {
            return Err(CryptofundError::NoData { asset });
        }
        for bar in &bars {
            bar.validate()?;
        }
        if let Some(pair) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(CryptofundError::InvalidBar {
                asset,
                timestamp: pair[1].timestamp,
                reason: "timestamps must be strictly increasing".into(),
            });
        }
        let timestamp_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.timestamp, i))
            .collect();
        Ok(Self {
            asset,
            bars,
            timestamp_index,
        })
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, timestamp: NaiveDateTime) -> Option<&OhlcvBar> {
        self.timestamp_index.get(&timestamp).map(|&i| &self.bars[i])
    }

    /// Close of the bar stamped exactly at `timestamp`.
    pub fn close_at(&self, timestamp: NaiveDateTime) -> Option<f64> {
        self.get_bar(timestamp).map(|bar| bar.close)
    }

    /// Bars at or before `timestamp`.
    pub fn bars_until(&self, timestamp: NaiveDateTime) -> &[OhlcvBar] {
        let end = self.bars.partition_point(|bar| bar.timestamp <= timestamp);
        &self.bars[..end]
    }

    /// Close of the most recent bar at or before `timestamp`.
    pub fn latest_close(&self, timestamp: NaiveDateTime) -> Option<f64> {
        self.bars_until(timestamp).last().map(|bar| bar.close)
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.bars.iter().map(|bar| bar.timestamp).collect()
    }
}

/// Collection of asset series keyed by asset; the reference asset's
/// timestamps define the result timeline.
#[derive(Debug, Clone)]
pub struct PriceBook {
    series: Vec<AssetSeries>,
    index: HashMap<String, usize>,
    reference: usize,
}

impl PriceBook {
    /// The first series becomes the reference series.
    pub fn new(series: Vec<AssetSeries>) -> Result<Self, CryptofundError> {
        if series.is_empty() {
            return Err(CryptofundError::EmptyPriceBook);
        }
        let mut index = HashMap::with_capacity(series.len());
        for (i, s) in series.iter().enumerate() {
            if index.insert(s.asset.clone(), i).is_some() {
                return Err(CryptofundError::Data {
                    reason: format!("duplicate price series for {}", s.asset),
                });
            }
        }
        Ok(Self {
            series,
            index,
            reference: 0,
        })
    }

    pub fn with_reference(mut self, asset: &str) -> Result<Self, CryptofundError> {
        self.reference = *self
            .index
            .get(asset)
            .ok_or_else(|| CryptofundError::NoData {
                asset: asset.to_string(),
            })?;
        Ok(self)
    }

    pub fn reference_asset(&self) -> &str {
        &self.series[self.reference].asset
    }

    pub fn reference_timeline(&self) -> Vec<NaiveDateTime> {
        self.series[self.reference].timestamps()
    }

    pub fn get(&self, asset: &str) -> Option<&AssetSeries> {
        self.index.get(asset).map(|&i| &self.series[i])
    }

    /// Assets in sorted order.
    pub fn assets(&self) -> Vec<&str> {
        let mut assets: Vec<&str> = self.series.iter().map(|s| s.asset.as_str()).collect();
        assets.sort_unstable();
        assets
    }

    pub fn latest_close(&self, asset: &str, timestamp: NaiveDateTime) -> Option<f64> {
        self.get(asset)?.latest_close(timestamp)
    }
}
