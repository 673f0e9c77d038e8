//! Decision aggregation: per-asset opinions to one sized decision.
//!
//! Policy per asset, with `buy`/`sell` the mean confidence of the opinions
//! voting that way (0 when nobody does):
//!
//! - `buy > threshold && buy >= sell` → buy at `max_position_size`
//! - else `sell > threshold` → sell at `max_position_size`
//! - else hold with size 0 and confidence `max(buy, sell)`
//!
//! An exact buy/sell tie above the threshold resolves to buy.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::debug;

use super::decision::{Decision, TimedDecision};
use super::error::CryptofundError;
use super::opinion::{Action, Opinion, TimedOpinion};

pub const DEFAULT_DECISION_THRESHOLD: f64 = 0.6;
pub const DEFAULT_MAX_POSITION_SIZE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub decision_threshold: f64,
    pub max_position_size: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            decision_threshold: DEFAULT_DECISION_THRESHOLD,
            max_position_size: DEFAULT_MAX_POSITION_SIZE,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), CryptofundError> {
        let t = self.decision_threshold;
        if !(t > 0.0 && t < 1.0) {
            return Err(CryptofundError::config_invalid(
                "aggregator",
                "decision_threshold",
                "decision_threshold must be strictly between 0 and 1",
            ));
        }
        let s = self.max_position_size;
        if !(s > 0.0 && s <= 1.0) {
            return Err(CryptofundError::config_invalid(
                "aggregator",
                "max_position_size",
                "max_position_size must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Aggregate one evaluation point's opinions into a decision per asset.
///
/// Assets without opinions are absent from the result. Any opinion outside
/// its domain rejects the whole call.
pub fn aggregate(
    opinions: &[Opinion],
    config: &AggregatorConfig,
) -> Result<BTreeMap<String, Decision>, CryptofundError> {
    config.validate()?;

    let mut groups: BTreeMap<&str, Vec<&Opinion>> = BTreeMap::new();
    for opinion in opinions {
        opinion.validate()?;
        groups.entry(opinion.asset.as_str()).or_default().push(opinion);
    }

    let decisions = groups
        .into_iter()
        .map(|(asset, group)| {
            let decision = decide(asset, &group, config);
            debug!(
                asset,
                opinions = group.len(),
                action = %decision.action,
                confidence = decision.confidence,
                "aggregated decision"
            );
            (asset.to_string(), decision)
        })
        .collect();
    Ok(decisions)
}

/// Group a timed opinion stream into evaluation points, keeping input order
/// within each point.
pub fn group_by_timestamp(
    opinions: impl IntoIterator<Item = TimedOpinion>,
) -> BTreeMap<NaiveDateTime, Vec<Opinion>> {
    let mut batches: BTreeMap<NaiveDateTime, Vec<Opinion>> = BTreeMap::new();
    for timed in opinions {
        batches.entry(timed.timestamp).or_default().push(timed.opinion);
    }
    batches
}

/// Aggregate every evaluation point, producing a decision stream ordered by
/// timestamp and then asset.
pub fn aggregate_stream(
    batches: &BTreeMap<NaiveDateTime, Vec<Opinion>>,
    config: &AggregatorConfig,
) -> Result<Vec<TimedDecision>, CryptofundError> {
    let mut stream = Vec::new();
    for (&timestamp, opinions) in batches {
        for decision in aggregate(opinions, config)?.into_values() {
            stream.push(TimedDecision {
                timestamp,
                decision,
            });
        }
    }
    Ok(stream)
}

fn mean_confidence(group: &[&Opinion], action: Action) -> f64 {
    let (sum, count) = group
        .iter()
        .filter(|o| o.action == action)
        .fold((0.0_f64, 0usize), |(sum, count), o| (sum + o.confidence, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn decide(asset: &str, group: &[&Opinion], config: &AggregatorConfig) -> Decision {
    let buy_confidence = mean_confidence(group, Action::Buy);
    let sell_confidence = mean_confidence(group, Action::Sell);

    if buy_confidence > config.decision_threshold && buy_confidence >= sell_confidence {
        Decision {
            asset: asset.to_string(),
            action: Action::Buy,
            size: config.max_position_size,
            confidence: buy_confidence,
        }
    } else if sell_confidence > config.decision_threshold {
        Decision {
            asset: asset.to_string(),
            action: Action::Sell,
            size: config.max_position_size,
            confidence: sell_confidence,
        }
    } else {
        Decision::hold(asset, buy_confidence.max(sell_confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn op(analyst: &str, asset: &str, action: Action, confidence: f64) -> Opinion {
        Opinion::new(analyst, asset, action, confidence, "").unwrap()
    }

    fn config() -> AggregatorConfig {
        AggregatorConfig::default()
    }

    #[test]
    fn default_config_values() {
        let c = config();
        assert!((c.decision_threshold - 0.6).abs() < f64::EPSILON);
        assert!((c.max_position_size - 0.2).abs() < f64::EPSILON);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn threshold_bounds_are_exclusive() {
        for t in [0.0, 1.0, -0.5, f64::NAN] {
            let c = AggregatorConfig {
                decision_threshold: t,
                ..config()
            };
            let err = c.validate().unwrap_err();
            assert!(
                matches!(err, CryptofundError::ConfigInvalid { key, .. } if key == "decision_threshold")
            );
        }
    }

    #[test]
    fn position_size_upper_bound_inclusive() {
        let ok = AggregatorConfig {
            max_position_size: 1.0,
            ..config()
        };
        assert!(ok.validate().is_ok());
        let zero = AggregatorConfig {
            max_position_size: 0.0,
            ..config()
        };
        assert!(zero.validate().is_err());
        let big = AggregatorConfig {
            max_position_size: 1.5,
            ..config()
        };
        assert!(big.validate().is_err());
    }

    #[test]
    fn strong_buy_consensus() {
        let opinions = vec![
            op("saylor", "BTC", Action::Buy, 0.9),
            op("armstrong", "BTC", Action::Buy, 0.7),
        ];
        let decisions = aggregate(&opinions, &config()).unwrap();
        let d = &decisions["BTC"];
        assert_eq!(d.action, Action::Buy);
        assert!((d.size - 0.2).abs() < f64::EPSILON);
        assert!((d.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn mean_is_over_matching_opinions_only() {
        // A hold vote does not dilute the buy mean.
        let opinions = vec![
            op("saylor", "BTC", Action::Buy, 0.7),
            op("technicals", "BTC", Action::Hold, 0.9),
        ];
        let d = &aggregate(&opinions, &config()).unwrap()["BTC"];
        assert_eq!(d.action, Action::Buy);
        assert!((d.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn sell_when_buy_below_threshold() {
        let opinions = vec![
            op("a", "ETH", Action::Buy, 0.5),
            op("b", "ETH", Action::Sell, 0.75),
        ];
        let d = &aggregate(&opinions, &config()).unwrap()["ETH"];
        assert_eq!(d.action, Action::Sell);
        assert!((d.confidence - 0.75).abs() < f64::EPSILON);
        assert!((d.size - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn sell_wins_when_stronger_than_qualifying_buy() {
        let opinions = vec![
            op("a", "ETH", Action::Buy, 0.7),
            op("b", "ETH", Action::Sell, 0.9),
        ];
        let d = &aggregate(&opinions, &config()).unwrap()["ETH"];
        assert_eq!(d.action, Action::Sell);
    }

    #[test]
    fn exact_tie_resolves_to_buy() {
        let opinions = vec![
            op("a", "BTC", Action::Buy, 0.7),
            op("b", "BTC", Action::Sell, 0.7),
        ];
        let d = &aggregate(&opinions, &config()).unwrap()["BTC"];
        assert_eq!(d.action, Action::Buy);
        assert!((d.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_at_threshold_holds() {
        let opinions = vec![op("a", "BTC", Action::Buy, 0.6)];
        let d = &aggregate(&opinions, &config()).unwrap()["BTC"];
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.size, 0.0);
        assert!((d.confidence - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn hold_surfaces_strongest_signal() {
        let opinions = vec![
            op("a", "ADA", Action::Buy, 0.3),
            op("b", "ADA", Action::Sell, 0.55),
        ];
        let d = &aggregate(&opinions, &config()).unwrap()["ADA"];
        assert_eq!(d.action, Action::Hold);
        assert!((d.confidence - 0.55).abs() < f64::EPSILON);
    }

    #[test]
    fn all_hold_opinions_give_zero_confidence_hold() {
        let opinions = vec![op("a", "ADA", Action::Hold, 0.9)];
        let d = &aggregate(&opinions, &config()).unwrap()["ADA"];
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn assets_without_opinions_are_absent() {
        let opinions = vec![op("a", "BTC", Action::Buy, 0.9)];
        let decisions = aggregate(&opinions, &config()).unwrap();
        assert_eq!(decisions.len(), 1);
        assert!(!decisions.contains_key("ETH"));
        assert!(aggregate(&[], &config()).unwrap().is_empty());
    }

    #[test]
    fn configured_threshold_is_respected() {
        let strict = AggregatorConfig {
            decision_threshold: 0.8,
            max_position_size: 0.5,
        };
        let opinions = vec![op("a", "BTC", Action::Buy, 0.75)];
        assert_eq!(aggregate(&opinions, &strict).unwrap()["BTC"].action, Action::Hold);
        let opinions = vec![op("a", "BTC", Action::Buy, 0.85)];
        let d = &aggregate(&opinions, &strict).unwrap()["BTC"];
        assert_eq!(d.action, Action::Buy);
        assert!((d.size - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_opinion_rejects_the_call() {
        let mut bad = op("a", "BTC", Action::Buy, 0.9);
        bad.confidence = 1.3;
        let opinions = vec![op("b", "ETH", Action::Buy, 0.9), bad];
        let err = aggregate(&opinions, &config()).unwrap_err();
        assert!(matches!(err, CryptofundError::InvalidOpinion { .. }));
    }

    #[test]
    fn invalid_config_rejects_the_call() {
        let bad = AggregatorConfig {
            decision_threshold: 1.0,
            ..config()
        };
        assert!(aggregate(&[], &bad).is_err());
    }

    #[test]
    fn aggregation_is_idempotent() {
        let opinions = vec![
            op("a", "BTC", Action::Buy, 0.61),
            op("b", "BTC", Action::Buy, 0.93),
            op("c", "BTC", Action::Sell, 0.42),
            op("d", "ETH", Action::Sell, 0.77),
        ];
        let first = aggregate(&opinions, &config()).unwrap();
        let second = aggregate(&opinions, &config()).unwrap();
        assert_eq!(first, second);
        for (a, b) in first.values().zip(second.values()) {
            assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
        }
    }

    #[test]
    fn stream_is_ordered_by_time_then_asset() {
        let t = |d: u32| {
            NaiveDate::from_ymd_opt(2024, 1, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let timed = vec![
            TimedOpinion {
                timestamp: t(2),
                opinion: op("a", "ETH", Action::Sell, 0.9),
            },
            TimedOpinion {
                timestamp: t(1),
                opinion: op("a", "BTC", Action::Buy, 0.9),
            },
            TimedOpinion {
                timestamp: t(2),
                opinion: op("a", "BTC", Action::Hold, 0.5),
            },
        ];
        let batches = group_by_timestamp(timed);
        assert_eq!(batches.len(), 2);
        let stream = aggregate_stream(&batches, &config()).unwrap();
        let keys: Vec<(NaiveDateTime, &str, Action)> = stream
            .iter()
            .map(|d| (d.timestamp, d.decision.asset.as_str(), d.decision.action))
            .collect();
        assert_eq!(
            keys,
            vec![
                (t(1), "BTC", Action::Buy),
                (t(2), "BTC", Action::Hold),
                (t(2), "ETH", Action::Sell),
            ]
        );
    }
}
