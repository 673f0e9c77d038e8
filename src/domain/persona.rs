//! Persona-driven signal sources.
//!
//! Every analyst is the same [`Persona`] type; they differ only by prompt and
//! the asset they focus on. Opinion generation goes through a
//! [`SignalPort`], so the text-generation service is swappable in tests.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

use super::error::CryptofundError;
use super::opinion::Opinion;
use super::price_series::{AssetSeries, PriceBook};
use crate::ports::signal_port::SignalPort;

pub const SMA_PERIOD: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub key: &'static str,
    pub name: &'static str,
    /// `None` means the persona has an opinion on every asset.
    pub focus_asset: Option<&'static str>,
    pub prompt: &'static str,
}

pub static PERSONAS: [Persona; 7] = [
    Persona {
        key: "saylor",
        name: "Michael Saylor",
        focus_asset: Some("BTC"),
        prompt: "You are Michael Saylor. You see Bitcoin as digital property and the \
                 hardest money ever created. You favour long-term accumulation and treat \
                 drawdowns as buying opportunities.",
    },
    Persona {
        key: "vitalik",
        name: "Vitalik Buterin",
        focus_asset: None,
        prompt: "You are Vitalik Buterin. You judge assets by technical merit, network \
                 utility and ecosystem health rather than short-term price action.",
    },
    Persona {
        key: "technicals",
        name: "Technicals",
        focus_asset: None,
        prompt: "You are a technical analyst. Base your call on price relative to its \
                 moving average, momentum and volume only.",
    },
    Persona {
        key: "cz",
        name: "Changpeng Zhao",
        focus_asset: Some("BNB"),
        prompt: "You are Changpeng Zhao. You focus on exchange volume, user growth and the \
                 strength of the BNB ecosystem.",
    },
    Persona {
        key: "musk",
        name: "Elon Musk",
        focus_asset: Some("DOGE"),
        prompt: "You are Elon Musk. You follow community sentiment and momentum, and you \
                 are willing to take bold positions on meme-driven assets.",
    },
    Persona {
        key: "armstrong",
        name: "Brian Armstrong",
        focus_asset: Some("BTC"),
        prompt: "You are Brian Armstrong. You weigh regulatory clarity, institutional \
                 adoption and long-term infrastructure when assessing Bitcoin.",
    },
    Persona {
        key: "hoskinson",
        name: "Charles Hoskinson",
        focus_asset: Some("ADA"),
        prompt: "You are Charles Hoskinson. You value peer-reviewed research, methodical \
                 development and the long-term roadmap of Cardano.",
    },
];

/// Look up a persona by key, case-insensitively.
pub fn find(key: &str) -> Option<&'static Persona> {
    PERSONAS.iter().find(|p| p.key.eq_ignore_ascii_case(key.trim()))
}

/// The market data a persona sees for one asset at one evaluation point.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub asset: String,
    pub timestamp: NaiveDateTime,
    pub latest_close: f64,
    pub volume: f64,
    /// `None` until the series has `SMA_PERIOD` bars.
    pub sma_50: Option<f64>,
}

impl MarketSnapshot {
    /// Snapshot from bars at or before `at`; `None` if there are none.
    pub fn from_series(series: &AssetSeries, at: NaiveDateTime) -> Option<Self> {
        let bars = series.bars_until(at);
        let last = bars.last()?;
        let sma_50 = (bars.len() >= SMA_PERIOD).then(|| {
            bars[bars.len() - SMA_PERIOD..]
                .iter()
                .map(|b| b.close)
                .sum::<f64>()
                / SMA_PERIOD as f64
        });
        Some(MarketSnapshot {
            asset: series.asset.clone(),
            timestamp: last.timestamp,
            latest_close: last.close,
            volume: last.volume,
            sma_50,
        })
    }
}

impl Persona {
    pub fn covers(&self, asset: &str) -> bool {
        self.focus_asset.is_none_or(|focus| focus.eq_ignore_ascii_case(asset))
    }

    pub fn build_prompt(&self, snapshot: &MarketSnapshot) -> String {
        let mut prompt = String::with_capacity(self.prompt.len() + 512);
        prompt.push_str(self.prompt);
        prompt.push_str("\n\nCurrent Market Data:\n");
        let _ = writeln!(prompt, "Asset: {}", snapshot.asset);
        let _ = writeln!(prompt, "Latest Close: {}", snapshot.latest_close);
        let _ = writeln!(prompt, "Volume: {}", snapshot.volume);
        match snapshot.sma_50 {
            Some(sma) => {
                let _ = writeln!(prompt, "50-day SMA: {sma}");
            }
            None => prompt.push_str("50-day SMA: n/a\n"),
        }
        prompt.push_str(
            "\nProvide a trading signal (buy, sell, hold) with confidence (0-1) and brief \
             reasoning. Reply with a single JSON object: \
             {\"action\": \"buy|sell|hold\", \"confidence\": 0.0, \"reasoning\": \"...\"}",
        );
        prompt
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfidenceField {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct Reply {
    action: String,
    confidence: ConfidenceField,
    #[serde(default)]
    reasoning: String,
}

/// Parse a model reply into an opinion.
///
/// The reply may wrap its JSON object in prose or code fences. Replies that
/// cannot be read are [`CryptofundError::SignalParse`]; well-formed replies
/// with an unknown action or confidence outside [0, 1] are
/// [`CryptofundError::InvalidOpinion`].
pub fn parse_reply(reply: &str, analyst: &str, asset: &str) -> Result<Opinion, CryptofundError> {
    let parse_error = |reason: String| CryptofundError::SignalParse {
        analyst: analyst.to_string(),
        asset: asset.to_string(),
        reason,
    };

    let body = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return Err(parse_error("no JSON object in reply".into())),
    };

    let raw: Reply = serde_json::from_str(body).map_err(|e| parse_error(e.to_string()))?;

    let confidence = match raw.confidence {
        ConfidenceField::Number(value) => value,
        ConfidenceField::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| parse_error(format!("confidence '{text}' is not a number")))?,
    };

    Opinion::parse(analyst, asset, &raw.action, confidence, raw.reasoning)
}

/// Ask each persona for an opinion on every asset it covers.
///
/// Output is in persona order, then asset order. Unreadable replies and
/// signal source failures are logged and skipped; contract violations
/// abort the call.
pub fn generate_opinions(
    port: &dyn SignalPort,
    personas: &[&Persona],
    book: &PriceBook,
    at: NaiveDateTime,
) -> Result<Vec<Opinion>, CryptofundError> {
    let mut opinions = Vec::new();

    for persona in personas {
        for asset in book.assets().into_iter().filter(|a| persona.covers(a)) {
            let Some(snapshot) = book.get(asset).and_then(|s| MarketSnapshot::from_series(s, at))
            else {
                warn!(analyst = persona.key, asset, %at, "no market data, skipping");
                continue;
            };

            let prompt = persona.build_prompt(&snapshot);
            let reply = match port.complete(&prompt) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(analyst = persona.key, asset, error = %e, "signal source failed, skipping");
                    continue;
                }
            };

            match parse_reply(&reply, persona.key, asset) {
                Ok(opinion) => {
                    debug!(
                        analyst = persona.key,
                        asset,
                        action = %opinion.action,
                        confidence = opinion.confidence,
                        "opinion"
                    );
                    opinions.push(opinion);
                }
                Err(e @ CryptofundError::SignalParse { .. }) => {
                    warn!(error = %e, "unreadable reply, skipping");
                }
                Err(e) => return Err(e),
            }
        }
    }

    info!(count = opinions.len(), %at, "generated opinions");
    Ok(opinions)
}
