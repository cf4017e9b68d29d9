use crate::domain::contract::StrategyInsight;
use crate::domain::sentiment::SentimentScore;
use crate::features::TechnicalSnapshot;
use crate::options::OptionsSetup;
use crate::predict::PriceRangeForecast;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    LongCall,
    BullCallSpread,
    BullPutSpread,
    LongPut,
    BearPutSpread,
    BearCallSpread,
    LongStraddle,
    IronCondor,
    NoTrade,
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::LongCall => "Long Call",
            StrategyKind::BullCallSpread => "Bull Call Spread",
            StrategyKind::BullPutSpread => "Bull Put Spread",
            StrategyKind::LongPut => "Long Put",
            StrategyKind::BearPutSpread => "Bear Put Spread",
            StrategyKind::BearCallSpread => "Bear Call Spread",
            StrategyKind::LongStraddle => "Long Straddle",
            StrategyKind::IronCondor => "Iron Condor",
            StrategyKind::NoTrade => "No Trade",
        }
    }
}

/// A named contribution to the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub strategy: StrategyKind,
    pub direction: Direction,
    /// Probability that the call plays out, in [0, 1].
    pub probability: f64,
    /// Weighted blend of all factor scores, in [-1, 1].
    pub composite_score: f64,
    /// Ordered by descending absolute weight.
    pub factors: Vec<Factor>,
}

impl Recommendation {
    pub fn neutral_default() -> Self {
        Self {
            strategy: StrategyKind::NoTrade,
            direction: Direction::Neutral,
            probability: 0.5,
            composite_score: 0.0,
            factors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyNarrative {
    pub insight: StrategyInsight,
    /// Agreement between the narrative and the raw signals, in [0, 100].
    pub alignment_confidence: f64,
}

/// Everything one pipeline run produced, as persisted and served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReport {
    pub symbol: String,
    pub as_of_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub snapshot: Option<TechnicalSnapshot>,
    pub sentiment: SentimentScore,
    #[serde(default)]
    pub recent_news: Vec<String>,
    pub recommendation: Recommendation,
    pub price_range: Option<PriceRangeForecast>,
    pub options: Option<OptionsSetup>,
    #[serde(default)]
    pub narrative: Option<StrategyNarrative>,
    /// Stages that fell back to defaults, with the reason.
    #[serde(default)]
    pub degraded: Vec<String>,
}

impl SignalReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}
