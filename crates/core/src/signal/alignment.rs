use crate::domain::recommendation::Direction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalystRating {
    Buy,
    Hold,
    Sell,
}

impl AnalystRating {
    /// Lenient parse of free-form rating text such as "Overweight" or "Strong Buy".
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_lowercase();
        if s.is_empty() || s == "n/a" {
            return None;
        }
        if s.contains("buy") || s.contains("overweight") || s.contains("outperform") {
            Some(AnalystRating::Buy)
        } else if s.contains("sell") || s.contains("underweight") || s.contains("underperform") {
            Some(AnalystRating::Sell)
        } else if s.contains("hold") || s.contains("neutral") {
            Some(AnalystRating::Hold)
        } else {
            None
        }
    }
}

/// How well a proposed direction agrees with RSI extremes, news sentiment and the
/// analyst rating, as a percentage in [0, 100]. 50 means no net agreement.
pub fn alignment_confidence(
    direction: Direction,
    rsi: Option<f64>,
    sentiment_score: f64,
    analyst_rating: Option<AnalystRating>,
) -> f64 {
    const CHECKS: f64 = 3.0;

    let vote = |expected: Direction| if direction == expected { 1.0 } else { -1.0 };
    let mut score = 0.0;

    match rsi {
        Some(v) if v > 70.0 => score += vote(Direction::Bearish),
        Some(v) if v < 30.0 => score += vote(Direction::Bullish),
        _ => {}
    }

    if sentiment_score > 0.0 {
        score += vote(Direction::Bullish);
    } else if sentiment_score < 0.0 {
        score += vote(Direction::Bearish);
    }

    match analyst_rating {
        Some(AnalystRating::Buy) => score += vote(Direction::Bullish),
        Some(AnalystRating::Sell) => score += vote(Direction::Bearish),
        Some(AnalystRating::Hold) | None => {}
    }

    (((score / CHECKS) + 1.0) * 50.0).clamp(0.0, 100.0)
}
