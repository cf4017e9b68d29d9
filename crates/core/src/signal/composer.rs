use crate::domain::recommendation::{Direction, Factor, Recommendation, StrategyKind};
use crate::domain::sentiment::SentimentScore;
use crate::features::{TechnicalSnapshot, VolatilityRegime};
use crate::SignalError;
use serde::{Deserialize, Serialize};

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const MOMENTUM_SCALE_PCT: f64 = 5.0;

/// Relative weight of each factor in the composite score, plus the neutral band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub technical: f64,
    pub rsi: f64,
    pub sentiment: f64,
    pub momentum: f64,
    /// Composite scores within `[-neutral_band, neutral_band]` are called neutral.
    pub neutral_band: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            technical: 0.40,
            rsi: 0.15,
            sentiment: 0.30,
            momentum: 0.15,
            neutral_band: 0.15,
        }
    }
}

impl SignalWeights {
    pub fn validate(&self) -> Result<(), SignalError> {
        let weights = [self.technical, self.rsi, self.sentiment, self.momentum];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SignalError::InvalidConfig(
                "signal weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(SignalError::InvalidConfig(
                "at least one signal weight must be positive".to_string(),
            ));
        }
        if !(self.neutral_band > 0.0 && self.neutral_band < 1.0) {
            return Err(SignalError::InvalidConfig(format!(
                "neutral band must be in (0, 1) (got {})",
                self.neutral_band
            )));
        }
        Ok(())
    }

    fn total(&self) -> f64 {
        self.technical + self.rsi + self.sentiment + self.momentum
    }
}

#[derive(Debug, Clone)]
pub struct SignalComposer {
    weights: SignalWeights,
}

impl SignalComposer {
    pub fn new(weights: SignalWeights) -> Result<Self, SignalError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn compose(&self, snapshot: &TechnicalSnapshot, sentiment: &SentimentScore) -> Recommendation {
        let w = &self.weights;
        let total = w.total();

        let raw = [
            ("technical_trend", w.technical, snapshot.technical_score()),
            ("rsi_reversion", w.rsi, rsi_score(snapshot.rsi_14)),
            ("news_sentiment", w.sentiment, sentiment.score.clamp(-1.0, 1.0)),
            ("momentum", w.momentum, momentum_score(snapshot.price_action.monthly_change_pct)),
        ];

        let mut factors: Vec<Factor> = raw
            .iter()
            .map(|(name, weight, score)| Factor {
                name: (*name).to_string(),
                weight: weight * score / total,
            })
            .collect();

        let composite_score = factors
            .iter()
            .map(|f| f.weight)
            .sum::<f64>()
            .clamp(-1.0, 1.0);

        factors.sort_by(|a, b| {
            b.weight
                .abs()
                .partial_cmp(&a.weight.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });

        let direction = if composite_score > w.neutral_band {
            Direction::Bullish
        } else if composite_score < -w.neutral_band {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        let probability = match direction {
            Direction::Neutral => {
                let range = 1.0 - composite_score.abs() / w.neutral_band;
                0.5 + 0.5 * range * range_certainty(snapshot.regime)
            }
            _ => 0.5 + 0.5 * composite_score.abs() * directional_certainty(snapshot.regime),
        }
        .clamp(0.0, 1.0);

        Recommendation {
            strategy: select_strategy(direction, snapshot.regime),
            direction,
            probability,
            composite_score,
            factors,
        }
    }
}

/// Strategy table keyed by direction and regime.
pub fn select_strategy(direction: Direction, regime: VolatilityRegime) -> StrategyKind {
    use VolatilityRegime::*;
    match (direction, regime) {
        (Direction::Bullish, Low) => StrategyKind::LongCall,
        (Direction::Bullish, Normal) => StrategyKind::BullCallSpread,
        (Direction::Bullish, High | Extreme) => StrategyKind::BullPutSpread,
        (Direction::Bearish, Low) => StrategyKind::LongPut,
        (Direction::Bearish, Normal) => StrategyKind::BearPutSpread,
        (Direction::Bearish, High | Extreme) => StrategyKind::BearCallSpread,
        (Direction::Neutral, Low) => StrategyKind::LongStraddle,
        (Direction::Neutral, Normal | High) => StrategyKind::IronCondor,
        (Direction::Neutral, Extreme) => StrategyKind::NoTrade,
    }
}

fn rsi_score(rsi: Option<f64>) -> f64 {
    match rsi {
        Some(v) if v < RSI_OVERSOLD => ((RSI_OVERSOLD - v) / RSI_OVERSOLD).min(1.0),
        Some(v) if v > RSI_OVERBOUGHT => -((v - RSI_OVERBOUGHT) / (100.0 - RSI_OVERBOUGHT)).min(1.0),
        _ => 0.0,
    }
}

fn momentum_score(monthly_change_pct: f64) -> f64 {
    (monthly_change_pct / MOMENTUM_SCALE_PCT).tanh()
}

fn directional_certainty(regime: VolatilityRegime) -> f64 {
    match regime {
        VolatilityRegime::Low => 1.0,
        VolatilityRegime::Normal => 0.9,
        VolatilityRegime::High => 0.75,
        VolatilityRegime::Extreme => 0.6,
    }
}

fn range_certainty(regime: VolatilityRegime) -> f64 {
    match regime {
        VolatilityRegime::Low => 0.8,
        VolatilityRegime::Normal => 0.6,
        VolatilityRegime::High => 0.3,
        VolatilityRegime::Extreme => 0.1,
    }
}
