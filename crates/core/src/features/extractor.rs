use crate::domain::price::PriceSeries;
use crate::domain::recommendation::Direction;
use crate::features::indicators;
use crate::SignalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_WINDOW: usize = 3;
const RSI_PERIOD: usize = 14;
const VOLUME_TREND_SESSIONS: usize = 5;
/// Weekly and monthly changes compare against the 5th and 20th most recent closes.
const WEEKLY_LAG: usize = 4;
const MONTHLY_LAG: usize = 19;
const EQ_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
    Extreme,
}

impl VolatilityRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityRegime::Low => "low",
            VolatilityRegime::Normal => "normal",
            VolatilityRegime::High => "high",
            VolatilityRegime::Extreme => "extreme",
        }
    }
}

/// Upper bounds (exclusive) of annualized volatility for each regime below `Extreme`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    pub low_max: f64,
    pub normal_max: f64,
    pub high_max: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            low_max: 0.12,
            normal_max: 0.25,
            high_max: 0.40,
        }
    }
}

impl RegimeThresholds {
    pub fn validate(&self) -> Result<(), SignalError> {
        let ordered = 0.0 < self.low_max && self.low_max < self.normal_max && self.normal_max < self.high_max;
        if !ordered {
            return Err(SignalError::InvalidConfig(format!(
                "regime thresholds must satisfy 0 < low < normal < high (got {} / {} / {})",
                self.low_max, self.normal_max, self.high_max
            )));
        }
        Ok(())
    }

    pub fn classify(&self, annualized_vol: f64) -> VolatilityRegime {
        if annualized_vol < self.low_max {
            VolatilityRegime::Low
        } else if annualized_vol < self.normal_max {
            VolatilityRegime::Normal
        } else if annualized_vol < self.high_max {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Extreme
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceAction {
    pub current_price: f64,
    pub daily_change_pct: f64,
    pub weekly_change_pct: f64,
    pub monthly_change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignal {
    pub name: String,
    pub bias: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub as_of: DateTime<Utc>,
    pub window: usize,
    pub sma_5: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: f64,
    pub macd_signal: f64,
    pub daily_volatility: f64,
    pub annualized_volatility: f64,
    pub regime: VolatilityRegime,
    pub volume_trend: VolumeTrend,
    pub price_action: PriceAction,
    pub signals: Vec<MarketSignal>,
    pub technical_bias: Direction,
}

impl TechnicalSnapshot {
    /// `(bullish - bearish) / signals`, in [-1, 1].
    pub fn technical_score(&self) -> f64 {
        if self.signals.is_empty() {
            return 0.0;
        }
        let net: i32 = self
            .signals
            .iter()
            .map(|s| match s.bias {
                Direction::Bullish => 1,
                Direction::Bearish => -1,
                Direction::Neutral => 0,
            })
            .sum();
        net as f64 / self.signals.len() as f64
    }
}

/// Computes a snapshot from the trailing `window` points of `series`.
pub fn extract(
    series: &PriceSeries,
    window: usize,
    thresholds: &RegimeThresholds,
) -> Result<TechnicalSnapshot, SignalError> {
    if window < MIN_WINDOW {
        return Err(SignalError::InvalidWindow {
            window,
            min: MIN_WINDOW,
        });
    }
    if series.len() < window {
        return Err(SignalError::InsufficientData {
            required: window,
            available: series.len(),
        });
    }

    let points = series.tail(window);
    let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
    let volumes: Vec<f64> = points.iter().map(|p| p.volume).collect();
    let last = points[points.len() - 1];

    let sma_5 = indicators::sma(&closes, 5);
    let sma_20 = indicators::sma(&closes, 20);
    let sma_50 = indicators::sma(&closes, 50);
    let sma_200 = indicators::sma(&closes, 200);
    let rsi_14 = indicators::rsi(&closes, RSI_PERIOD);
    let macd = indicators::macd(&closes, 12, 26, 9).ok_or(SignalError::InsufficientData {
        required: 1,
        available: 0,
    })?;

    let returns = indicators::simple_returns(&closes);
    let daily_volatility = indicators::sample_std(&returns).unwrap_or(0.0);
    let annualized_volatility = indicators::annualize(daily_volatility);
    let regime = thresholds.classify(annualized_volatility);

    let avg_volume = volumes.iter().sum::<f64>() / volumes.len() as f64;
    let recent_volume = indicators::sma(&volumes, VOLUME_TREND_SESSIONS.min(volumes.len())).unwrap_or(avg_volume);
    let volume_trend = if recent_volume > avg_volume {
        VolumeTrend::Increasing
    } else {
        VolumeTrend::Decreasing
    };

    let price_action = PriceAction {
        current_price: last.close,
        daily_change_pct: indicators::pct_change(&closes, 1).unwrap_or(0.0),
        weekly_change_pct: indicators::pct_change(&closes, WEEKLY_LAG).unwrap_or(0.0),
        monthly_change_pct: indicators::pct_change(&closes, MONTHLY_LAG).unwrap_or(0.0),
    };

    let mut signals = Vec::with_capacity(3);
    if let Some(ma) = sma_20 {
        signals.push(compare_signal("20-day MA", last.close, ma));
    }
    if let Some(ma) = sma_50 {
        signals.push(compare_signal("50-day MA", last.close, ma));
    }
    signals.push(compare_signal("MACD signal", macd.macd, macd.signal));

    let bullish = signals.iter().filter(|s| s.bias == Direction::Bullish).count();
    let bearish = signals.iter().filter(|s| s.bias == Direction::Bearish).count();
    let technical_bias = match bullish.cmp(&bearish) {
        std::cmp::Ordering::Greater => Direction::Bullish,
        std::cmp::Ordering::Less => Direction::Bearish,
        std::cmp::Ordering::Equal => Direction::Neutral,
    };

    Ok(TechnicalSnapshot {
        as_of: last.timestamp,
        window,
        sma_5,
        sma_20,
        sma_50,
        sma_200,
        rsi_14,
        macd: macd.macd,
        macd_signal: macd.signal,
        daily_volatility,
        annualized_volatility,
        regime,
        volume_trend,
        price_action,
        signals,
        technical_bias,
    })
}

fn compare_signal(reference: &str, value: f64, against: f64) -> MarketSignal {
    let scale = value.abs().max(against.abs()).max(1.0);
    let (bias, relation) = if (value - against).abs() <= EQ_TOLERANCE * scale {
        (Direction::Neutral, "At")
    } else if value > against {
        (Direction::Bullish, "Above")
    } else {
        (Direction::Bearish, "Below")
    };

    let name = if reference == "MACD signal" {
        format!("MACD {relation} Signal")
    } else {
        format!("{relation} {reference}")
    };
    MarketSignal { name, bias }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::fixtures;

    #[test]
    fn flat_series_is_low_regime_and_neutral() {
        let series = fixtures::flat(200.0, 20);
        let snap = extract(&series, 20, &RegimeThresholds::default()).unwrap();
        assert_eq!(snap.regime, VolatilityRegime::Low);
        assert_eq!(snap.annualized_volatility, 0.0);
        assert_eq!(snap.technical_bias, Direction::Neutral);
        assert_eq!(snap.technical_score(), 0.0);
        assert_eq!(snap.rsi_14, Some(50.0));
        assert_eq!(snap.sma_20, Some(200.0));
        assert_eq!(snap.sma_50, None);
    }

    #[test]
    fn insufficient_history_is_an_error() {
        let series = fixtures::flat(100.0, 10);
        let err = extract(&series, 20, &RegimeThresholds::default()).unwrap_err();
        assert_eq!(
            err,
            SignalError::InsufficientData {
                required: 20,
                available: 10
            }
        );
    }

    #[test]
    fn tiny_window_is_rejected() {
        let series = fixtures::flat(100.0, 10);
        assert!(matches!(
            extract(&series, 2, &RegimeThresholds::default()),
            Err(SignalError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn only_the_trailing_window_matters() {
        let mut closes: Vec<f64> = (0..30).map(|i| 50.0 + (i as f64 * 1.7).sin() * 10.0).collect();
        closes.extend(vec![100.0; 20]);
        let noisy = fixtures::from_closes(&closes);
        let snap = extract(&noisy, 20, &RegimeThresholds::default()).unwrap();
        assert_eq!(snap.regime, VolatilityRegime::Low);
        assert_eq!(snap.window, 20);
    }

    #[test]
    fn uptrend_is_bullish() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 * 1.002f64.powi(i)).collect();
        let snap = extract(&fixtures::from_closes(&closes), 60, &RegimeThresholds::default()).unwrap();
        assert_eq!(snap.technical_bias, Direction::Bullish);
        assert_eq!(snap.signals.len(), 3);
        assert!(snap.price_action.monthly_change_pct > 0.0);
    }

    #[test]
    fn price_changes_use_fifth_and_twentieth_last_close() {
        let closes: Vec<f64> = (1..=20).map(|i| i as f64 * 10.0).collect();
        let snap = extract(&fixtures::from_closes(&closes), 20, &RegimeThresholds::default()).unwrap();
        let pa = snap.price_action;
        assert_eq!(pa.current_price, 200.0);
        assert!((pa.daily_change_pct - (200.0 - 190.0) / 190.0 * 100.0).abs() < 1e-9);
        assert!((pa.weekly_change_pct - (200.0 - 160.0) / 160.0 * 100.0).abs() < 1e-9);
        // A 20-session window is enough for the monthly change.
        assert!((pa.monthly_change_pct - 1900.0).abs() < 1e-9);
    }

    #[test]
    fn monthly_change_is_zero_below_twenty_sessions() {
        let closes: Vec<f64> = (1..=19).map(|i| i as f64 * 10.0).collect();
        let snap = extract(&fixtures::from_closes(&closes), 19, &RegimeThresholds::default()).unwrap();
        assert_eq!(snap.price_action.monthly_change_pct, 0.0);
        assert!(snap.price_action.weekly_change_pct > 0.0);
    }

    #[test]
    fn regime_is_monotonic_in_volatility() {
        let thresholds = RegimeThresholds::default();
        let mut prev = VolatilityRegime::Low;
        for amplitude in [0.0, 0.002, 0.005, 0.01, 0.02, 0.03, 0.05, 0.08] {
            let closes: Vec<f64> = (0..40)
                .map(|i| 100.0 * (1.0 + if i % 2 == 0 { amplitude } else { -amplitude }))
                .collect();
            let snap = extract(&fixtures::from_closes(&closes), 40, &thresholds).unwrap();
            assert!(snap.regime >= prev, "regime went down at amplitude {amplitude}");
            prev = snap.regime;
        }
        assert_eq!(prev, VolatilityRegime::Extreme);
    }

    #[test]
    fn classify_boundaries() {
        let t = RegimeThresholds::default();
        assert_eq!(t.classify(0.0), VolatilityRegime::Low);
        assert_eq!(t.classify(0.12), VolatilityRegime::Normal);
        assert_eq!(t.classify(0.25), VolatilityRegime::High);
        assert_eq!(t.classify(0.40), VolatilityRegime::Extreme);
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let t = RegimeThresholds {
            low_max: 0.3,
            normal_max: 0.2,
            high_max: 0.4,
        };
        assert!(t.validate().is_err());
    }
}
