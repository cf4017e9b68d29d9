//! Next-session price range prediction.
//!
//! The model is pluggable through [`PricePredictor`]; the built-in
//! [`VolatilityBandPredictor`] is a transparent baseline.

use crate::domain::price::PriceSeries;
use crate::features::indicators;
use crate::SignalError;
use serde::{Deserialize, Serialize};

/// Daily volatility at which the baseline stops trusting its own band.
const ZERO_CONFIDENCE_DAILY_VOL: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRangeForecast {
    pub low: f64,
    pub high: f64,
    /// In [0, 1]; 0 marks a fallback that carries no model information.
    pub confidence: f64,
}

pub trait PricePredictor: Send + Sync {
    fn name(&self) -> &'static str;

    fn predict(&self, series: &PriceSeries) -> Result<PriceRangeForecast, SignalError>;
}

#[derive(Debug, Clone)]
pub struct VolatilityBandPredictor {
    pub lookback: usize,
    pub band_multiplier: f64,
}

impl Default for VolatilityBandPredictor {
    fn default() -> Self {
        Self {
            lookback: 20,
            band_multiplier: 1.0,
        }
    }
}

impl PricePredictor for VolatilityBandPredictor {
    fn name(&self) -> &'static str {
        "volatility_band"
    }

    fn predict(&self, series: &PriceSeries) -> Result<PriceRangeForecast, SignalError> {
        let required = self.lookback + 1;
        if self.lookback < 2 || series.len() < required {
            return Err(SignalError::InsufficientData {
                required: required.max(3),
                available: series.len(),
            });
        }

        let points = series.tail(required);
        let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
        let returns = indicators::simple_returns(&closes);
        let daily_vol = indicators::sample_std(&returns).unwrap_or(0.0);

        let bars = &points[1..];
        let mean_range = bars.iter().map(|p| (p.high - p.low) / p.close).sum::<f64>() / bars.len() as f64;

        let last_close = closes[closes.len() - 1];
        let half_width = last_close * (daily_vol * self.band_multiplier).max(mean_range / 2.0);

        Ok(PriceRangeForecast {
            low: (last_close - half_width).max(0.0),
            high: last_close + half_width,
            confidence: (1.0 - daily_vol / ZERO_CONFIDENCE_DAILY_VOL).clamp(0.0, 1.0),
        })
    }
}

/// Runs `predictor`, falling back to the last bar's range with zero confidence.
pub fn predict_or_last_bar(
    predictor: &dyn PricePredictor,
    series: &PriceSeries,
) -> Option<PriceRangeForecast> {
    match predictor.predict(series) {
        Ok(forecast) => Some(forecast),
        Err(err) => {
            tracing::warn!(predictor = predictor.name(), error = %err, "price range prediction failed; using last bar");
            series.last().map(|p| PriceRangeForecast {
                low: p.low,
                high: p.high,
                confidence: 0.0,
            })
        }
    }
}
