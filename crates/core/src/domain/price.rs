use crate::SignalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Price history ordered by strictly increasing timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self, SignalError> {
        for (idx, p) in points.iter().enumerate() {
            validate_point(idx, p)?;
        }

        for (idx, pair) in points.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(SignalError::InvalidSeries(format!(
                    "timestamps must strictly increase (index {} at {} follows {})",
                    idx + 1,
                    pair[1].timestamp,
                    pair[0].timestamp
                )));
            }
        }

        Ok(Self { points })
    }

    /// Sorts by timestamp before validating. Duplicate timestamps are still rejected.
    pub fn from_unsorted(mut points: Vec<PricePoint>) -> Result<Self, SignalError> {
        points.sort_by_key(|p| p.timestamp);
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// The trailing `n` points, or the whole series when it is shorter.
    pub fn tail(&self, n: usize) -> &[PricePoint] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }
}

fn validate_point(idx: usize, p: &PricePoint) -> Result<(), SignalError> {
    let prices = [p.open, p.high, p.low, p.close];
    if prices.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(SignalError::InvalidSeries(format!(
            "prices must be finite and positive (index {idx})"
        )));
    }
    if p.high < p.low {
        return Err(SignalError::InvalidSeries(format!(
            "high below low (index {idx}: high={}, low={})",
            p.high, p.low
        )));
    }
    if !p.volume.is_finite() || p.volume < 0.0 {
        return Err(SignalError::InvalidSeries(format!(
            "volume must be finite and non-negative (index {idx})"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub fn from_closes(closes: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2026, 1, 2, 21, 0, 0).unwrap();
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint {
                timestamp: start + Duration::days(i as i64),
                open: c,
                high: c * 1.005,
                low: c * 0.995,
                close: c,
                volume: 1_000_000.0,
            })
            .collect();
        PriceSeries::new(points).unwrap()
    }

    pub fn flat(price: f64, n: usize) -> PriceSeries {
        from_closes(&vec![price; n])
    }
}
