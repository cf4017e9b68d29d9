//! Indicator math over plain slices. Every function is pure.

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Mean of the last `period` values; `None` when fewer values are available.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average without bias adjustment, seeded with the first value.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev = first;
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// RSI from simple rolling means of gains and losses over the last `period` deltas.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let tail = &closes[closes.len() - (period + 1)..];
    let (gain, loss) = tail.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            (g + delta, l)
        } else {
            (g, l - delta)
        }
    });
    let avg_gain = gain / period as f64;
    let avg_loss = loss / period as f64;

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if closes.is_empty() {
        return None;
    }
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&line, signal);

    Some(Macd {
        macd: *line.last()?,
        signal: *signal_line.last()?,
    })
}

pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    closes.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

pub fn annualize(daily_vol: f64) -> f64 {
    daily_vol * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Percentage change between the last value and the one `lag` steps earlier.
pub fn pct_change(values: &[f64], lag: usize) -> Option<f64> {
    if lag == 0 || values.len() <= lag {
        return None;
    }
    let last = values[values.len() - 1];
    let base = values[values.len() - 1 - lag];
    Some((last - base) / base * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sma_uses_trailing_values() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&v, 2), Some(4.5));
        assert_eq!(sma(&v, 6), None);
    }

    #[test]
    fn ema_is_seeded_with_first_value() {
        let out = ema_series(&[10.0, 20.0], 3);
        assert!(approx(out[0], 10.0));
        // alpha = 0.5
        assert!(approx(out[1], 15.0));
    }

    #[test]
    fn rsi_extremes() {
        let up: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let down: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let flat = vec![100.0; 20];
        assert_eq!(rsi(&up, 14), Some(100.0));
        assert!(approx(rsi(&down, 14).unwrap(), 0.0));
        assert_eq!(rsi(&flat, 14), Some(50.0));
        assert_eq!(rsi(&flat[..14], 14), None);
    }

    #[test]
    fn rsi_balanced_moves_is_fifty() {
        let closes: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        assert!(approx(rsi(&closes, 14).unwrap(), 50.0));
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let up: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let m = macd(&up, 12, 26, 9).unwrap();
        assert!(m.macd > 0.0);
        assert!(m.macd > m.signal);
    }

    #[test]
    fn sample_std_matches_hand_computation() {
        // mean 2.5, squared deviations 2.25+0.25+0.25+2.25 = 5, / 3
        let s = sample_std(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(approx(s, (5.0f64 / 3.0).sqrt()));
        assert_eq!(sample_std(&[1.0]), None);
    }

    #[test]
    fn pct_change_handles_short_input() {
        assert_eq!(pct_change(&[100.0, 110.0], 1), Some(10.0));
        assert_eq!(pct_change(&[100.0], 1), None);
    }
}
