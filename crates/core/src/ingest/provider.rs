use crate::config::Settings;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::ingest::types::{EodBar, EodHistoryResponse};
use anyhow::{Context, Result};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/eod";
/// Bars are stamped at the US close (16:00 ET ~ 21:00 UTC).
const CLOSE_HOUR_UTC: u32 = 21;

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily bars for `symbol` ending at `as_of_date`, covering `lookback_days` calendar days.
    async fn fetch_price_history(
        &self,
        symbol: &str,
        as_of_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<PriceSeries>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonMarketData {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
}

impl HttpJsonMarketData {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let path = std::env::var("MARKET_DATA_EOD_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
        })
    }

    fn url(&self, symbol: &str) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_end_matches('/'),
            symbol
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for HttpJsonMarketData {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_price_history(
        &self,
        symbol: &str,
        as_of_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<PriceSeries> {
        let start_date = as_of_date - ChronoDuration::days(lookback_days as i64);

        let res = self
            .http
            .get(self.url(symbol))
            .headers(self.headers()?)
            .query(&[
                ("start_date", start_date.to_string()),
                ("end_date", as_of_date.to_string()),
            ])
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        if !status.is_success() {
            anyhow::bail!("market data HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<EodHistoryResponse>(&text)
            .with_context(|| format!("market data response is not a valid EOD history: {text}"))?;

        anyhow::ensure!(
            parsed.symbol.eq_ignore_ascii_case(symbol),
            "market data symbol mismatch: expected {symbol}, got {}",
            parsed.symbol
        );
        anyhow::ensure!(!parsed.bars.is_empty(), "no price data found for {symbol}");

        let bars: Vec<EodBar> = parsed
            .bars
            .into_iter()
            .filter(|b| b.date <= as_of_date)
            .collect();
        bars_to_series(&bars)
    }
}

pub fn bars_to_series(bars: &[EodBar]) -> Result<PriceSeries> {
    let points = bars
        .iter()
        .map(|b| -> Result<PricePoint> {
            let timestamp = b
                .date
                .and_hms_opt(CLOSE_HOUR_UTC, 0, 0)
                .with_context(|| format!("invalid bar date {}", b.date))?
                .and_utc();
            Ok(PricePoint {
                timestamp,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    PriceSeries::from_unsorted(points).context("provider returned an invalid price series")
}

/// Deterministic weekday bars for dry runs. Shape is a gentle drift plus two
/// superimposed cycles, so indicators are non-trivial but reproducible.
#[derive(Debug, Clone)]
pub struct SyntheticMarketData {
    pub base_price: f64,
    pub daily_drift: f64,
    pub cycle_amplitude: f64,
}

impl Default for SyntheticMarketData {
    fn default() -> Self {
        Self {
            base_price: 200.0,
            daily_drift: 0.0004,
            cycle_amplitude: 0.03,
        }
    }
}

impl SyntheticMarketData {
    pub fn bars(&self, as_of_date: NaiveDate, lookback_days: u32) -> Vec<EodBar> {
        let start = as_of_date - ChronoDuration::days(lookback_days as i64);
        let mut out = Vec::new();
        let mut day = start;
        let mut i: i32 = 0;
        while day <= as_of_date {
            if !matches!(day.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
                let t = (day.num_days_from_ce() % 10_000) as f64;
                let cycle = (t / 9.0).sin() * self.cycle_amplitude + (t / 31.0).cos() * self.cycle_amplitude / 2.0;
                let close = self.base_price * (1.0 + self.daily_drift).powi(i) * (1.0 + cycle);
                let spread = close * 0.006;
                out.push(EodBar {
                    date: day,
                    open: close - spread * (t / 5.0).sin() / 2.0,
                    high: close + spread,
                    low: close - spread,
                    close,
                    volume: 25_000_000.0 + (t / 3.0).sin().abs() * 10_000_000.0,
                });
                i += 1;
            }
            day += ChronoDuration::days(1);
        }
        out
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for SyntheticMarketData {
    fn provider_name(&self) -> &'static str {
        "synthetic"
    }

    async fn fetch_price_history(
        &self,
        _symbol: &str,
        as_of_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<PriceSeries> {
        bars_to_series(&self.bars(as_of_date, lookback_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_expected_shape() {
        let v = json!({
            "symbol": "IWM",
            "bars": [
                {"date": "2026-01-05", "open": 220.0, "high": 222.0, "low": 219.0, "close": 221.5, "volume": 3.1e7},
                {"date": "2026-01-02", "open": 218.0, "high": 221.0, "low": 217.5, "close": 220.0, "volume": 2.8e7}
            ]
        });

        let parsed: EodHistoryResponse = serde_json::from_value(v).unwrap();
        let series = bars_to_series(&parsed.bars).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![220.0, 221.5]);
    }

    #[test]
    fn rejects_non_numeric_prices_via_deserialize() {
        let v = json!({
            "symbol": "IWM",
            "bars": [{"date": "2026-01-05", "open": "220", "high": 222.0, "low": 219.0, "close": 221.5, "volume": 1.0}]
        });
        assert!(serde_json::from_value::<EodHistoryResponse>(v).is_err());
    }

    #[test]
    fn rejects_duplicate_dates() {
        let bar = EodBar {
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        assert!(bars_to_series(&[bar.clone(), bar]).is_err());
    }

    #[test]
    fn synthetic_bars_are_weekday_only_and_deterministic() {
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
        let provider = SyntheticMarketData::default();
        let a = provider.bars(as_of, 60);
        let b = provider.bars(as_of, 60);
        assert!(a.iter().all(|bar| !matches!(bar.date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)));
        assert_eq!(a.len(), b.len());
        assert_eq!(a.last().unwrap().close, b.last().unwrap().close);
        assert!(bars_to_series(&a).is_ok());
    }
}
