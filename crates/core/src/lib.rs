pub mod domain;
pub mod error;
pub mod features;
pub mod ingest;
pub mod llm;
pub mod options;
pub mod pipeline;
pub mod predict;
pub mod sentiment;
pub mod signal;
pub mod storage;
pub mod time;

pub use error::SignalError;

pub mod config {
    use crate::features::RegimeThresholds;
    use crate::signal::SignalWeights;
    use anyhow::Context;

    pub const DEFAULT_SYMBOL: &str = "IWM";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub market_data_api_key: Option<String>,
        pub news_base_url: Option<String>,
        pub news_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                market_data_api_key: std::env::var("NASDAQ_API_KEY").ok(),
                news_base_url: std::env::var("NEWS_BASE_URL").ok(),
                news_api_key: std::env::var("NEWS_API_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_market_data_base_url(&self) -> anyhow::Result<&str> {
            self.market_data_base_url
                .as_deref()
                .context("MARKET_DATA_BASE_URL is required")
        }

        pub fn require_news_base_url(&self) -> anyhow::Result<&str> {
            self.news_base_url
                .as_deref()
                .context("NEWS_BASE_URL is required")
        }
    }

    /// Tunables for a single pipeline run.
    #[derive(Debug, Clone)]
    pub struct PipelineOptions {
        /// Number of trailing sessions the feature extractor looks at.
        pub window: usize,

        /// Calendar days of history requested from the market data provider.
        pub lookback_days: u32,

        pub weights: SignalWeights,
        pub thresholds: RegimeThresholds,
        pub sentiment_half_life_hours: f64,
        pub options_horizon_days: u32,
        pub risk_free_rate: f64,
    }

    impl Default for PipelineOptions {
        fn default() -> Self {
            Self {
                window: 200,
                lookback_days: 365,
                weights: SignalWeights::default(),
                thresholds: RegimeThresholds::default(),
                sentiment_half_life_hours: 24.0,
                options_horizon_days: 28,
                risk_free_rate: 0.04,
            }
        }
    }

    impl PipelineOptions {
        pub fn from_env() -> Self {
            let mut out = Self::default();

            if let Some(n) = env_parse::<usize>("SIGNAL_WINDOW") {
                out.window = n;
            }
            if let Some(n) = env_parse::<u32>("SIGNAL_LOOKBACK_DAYS") {
                out.lookback_days = n;
            }
            if let Some(v) = env_parse::<f64>("SIGNAL_WEIGHT_TECHNICAL") {
                out.weights.technical = v;
            }
            if let Some(v) = env_parse::<f64>("SIGNAL_WEIGHT_RSI") {
                out.weights.rsi = v;
            }
            if let Some(v) = env_parse::<f64>("SIGNAL_WEIGHT_SENTIMENT") {
                out.weights.sentiment = v;
            }
            if let Some(v) = env_parse::<f64>("SIGNAL_WEIGHT_MOMENTUM") {
                out.weights.momentum = v;
            }
            if let Some(v) = env_parse::<f64>("SIGNAL_NEUTRAL_BAND") {
                out.weights.neutral_band = v;
            }
            if let Some(v) = env_parse::<f64>("REGIME_LOW_MAX") {
                out.thresholds.low_max = v;
            }
            if let Some(v) = env_parse::<f64>("REGIME_NORMAL_MAX") {
                out.thresholds.normal_max = v;
            }
            if let Some(v) = env_parse::<f64>("REGIME_HIGH_MAX") {
                out.thresholds.high_max = v;
            }
            if let Some(v) = env_parse::<f64>("SENTIMENT_HALF_LIFE_HOURS") {
                out.sentiment_half_life_hours = v;
            }
            if let Some(n) = env_parse::<u32>("OPTIONS_HORIZON_DAYS") {
                out.options_horizon_days = n;
            }
            if let Some(v) = env_parse::<f64>("RISK_FREE_RATE") {
                out.risk_free_rate = v;
            }

            out
        }

        pub fn validate(&self) -> Result<(), crate::SignalError> {
            self.weights.validate()?;
            self.thresholds.validate()?;
            if !(self.sentiment_half_life_hours > 0.0) {
                return Err(crate::SignalError::InvalidConfig(format!(
                    "sentiment half-life must be positive (got {})",
                    self.sentiment_half_life_hours
                )));
            }
            if self.options_horizon_days == 0 {
                return Err(crate::SignalError::InvalidConfig(
                    "options horizon must be at least one day".to_string(),
                ));
            }
            Ok(())
        }
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

}
