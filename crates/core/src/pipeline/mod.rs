//! One end-of-day signal run for a single symbol.
//!
//! Every stage after the fetches is local and non-fatal: a failing stage falls
//! back to its neutral default and leaves a note in [`SignalReport::degraded`].

use crate::config::PipelineOptions;
use crate::domain::recommendation::{Recommendation, SignalReport, StrategyNarrative};
use crate::domain::sentiment::SentimentScore;
use crate::features;
use crate::ingest::news::NewsSource;
use crate::ingest::provider::MarketDataProvider;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{StrategyInput, StrategyNarrator};
use crate::options::StrategyBuilder;
use crate::predict::{predict_or_last_bar, PricePredictor, VolatilityBandPredictor};
use crate::sentiment::{FinancialLexicon, SentimentAggregator};
use crate::signal::{alignment_confidence, AnalystRating, SignalComposer};
use crate::SignalError;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

const RECENT_NEWS_LIMIT: usize = 5;
/// US session close in UTC, used as the reference time for sentiment decay.
const SESSION_CLOSE_HOUR_UTC: u32 = 21;

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: SignalReport,
    /// Raw LLM response kept when the narrative failed, for later inspection.
    pub raw_llm_response: Option<serde_json::Value>,
}

pub struct SignalPipeline {
    market: Arc<dyn MarketDataProvider>,
    news: Arc<dyn NewsSource>,
    narrator: Option<Arc<dyn StrategyNarrator>>,
    predictor: Box<dyn PricePredictor>,
    aggregator: SentimentAggregator<FinancialLexicon>,
    composer: SignalComposer,
    builder: StrategyBuilder,
    options: PipelineOptions,
    analyst_rating: Option<AnalystRating>,
}

impl SignalPipeline {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        news: Arc<dyn NewsSource>,
        options: PipelineOptions,
    ) -> Result<Self, SignalError> {
        options.validate()?;
        if options.window < features::MIN_WINDOW {
            return Err(SignalError::InvalidWindow {
                window: options.window,
                min: features::MIN_WINDOW,
            });
        }

        Ok(Self {
            market,
            news,
            narrator: None,
            predictor: Box::new(VolatilityBandPredictor::default()),
            aggregator: SentimentAggregator::new(
                FinancialLexicon::default(),
                options.sentiment_half_life_hours,
            )?,
            composer: SignalComposer::new(options.weights)?,
            builder: StrategyBuilder::new(options.options_horizon_days, options.risk_free_rate),
            options,
            analyst_rating: None,
        })
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn StrategyNarrator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_predictor(mut self, predictor: Box<dyn PricePredictor>) -> Self {
        self.predictor = predictor;
        self
    }

    /// Consensus rating folded into the narrative's alignment confidence.
    pub fn with_analyst_rating(mut self, rating: Option<AnalystRating>) -> Self {
        self.analyst_rating = rating;
        self
    }

    pub fn market_provider_name(&self) -> &'static str {
        self.market.provider_name()
    }

    pub async fn run(&self, symbol: &str, as_of_date: NaiveDate) -> anyhow::Result<PipelineOutcome> {
        let symbol = symbol.trim().to_ascii_uppercase();
        anyhow::ensure!(!symbol.is_empty(), "symbol must be non-empty");

        let reference_time = session_close(as_of_date)?;
        let mut degraded = Vec::new();

        let (prices, articles) = tokio::join!(
            self.market
                .fetch_price_history(&symbol, as_of_date, self.options.lookback_days),
            self.news.fetch_articles(&symbol, reference_time),
        );

        let series = match prices {
            Ok(series) => Some(series),
            Err(err) => {
                note(&mut degraded, &symbol, "price_history", format!("{err:#}"));
                None
            }
        };

        let snapshot = series.as_ref().and_then(|s| {
            match features::extract(s, self.options.window, &self.options.thresholds) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    note(&mut degraded, &symbol, "features", err.to_string());
                    None
                }
            }
        });

        let articles = match articles {
            Ok(articles) => articles,
            Err(err) => {
                note(&mut degraded, &symbol, "news", format!("{err:#}"));
                Vec::new()
            }
        };
        let recent_news: Vec<String> = articles
            .iter()
            .take(RECENT_NEWS_LIMIT)
            .map(|a| a.title.clone())
            .collect();

        let sentiment = match self.aggregator.aggregate(&articles, reference_time) {
            Ok(score) => score,
            Err(err) => {
                note(&mut degraded, &symbol, "sentiment", err.to_string());
                SentimentScore::neutral(reference_time)
            }
        };

        let recommendation = match &snapshot {
            Some(s) => self.composer.compose(s, &sentiment),
            None => Recommendation::neutral_default(),
        };

        let price_range = series
            .as_ref()
            .and_then(|s| predict_or_last_bar(self.predictor.as_ref(), s));

        let options = snapshot.as_ref().and_then(|s| {
            self.builder.build(
                recommendation.strategy,
                s.price_action.current_price,
                s.annualized_volatility,
            )
        });

        let mut raw_llm_response = None;
        let narrative = match &self.narrator {
            None => None,
            Some(narrator) => {
                let input = StrategyInput::new(
                    &symbol,
                    as_of_date,
                    snapshot.as_ref(),
                    &sentiment,
                    &recommendation,
                    &recent_news,
                );
                match narrator.generate_strategy(input).await {
                    Ok(insight) => {
                        let alignment_confidence = alignment_confidence(
                            insight.strategy,
                            snapshot.as_ref().and_then(|s| s.rsi_14),
                            sentiment.score,
                            self.analyst_rating,
                        );
                        Some(StrategyNarrative {
                            insight,
                            alignment_confidence,
                        })
                    }
                    Err(err) => {
                        if let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() {
                            raw_llm_response = diag.raw_response_json.clone();
                        }
                        note(&mut degraded, &symbol, "narrative", format!("{err:#}"));
                        None
                    }
                }
            }
        };

        tracing::info!(
            %symbol,
            %as_of_date,
            strategy = recommendation.strategy.label(),
            direction = %recommendation.direction,
            probability = recommendation.probability,
            degraded = degraded.len(),
            "signal run complete"
        );

        Ok(PipelineOutcome {
            report: SignalReport {
                symbol,
                as_of_date,
                generated_at: Utc::now(),
                snapshot,
                sentiment,
                recent_news,
                recommendation,
                price_range,
                options,
                narrative,
                degraded,
            },
            raw_llm_response,
        })
    }
}

pub fn session_close(as_of_date: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    Ok(as_of_date
        .and_hms_opt(SESSION_CLOSE_HOUR_UTC, 0, 0)
        .with_context(|| format!("invalid as-of date {as_of_date}"))?
        .and_utc())
}

fn note(degraded: &mut Vec<String>, symbol: &str, stage: &str, reason: String) {
    tracing::warn!(%symbol, stage, reason = %reason, "stage degraded to default");
    degraded.push(format!("{stage}: {reason}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::StrategyInsight;
    use crate::domain::price::{fixtures, PriceSeries};
    use crate::domain::recommendation::{Direction, StrategyKind};
        use crate::features::VolatilityRegime;
    use crate::ingest::news::{NoNewsSource, StaticNewsSource};
    use crate::llm::Provider;

    struct FixedPrices(PriceSeries);

    #[async_trait::async_trait]
    impl MarketDataProvider for FixedPrices {
        fn provider_name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_price_history(
            &self,
            _symbol: &str,
            _as_of_date: NaiveDate,
            _lookback_days: u32,
        ) -> anyhow::Result<PriceSeries> {
            Ok(self.0.clone())
        }
    }

    struct DownMarket;

    #[async_trait::async_trait]
    impl MarketDataProvider for DownMarket {
        fn provider_name(&self) -> &'static str {
            "down"
        }

        async fn fetch_price_history(
            &self,
            symbol: &str,
            _as_of_date: NaiveDate,
            _lookback_days: u32,
        ) -> anyhow::Result<PriceSeries> {
            anyhow::bail!("no price data found for {symbol}")
        }
    }

    struct BearishNarrator;

    #[async_trait::async_trait]
    impl StrategyNarrator for BearishNarrator {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn generate_strategy(&self, _input: StrategyInput) -> anyhow::Result<StrategyInsight> {
            Ok(StrategyInsight {
                strategy: Direction::Bearish,
                reasons: vec!["Overbought".to_string()],
                risks: vec!["Momentum persists".to_string()],
                position_size: "1% of portfolio".to_string(),
                entry_points: vec!["Near resistance".to_string()],
                exit_points: vec!["Above prior high".to_string()],
            })
        }
    }

    struct BrokenNarrator;

    #[async_trait::async_trait]
    impl StrategyNarrator for BrokenNarrator {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn generate_strategy(&self, _input: StrategyInput) -> anyhow::Result<StrategyInsight> {
            Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "parse_after_repair",
                detail: "not json".to_string(),
                raw_output: Some("nope".to_string()),
                raw_response_json: Some(serde_json::json!({"content": []})),
            }
            .into())
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 21).unwrap()
    }

    fn options(window: usize) -> PipelineOptions {
        PipelineOptions {
            window,
            ..PipelineOptions::default()
        }
    }

    #[tokio::test]
    async fn flat_history_is_low_volatility_and_neutral() {
        let pipeline = SignalPipeline::new(
            Arc::new(FixedPrices(fixtures::flat(100.0, 20))),
            Arc::new(NoNewsSource),
            options(20),
        )
        .unwrap();

        let report = pipeline.run("iwm", as_of()).await.unwrap().report;
        let snapshot = report.snapshot.as_ref().unwrap();

        assert_eq!(report.symbol, "IWM");
        assert_eq!(snapshot.regime, VolatilityRegime::Low);
        assert_eq!(report.recommendation.direction, Direction::Neutral);
        assert_eq!(report.recommendation.strategy, StrategyKind::LongStraddle);
        assert_eq!(report.sentiment.score, 0.0);
        assert_eq!(report.sentiment.source_count, 0);
        assert!(!report.options.as_ref().unwrap().payoff_curve.is_empty());
        // Only the empty news feed is degraded.
        assert_eq!(report.degraded.len(), 1);
        assert!(report.degraded[0].starts_with("sentiment"));
    }

    #[tokio::test]
    async fn missing_news_feed_keeps_sentiment_out_of_the_score() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 * 1.003f64.powi(i)).collect();
        let pipeline = SignalPipeline::new(
            Arc::new(FixedPrices(fixtures::from_closes(&closes))),
            Arc::new(NoNewsSource),
            options(20),
        )
        .unwrap();

        let report = pipeline.run("IWM", as_of()).await.unwrap().report;
        assert_eq!(report.sentiment.score, 0.0);
        assert_eq!(report.sentiment.source_count, 0);
        assert!(report.recent_news.is_empty());
        assert_eq!(report.degraded, vec![format!("sentiment: {}", SignalError::NoData)]);

        let news = report
            .recommendation
            .factors
            .iter()
            .find(|f| f.name == "news_sentiment")
            .unwrap();
        assert_eq!(news.weight, 0.0);
        // The 20-session window still feeds the monthly momentum factor.
        let momentum = report
            .recommendation
            .factors
            .iter()
            .find(|f| f.name == "momentum")
            .unwrap();
        assert!(momentum.weight > 0.0);
    }

    #[tokio::test]
    async fn short_history_yields_neutral_default() {
        let pipeline = SignalPipeline::new(
            Arc::new(FixedPrices(fixtures::flat(100.0, 10))),
            Arc::new(StaticNewsSource),
            options(20),
        )
        .unwrap();

        let report = pipeline.run("IWM", as_of()).await.unwrap().report;
        assert!(report.snapshot.is_none());
        assert_eq!(report.recommendation, Recommendation::neutral_default());
        assert!(report.options.is_none());
        assert!(report.degraded.iter().any(|d| d.starts_with("features")));
        // News still flows through.
        assert_eq!(report.sentiment.source_count, 5);
        assert_eq!(report.recent_news.len(), 5);
    }

    #[tokio::test]
    async fn market_outage_degrades_instead_of_failing() {
        let pipeline =
            SignalPipeline::new(Arc::new(DownMarket), Arc::new(NoNewsSource), options(20)).unwrap();

        let report = pipeline.run("IWM", as_of()).await.unwrap().report;
        assert!(report.price_range.is_none());
        assert_eq!(report.recommendation.strategy, StrategyKind::NoTrade);
        assert!(report.degraded.iter().any(|d| d.starts_with("price_history")));
    }

    #[tokio::test]
    async fn narrative_gets_alignment_confidence() {
        let pipeline = SignalPipeline::new(
            Arc::new(FixedPrices(fixtures::flat(100.0, 30))),
            Arc::new(NoNewsSource),
            options(30),
        )
        .unwrap()
        .with_narrator(Arc::new(BearishNarrator))
        .with_analyst_rating(AnalystRating::parse("Strong Buy"));

        let report = pipeline.run("IWM", as_of()).await.unwrap().report;
        let narrative = report.narrative.unwrap();
        assert_eq!(narrative.insight.strategy, Direction::Bearish);
        // RSI is 50 and sentiment neutral, so only the analyst vote counts, against.
        assert!((narrative.alignment_confidence - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn narrative_failure_keeps_raw_response() {
        let pipeline = SignalPipeline::new(
            Arc::new(FixedPrices(fixtures::flat(100.0, 30))),
            Arc::new(StaticNewsSource),
            options(30),
        )
        .unwrap()
        .with_narrator(Arc::new(BrokenNarrator));

        let outcome = pipeline.run("IWM", as_of()).await.unwrap();
        assert!(outcome.report.narrative.is_none());
        assert!(outcome.raw_llm_response.is_some());
        assert!(outcome.report.degraded.iter().any(|d| d.starts_with("narrative")));
    }

    #[test]
    fn rejects_window_below_minimum() {
        let result = SignalPipeline::new(Arc::new(DownMarket), Arc::new(NoNewsSource), options(2));
        assert!(matches!(result, Err(SignalError::InvalidWindow { .. })));
    }

    #[tokio::test]
    async fn rejects_blank_symbol() {
        let pipeline =
            SignalPipeline::new(Arc::new(DownMarket), Arc::new(NoNewsSource), options(20)).unwrap();
        assert!(pipeline.run("  ", as_of()).await.is_err());
    }
}
