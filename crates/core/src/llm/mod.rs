use crate::domain::contract::StrategyInsight;
use crate::domain::recommendation::Recommendation;
use crate::domain::sentiment::SentimentScore;
use crate::features::TechnicalSnapshot;
use serde_json::json;

pub mod anthropic;
pub mod error;
pub mod json;

/// Market context handed to the narrator, already reduced to JSON.
#[derive(Debug, Clone)]
pub struct StrategyInput {
    pub symbol: String,
    pub as_of_date: chrono::NaiveDate,
    pub market_json: serde_json::Value,
}

impl StrategyInput {
    pub fn new(
        symbol: &str,
        as_of_date: chrono::NaiveDate,
        snapshot: Option<&TechnicalSnapshot>,
        sentiment: &SentimentScore,
        recommendation: &Recommendation,
        recent_news: &[String],
    ) -> Self {
        let technical = snapshot.map(|s| {
            json!({
                "current_price": s.price_action.current_price,
                "daily_change_pct": s.price_action.daily_change_pct,
                "weekly_change_pct": s.price_action.weekly_change_pct,
                "monthly_change_pct": s.price_action.monthly_change_pct,
                "sma_20": s.sma_20,
                "sma_50": s.sma_50,
                "sma_200": s.sma_200,
                "rsi_14": s.rsi_14,
                "macd": s.macd,
                "macd_signal": s.macd_signal,
                "annualized_volatility": s.annualized_volatility,
                "regime": s.regime.as_str(),
                "technical_bias": s.technical_bias.as_str(),
            })
        });

        let market_json = json!({
            "symbol": symbol,
            "technical": technical,
            "sentiment": {
                "score": sentiment.score,
                "positive_count": sentiment.positive_count,
                "negative_count": sentiment.negative_count,
                "source_count": sentiment.source_count,
            },
            "recommendation": {
                "strategy": recommendation.strategy.label(),
                "direction": recommendation.direction.as_str(),
                "probability": recommendation.probability,
            },
            "recent_news": recent_news,
        });

        Self {
            symbol: symbol.to_string(),
            as_of_date,
            market_json,
        }
    }

    pub fn market_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.market_json).unwrap_or_else(|_| self.market_json.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic,
}

#[async_trait::async_trait]
pub trait StrategyNarrator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_strategy(&self, input: StrategyInput) -> anyhow::Result<StrategyInsight>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn input_without_snapshot_has_null_technical() {
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
        let sentiment = SentimentScore::neutral(Utc.with_ymd_and_hms(2026, 3, 6, 21, 0, 0).unwrap());
        let input = StrategyInput::new(
            "IWM",
            as_of,
            None,
            &sentiment,
            &Recommendation::neutral_default(),
            &["IWM Reports Strong Quarterly Results".to_string()],
        );

        assert!(input.market_json["technical"].is_null());
        assert_eq!(input.market_json["recommendation"]["strategy"], "No Trade");
        assert_eq!(input.market_json["recent_news"][0], "IWM Reports Strong Quarterly Results");
    }
}
