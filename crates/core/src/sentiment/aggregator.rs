use crate::domain::sentiment::{Article, SentimentScore};
use crate::sentiment::PolarityScorer;
use crate::SignalError;
use chrono::{DateTime, Utc};

/// Folds per-article polarity into one recency-weighted score.
pub struct SentimentAggregator<S> {
    scorer: S,
    half_life_hours: f64,
}

impl<S: PolarityScorer> SentimentAggregator<S> {
    pub fn new(scorer: S, half_life_hours: f64) -> Result<Self, SignalError> {
        if !(half_life_hours.is_finite() && half_life_hours > 0.0) {
            return Err(SignalError::InvalidConfig(format!(
                "sentiment half-life must be positive (got {half_life_hours})"
            )));
        }
        Ok(Self {
            scorer,
            half_life_hours,
        })
    }

    /// Weight halves every `half_life_hours` of article age. Articles stamped after
    /// `reference_time` count as fresh.
    pub fn recency_weight(&self, published_at: DateTime<Utc>, reference_time: DateTime<Utc>) -> f64 {
        let age_hours = ((reference_time - published_at).num_seconds().max(0)) as f64 / 3600.0;
        0.5_f64.powf(age_hours / self.half_life_hours)
    }

    pub fn aggregate(
        &self,
        articles: &[Article],
        reference_time: DateTime<Utc>,
    ) -> Result<SentimentScore, SignalError> {
        if articles.is_empty() {
            return Err(SignalError::NoData);
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        let mut positive_count = 0;
        let mut negative_count = 0;

        for article in articles {
            let polarity = self.scorer.polarity(&article.text());
            if polarity > 0.0 {
                positive_count += 1;
            } else if polarity < 0.0 {
                negative_count += 1;
            }

            let w = self.recency_weight(article.published_at, reference_time);
            weighted_sum += polarity * w;
            total_weight += w;
        }

        // Underflow only happens for articles many hundreds of half-lives old.
        let score = if total_weight > 0.0 {
            (weighted_sum / total_weight).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        tracing::debug!(
            articles = articles.len(),
            positive_count,
            negative_count,
            score,
            "aggregated news sentiment"
        );

        Ok(SentimentScore {
            score,
            source_count: articles.len(),
            positive_count,
            negative_count,
            as_of: reference_time,
        })
    }
}
