use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Article {
    pub fn headline(title: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            body: None,
            published_at,
            source: None,
        }
    }

    pub fn text(&self) -> String {
        match self.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(body) => format!("{}. {}", self.title.trim(), body),
            None => self.title.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// Recency-weighted polarity in [-1, 1].
    pub score: f64,
    pub source_count: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub as_of: DateTime<Utc>,
}

impl SentimentScore {
    pub fn neutral(as_of: DateTime<Utc>) -> Self {
        Self {
            score: 0.0,
            source_count: 0,
            positive_count: 0,
            negative_count: 0,
            as_of,
        }
    }
}
