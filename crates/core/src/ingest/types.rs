use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EodHistoryResponse {
    pub symbol: String,
    pub bars: Vec<EodBar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EodBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsResponse {
    pub articles: Vec<NewsItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<String>,
}
