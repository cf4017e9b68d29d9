use crate::config::Settings;
use crate::domain::sentiment::Article;
use crate::ingest::types::NewsResponse;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_LIMIT: u32 = 50;

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Articles about `symbol` published at or before `as_of`. May be empty.
    async fn fetch_articles(&self, symbol: &str, as_of: DateTime<Utc>) -> Result<Vec<Article>>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonNewsSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limit: u32,
}

impl HttpJsonNewsSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_news_base_url()?.to_string();

        let limit = std::env::var("NEWS_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_LIMIT);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build news http client")?;

        Ok(Self {
            http,
            base_url,
            api_key: settings.news_api_key.clone(),
            limit,
        })
    }
}

#[async_trait::async_trait]
impl NewsSource for HttpJsonNewsSource {
    fn source_name(&self) -> &'static str {
        "news_http_json"
    }

    async fn fetch_articles(&self, symbol: &str, as_of: DateTime<Utc>) -> Result<Vec<Article>> {
        let url = format!("{}/v1/news", self.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(key)?);
        }

        let res = self
            .http
            .get(url)
            .headers(headers)
            .query(&[("symbol", symbol.to_string()), ("limit", self.limit.to_string())])
            .send()
            .await
            .context("news request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read news response")?;
        if !status.is_success() {
            anyhow::bail!("news HTTP {status}: {text}");
        }

        let parsed: NewsResponse =
            serde_json::from_str(&text).context("news response is not valid JSON")?;

        Ok(into_articles(parsed, as_of))
    }
}

/// Drops untitled items and anything published after `as_of`, newest first.
pub fn into_articles(resp: NewsResponse, as_of: DateTime<Utc>) -> Vec<Article> {
    let mut out: Vec<Article> = resp
        .articles
        .into_iter()
        .filter(|n| !n.title.trim().is_empty() && n.published_at <= as_of)
        .map(|n| Article {
            title: n.title.trim().to_string(),
            body: n.body.filter(|b| !b.trim().is_empty()),
            published_at: n.published_at,
            source: n.source,
        })
        .collect();
    out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    out
}

/// Fixed headlines stamped over the preceding hours. Dry runs and tests only.
#[derive(Debug, Clone, Default)]
pub struct StaticNewsSource;

const TEMPLATES: [&str; 5] = [
    "{s} Reports Strong Quarterly Results",
    "Analysts Upgrade {s} Stock Rating",
    "Market Concerns Impact {s} Trading",
    "New Product Launch Boosts {s} Outlook",
    "{s} Announces Strategic Partnership",
];

impl StaticNewsSource {
    pub fn headlines(&self, symbol: &str, as_of: DateTime<Utc>) -> Vec<Article> {
        TEMPLATES
            .iter()
            .enumerate()
            .map(|(i, t)| Article {
                title: t.replace("{s}", symbol),
                body: None,
                published_at: as_of - ChronoDuration::hours(6 * i as i64),
                source: Some("static".to_string()),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl NewsSource for StaticNewsSource {
    fn source_name(&self) -> &'static str {
        "static"
    }

    async fn fetch_articles(&self, symbol: &str, as_of: DateTime<Utc>) -> Result<Vec<Article>> {
        Ok(self.headlines(symbol, as_of))
    }
}

/// Stand-in when no news feed is configured. Always empty, so the sentiment
/// stage reports `NoData` and the run records a degraded note.
#[derive(Debug, Clone, Default)]
pub struct NoNewsSource;

#[async_trait::async_trait]
impl NewsSource for NoNewsSource {
    fn source_name(&self) -> &'static str {
        "none"
    }

    async fn fetch_articles(&self, _symbol: &str, _as_of: DateTime<Utc>) -> Result<Vec<Article>> {
        Ok(Vec::new())
    }
}
