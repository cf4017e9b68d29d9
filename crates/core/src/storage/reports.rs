use crate::domain::recommendation::SignalReport;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A successful report row as served by the API.
#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub report_id: Uuid,
    pub provider: String,
    pub report: SignalReport,
}

pub async fn persist_success(
    pool: &sqlx::PgPool,
    report: &SignalReport,
    provider: &str,
    raw_llm_response: Option<serde_json::Value>,
) -> anyhow::Result<Uuid> {
    let report_json =
        serde_json::to_value(report).context("failed to serialize signal report")?;

    let report_id: Uuid = sqlx::query_scalar(
        "INSERT INTO signal_reports \
         (id, symbol, as_of_date, generated_at, provider, status, error, strategy, direction, probability, degraded, report, raw_llm_response) \
         VALUES ($1, $2, $3, $4, $5, 'success', NULL, $6, $7, $8, $9, $10, $11) \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(&report.symbol)
    .bind(report.as_of_date)
    .bind(report.generated_at)
    .bind(provider)
    .bind(report.recommendation.strategy.label())
    .bind(report.recommendation.direction.as_str())
    .bind(report.recommendation.probability)
    .bind(report.is_degraded())
    .bind(report_json)
    .bind(raw_llm_response)
    .fetch_one(pool)
    .await
    .context("insert signal_reports failed")?;

    Ok(report_id)
}

pub async fn persist_failure(
    pool: &sqlx::PgPool,
    symbol: &str,
    as_of_date: NaiveDate,
    generated_at: DateTime<Utc>,
    provider: &str,
    error: &str,
    raw_llm_response: Option<serde_json::Value>,
) -> anyhow::Result<Uuid> {
    let report_id: Uuid = sqlx::query_scalar(
        "INSERT INTO signal_reports \
         (id, symbol, as_of_date, generated_at, provider, status, error, raw_llm_response) \
         VALUES ($1, $2, $3, $4, $5, 'error', $6, $7) \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(symbol)
    .bind(as_of_date)
    .bind(generated_at)
    .bind(provider)
    .bind(error)
    .bind(raw_llm_response)
    .fetch_one(pool)
    .await
    .context("insert error signal_reports failed")?;

    Ok(report_id)
}

/// Most recent successful report, optionally restricted to one symbol.
pub async fn fetch_latest(
    pool: &sqlx::PgPool,
    symbol: Option<&str>,
) -> anyhow::Result<Option<StoredReport>> {
    let row = match symbol {
        Some(s) => {
            sqlx::query_as::<_, (Uuid, String, serde_json::Value)>(
                "SELECT id, provider, report \
                 FROM signal_reports \
                 WHERE status = 'success' AND symbol = $1 \
                 ORDER BY as_of_date DESC, generated_at DESC \
                 LIMIT 1",
            )
            .bind(s.to_ascii_uppercase())
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, (Uuid, String, serde_json::Value)>(
                "SELECT id, provider, report \
                 FROM signal_reports \
                 WHERE status = 'success' \
                 ORDER BY as_of_date DESC, generated_at DESC \
                 LIMIT 1",
            )
            .fetch_optional(pool)
            .await?
        }
    };

    row.map(into_stored).transpose()
}

pub async fn fetch_by_symbol_date(
    pool: &sqlx::PgPool,
    symbol: &str,
    as_of_date: NaiveDate,
) -> anyhow::Result<Option<StoredReport>> {
    let row = sqlx::query_as::<_, (Uuid, String, serde_json::Value)>(
        "SELECT id, provider, report \
         FROM signal_reports \
         WHERE status = 'success' AND symbol = $1 AND as_of_date = $2 \
         ORDER BY generated_at DESC \
         LIMIT 1",
    )
    .bind(symbol.to_ascii_uppercase())
    .bind(as_of_date)
    .fetch_optional(pool)
    .await?;

    row.map(into_stored).transpose()
}

fn into_stored(
    (report_id, provider, report): (Uuid, String, serde_json::Value),
) -> anyhow::Result<StoredReport> {
    let report = serde_json::from_value::<SignalReport>(report)
        .with_context(|| format!("invalid report JSON in DB for report_id={report_id}"))?;
    Ok(StoredReport {
        report_id,
        provider,
        report,
    })
}
