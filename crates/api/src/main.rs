use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iwm_signals_core::config::{PipelineOptions, Settings};
use iwm_signals_core::domain::recommendation::SignalReport;
use iwm_signals_core::ingest::news::{HttpJsonNewsSource, NewsSource, NoNewsSource};
use iwm_signals_core::ingest::provider::HttpJsonMarketData;
use iwm_signals_core::pipeline::SignalPipeline;
use iwm_signals_core::storage::reports::{self, StoredReport};

const MAX_SYMBOL_LEN: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match iwm_signals_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let pipeline = match build_live_pipeline(&settings) {
        Ok(p) => Some(Arc::new(p)),
        Err(e) => {
            tracing::warn!(error = %e, "live signals disabled; serving stored reports only");
            None
        }
    };

    let state = AppState { pool, pipeline };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/signals/:symbol", get(get_live_signal))
        .route("/reports/latest", get(get_latest_report))
        .route("/reports/:symbol/:as_of_date", get(get_report_by_symbol_and_date))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_live_pipeline(settings: &Settings) -> anyhow::Result<SignalPipeline> {
    let market = Arc::new(HttpJsonMarketData::from_settings(settings)?);
    let news: Arc<dyn NewsSource> = match HttpJsonNewsSource::from_settings(settings) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            tracing::warn!(error = %e, "news feed not configured; sentiment will be neutral");
            Arc::new(NoNewsSource)
        }
    };
    Ok(SignalPipeline::new(market, news, PipelineOptions::from_env())?)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    pipeline: Option<Arc<SignalPipeline>>,
}

#[derive(Debug, Deserialize)]
struct LiveQuery {
    as_of_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    symbol: Option<String>,
}

async fn get_live_signal(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<LiveQuery>,
) -> Result<Json<SignalReport>, StatusCode> {
    let symbol = parse_symbol(&symbol)?;
    let as_of_date = iwm_signals_core::time::us_market::resolve_as_of_date(
        query.as_of_date.as_deref(),
        chrono::Utc::now(),
    )
    .map_err(|_| StatusCode::BAD_REQUEST)?;

    let Some(pipeline) = &state.pipeline else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let outcome = pipeline.run(&symbol, as_of_date).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(outcome.report))
}

async fn get_latest_report(
    State(state): State<AppState>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<StoredReport>, StatusCode> {
    let symbol = query.symbol.as_deref().map(parse_symbol).transpose()?;

    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let report = reports::fetch_latest(pool, symbol.as_deref())
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    found(report)
}

async fn get_report_by_symbol_and_date(
    State(state): State<AppState>,
    Path((symbol, as_of_date)): Path<(String, String)>,
) -> Result<Json<StoredReport>, StatusCode> {
    let symbol = parse_symbol(&symbol)?;
    let as_of_date =
        NaiveDate::parse_from_str(&as_of_date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let report = reports::fetch_by_symbol_date(pool, &symbol, as_of_date)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    found(report)
}

fn found(report: Option<StoredReport>) -> Result<Json<StoredReport>, StatusCode> {
    report.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Tickers are short runs of ASCII letters, digits, '.' or '-'.
fn parse_symbol(raw: &str) -> Result<String, StatusCode> {
    let s = raw.trim().to_ascii_uppercase();
    let ok = !s.is_empty()
        && s.len() <= MAX_SYMBOL_LEN
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if ok {
        Ok(s)
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_normalized_and_checked() {
        assert_eq!(parse_symbol(" iwm ").unwrap(), "IWM");
        assert_eq!(parse_symbol("BRK.B").unwrap(), "BRK.B");
        assert_eq!(parse_symbol(""), Err(StatusCode::BAD_REQUEST));
        assert_eq!(parse_symbol("IWM;DROP"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(parse_symbol("ABCDEFGHIJK"), Err(StatusCode::BAD_REQUEST));
    }

    fn degraded() -> State<AppState> {
        State(AppState {
            pool: None,
            pipeline: None,
        })
    }

    fn live(as_of_date: Option<&str>) -> Query<LiveQuery> {
        Query(LiveQuery {
            as_of_date: as_of_date.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn live_signal_without_pipeline_is_unavailable() {
        let res = get_live_signal(degraded(), Path("iwm".to_string()), live(Some("2026-03-06"))).await;
        assert_eq!(res.err(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn live_signal_rejects_bad_input_before_running() {
        let bad_date = get_live_signal(degraded(), Path("IWM".to_string()), live(Some("03/06/2026"))).await;
        assert_eq!(bad_date.err(), Some(StatusCode::BAD_REQUEST));

        let bad_symbol = get_live_signal(degraded(), Path("IWM;DROP".to_string()), live(None)).await;
        assert_eq!(bad_symbol.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn stored_reports_without_database_are_unavailable() {
        let latest = get_latest_report(degraded(), Query(LatestQuery { symbol: None })).await;
        assert_eq!(latest.err(), Some(StatusCode::SERVICE_UNAVAILABLE));

        let by_date = get_report_by_symbol_and_date(
            degraded(),
            Path(("IWM".to_string(), "2026-03-06".to_string())),
        )
        .await;
        assert_eq!(by_date.err(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn stored_report_lookup_validates_path() {
        let bad_date = get_report_by_symbol_and_date(
            degraded(),
            Path(("IWM".to_string(), "2026-02-30".to_string())),
        )
        .await;
        assert_eq!(bad_date.err(), Some(StatusCode::BAD_REQUEST));

        let bad_symbol = get_latest_report(
            degraded(),
            Query(LatestQuery {
                symbol: Some(String::new()),
            }),
        )
        .await;
        assert_eq!(bad_symbol.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn missing_report_is_not_found() {
        assert_eq!(found(None).err(), Some(StatusCode::NOT_FOUND));
    }
}
