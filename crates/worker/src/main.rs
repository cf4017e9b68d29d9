use anyhow::Context;
use clap::Parser;
use iwm_signals_core::config::{PipelineOptions, Settings, DEFAULT_SYMBOL};
use iwm_signals_core::ingest::news::{HttpJsonNewsSource, NewsSource, NoNewsSource, StaticNewsSource};
use iwm_signals_core::ingest::provider::{HttpJsonMarketData, MarketDataProvider, SyntheticMarketData};
use iwm_signals_core::llm::anthropic::AnthropicClient;
use iwm_signals_core::pipeline::SignalPipeline;
use iwm_signals_core::signal::AnalystRating;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "iwm_signals_worker")]
struct Args {
    /// Ticker to analyze.
    #[arg(long, default_value = DEFAULT_SYMBOL)]
    symbol: String,

    /// Market as-of date (YYYY-MM-DD). Defaults to the last completed US session.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Do everything except writing to the database.
    #[arg(long)]
    dry_run: bool,

    /// Use deterministic synthetic prices and fixed headlines instead of the HTTP feeds.
    #[arg(long)]
    synthetic: bool,

    /// Ask the LLM for a strategy narrative (requires ANTHROPIC_API_KEY).
    #[arg(long)]
    with_narrative: bool,

    /// Analyst consensus, e.g. "Buy" or "Underweight", used for alignment confidence.
    #[arg(long)]
    analyst_rating: Option<String>,
}

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

    let args = Args::parse();

    let as_of_date = iwm_signals_core::time::us_market::resolve_as_of_date(
        args.as_of_date.as_deref(),
        chrono::Utc::now(),
    )?;
    let symbol = args.symbol.trim().to_ascii_uppercase();

    let pipeline = build_pipeline(&settings, &args)?;
    let provider = pipeline.market_provider_name();

    if args.dry_run {
        let outcome = pipeline.run(&symbol, as_of_date).await?;
        tracing::info!(
            %symbol,
            %as_of_date,
            dry_run = true,
            degraded = outcome.report.degraded.len(),
            "signal run finished (dry-run)"
        );
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    iwm_signals_core::storage::migrate(&pool).await?;

    let acquired =
        iwm_signals_core::storage::lock::try_acquire_run_lock(&pool, &symbol, as_of_date).await?;
    if !acquired {
        tracing::warn!(%symbol, %as_of_date, "run lock not acquired; another run in progress");
        return Ok(());
    }

    let result = pipeline.run(&symbol, as_of_date).await;

    match result {
        Ok(outcome) => {
            let report_id = iwm_signals_core::storage::reports::persist_success(
                &pool,
                &outcome.report,
                provider,
                outcome.raw_llm_response,
            )
            .await?;

            tracing::info!(
                %symbol,
                %as_of_date,
                %report_id,
                strategy = outcome.report.recommendation.strategy.label(),
                degraded = outcome.report.is_degraded(),
                "persisted signal report"
            );
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            let report_id = iwm_signals_core::storage::reports::persist_failure(
                &pool,
                &symbol,
                as_of_date,
                chrono::Utc::now(),
                provider,
                &format!("{:#}", err),
                None,
            )
            .await?;

            tracing::error!(%symbol, %as_of_date, %report_id, error = %err, "signal run failed");
        }
    }

    let _ = iwm_signals_core::storage::lock::release_run_lock(&pool, &symbol, as_of_date).await;
    Ok(())
}

fn build_pipeline(settings: &Settings, args: &Args) -> anyhow::Result<SignalPipeline> {
    let market: Arc<dyn MarketDataProvider> = if args.synthetic {
        Arc::new(SyntheticMarketData::default())
    } else {
        Arc::new(HttpJsonMarketData::from_settings(settings)?)
    };

    let news = news_source(settings, args.synthetic);

    let options = PipelineOptions::from_env();
    let mut pipeline = SignalPipeline::new(market, news, options)
        .context("invalid pipeline configuration")?
        .with_analyst_rating(args.analyst_rating.as_deref().and_then(AnalystRating::parse));

    if args.with_narrative {
        pipeline = pipeline.with_narrator(Arc::new(AnthropicClient::from_settings(settings)?));
    }

    Ok(pipeline)
}

/// Fixed headlines only under `--synthetic`; a missing feed yields no articles.
fn news_source(settings: &Settings, synthetic: bool) -> Arc<dyn NewsSource> {
    if synthetic {
        return Arc::new(StaticNewsSource);
    }
    match HttpJsonNewsSource::from_settings(settings) {
        Ok(source) => Arc::new(source),
        Err(err) => {
            tracing::warn!(error = %err, "news feed not configured; sentiment will be neutral");
            Arc::new(NoNewsSource)
        }
    }
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
