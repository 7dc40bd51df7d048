use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisory_core::config::Settings;
use advisory_core::domain::asset::Category;
use advisory_core::engine::AdvisorEngine;
use advisory_core::storage::lock::{self, Job};
use advisory_core::storage::{AdvisorStore, MemoryStore, PgStore};
use advisory_core::time::us_market;

mod watchlist;

#[derive(Debug, Parser)]
#[command(name = "advisory_worker")]
struct Args {
    /// Market date (YYYY-MM-DD). Defaults to today's US market date.
    #[arg(long, global = true)]
    date: Option<String>,

    /// Run against an in-memory store; nothing is written to the database.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Run even when the market is closed on the given date.
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate one advice for an explicit or rotated watchlist symbol.
    Generate {
        #[arg(long)]
        symbol: Option<String>,

        /// crypto | stocks | etf | indices
        #[arg(long)]
        category: Option<String>,
    },
    /// Evaluate matured pending advice and adapt the strategy.
    Evaluate,
}

impl Command {
    fn job(&self) -> Job {
        match self {
            Command::Generate { .. } => Job::Generate,
            Command::Evaluate => Job::Evaluate,
        }
    }
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

    let market_date = us_market::resolve_market_date(args.date.as_deref(), Utc::now())?;
    let job = args.command.job();

    if !args.force && !us_market::is_trading_day(market_date) {
        tracing::info!(%market_date, job = job.as_str(), "market closed; skipping run");
        return Ok(());
    }

    if args.dry_run {
        let store: Arc<dyn AdvisorStore> = Arc::new(MemoryStore::new());
        let engine = AdvisorEngine::from_settings(&settings, store).await?;
        let output = run(&engine, &args.command, market_date).await?;
        tracing::info!(%market_date, job = job.as_str(), dry_run = true, "worker run finished");
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    advisory_core::storage::migrate(&pool).await?;

    // Session lock: keep this connection checked out until release.
    let mut lock_conn = pool.acquire().await.context("acquire lock connection failed")?;
    let acquired = lock::try_acquire_job_lock(&mut lock_conn, job, market_date).await?;
    if !acquired {
        tracing::warn!(%market_date, job = job.as_str(), "job lock not acquired; another run in progress");
        return Ok(());
    }

    let result = async {
        let store: Arc<dyn AdvisorStore> = Arc::new(PgStore::new(pool.clone()));
        let engine = AdvisorEngine::from_settings(&settings, store).await?;
        run(&engine, &args.command, market_date).await
    }
    .await;

    if let Err(e) = lock::release_job_lock(&mut lock_conn, job, market_date).await {
        tracing::warn!(error = %format!("{e:#}"), "failed to release job lock");
    }

    match result {
        Ok(_) => {
            tracing::info!(%market_date, job = job.as_str(), "worker run finished");
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%market_date, job = job.as_str(), error = %format!("{err:#}"), "worker run failed");
            Err(err)
        }
    }
}

async fn run(
    engine: &AdvisorEngine,
    command: &Command,
    market_date: NaiveDate,
) -> anyhow::Result<serde_json::Value> {
    match command {
        Command::Generate { symbol, category } => {
            let symbol = match symbol {
                Some(s) => s.clone(),
                None => {
                    let category: Option<Category> = category.as_deref().map(str::parse).transpose()?;
                    let opts = watchlist::WatchlistOptions::from_env()?.with_category(category);
                    let list = watchlist::build_watchlist(&opts);
                    watchlist::select_symbol(&list, market_date)?
                }
            };

            let advice = engine.generate_advice(&symbol).await?;
            tracing::info!(
                %market_date,
                advice_id = %advice.id,
                symbol = %advice.symbol,
                action = %advice.action,
                confidence = advice.confidence,
                "persisted advice"
            );
            Ok(serde_json::to_value(&advice)?)
        }
        Command::Evaluate => {
            let report = engine.evaluate_pending(Utc::now()).await?;
            for failure in &report.failures {
                tracing::warn!(advice_id = %failure.id, symbol = %failure.symbol, error = %failure.error, "advice left pending");
            }
            if let Some(error) = &report.adaptation_error {
                sentry::capture_message(
                    &format!("strategy adaptation failed: {error}"),
                    sentry::Level::Error,
                );
            }
            Ok(serde_json::to_value(&report)?)
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
