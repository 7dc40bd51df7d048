use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisory_core::config::Settings;
use advisory_core::engine::AdvisorEngine;
use advisory_core::storage::PgStore;

mod handlers;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the database was unreachable at startup.
    pub engine: Option<Arc<AdvisorEngine>>,
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

    let engine = match connect_engine(&settings).await {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %format!("{e:#}"), "engine unavailable; starting API in degraded mode");
            None
        }
    };

    let app = router(AppState { engine });

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

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/categories", get(handlers::list_categories))
        .route("/advice/generate", post(handlers::generate_advice))
        .route("/advice/history", get(handlers::advice_history))
        .route("/advice/latest", get(handlers::latest_advice))
        .route("/advice/evaluate", post(handlers::evaluate_advice))
        .route("/advice/performance", get(handlers::performance))
        .route("/advice/:id", get(handlers::get_advice))
        .route("/strategy", get(handlers::get_strategy))
        .route(
            "/analysis/prompts",
            get(handlers::list_prompts).post(handlers::create_prompt),
        )
        .route("/analysis/prompts/:id", put(handlers::update_prompt))
        .route("/analysis/analyze", post(handlers::analyze))
        .route("/analysis/realtime", post(handlers::analyze_realtime))
        .route("/analysis/correct/:advice_id", post(handlers::self_correct))
        .route("/analysis/corrections", get(handlers::correction_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn connect_engine(settings: &Settings) -> anyhow::Result<AdvisorEngine> {
    use anyhow::Context;

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    advisory_core::storage::migrate(&pool).await?;

    AdvisorEngine::from_settings(settings, Arc::new(PgStore::new(pool))).await
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
