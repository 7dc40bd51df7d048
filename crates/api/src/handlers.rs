//! Route handlers. Each one resolves the engine, calls a single engine operation and maps
//! its error to a status code.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use advisory_core::domain::advice::{Advice, AdviceFilter, AdvicePage, Outcome};
use advisory_core::domain::asset::{self, CategoryListing};
use advisory_core::domain::correction::{CorrectionLog, CorrectionOutcome};
use advisory_core::domain::prompt::{AnalysisPrompt, NewPrompt, PromptCategory, PromptUpdate};
use advisory_core::domain::strategy::Strategy;
use advisory_core::domain::EngineError;
use advisory_core::engine::{
    AdvisorEngine, EvaluationReport, PerformanceStats, PromptAnalysis, RealtimeAnalysis,
};
use advisory_core::llm::prompt::CustomPrompt;

use crate::AppState;

type ApiResult<T> = Result<T, (StatusCode, String)>;

const DEFAULT_HISTORY_LIMIT: u32 = 20;
const DEFAULT_CORRECTION_LIMIT: u32 = 20;

fn engine(state: &AppState) -> ApiResult<&Arc<AdvisorEngine>> {
    state.engine.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "advisory engine unavailable".to_string(),
    ))
}

fn engine_error(err: anyhow::Error) -> (StatusCode, String) {
    match err.downcast_ref::<EngineError>() {
        Some(e @ EngineError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
        Some(e @ EngineError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()),
        None => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}

fn bad_request(err: EngineError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn list_categories() -> Json<Vec<CategoryListing>> {
    Json(asset::categories())
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub symbol: Option<String>,
}

pub async fn generate_advice(
    State(state): State<AppState>,
    body: Option<Json<GenerateRequest>>,
) -> ApiResult<(StatusCode, Json<Advice>)> {
    let engine = engine(&state)?;
    let requested = body
        .and_then(|Json(b)| b.symbol)
        .filter(|s| !s.trim().is_empty());

    let symbol = match requested {
        Some(s) => s,
        None => {
            let today = advisory_core::time::us_market::resolve_market_date(None, Utc::now())
                .map_err(engine_error)?;
            asset::pick_for_date(&asset::watchlist(None), today)
                .map(str::to_string)
                .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "empty watchlist".to_string()))?
        }
    };

    let advice = engine.generate_advice(&symbol).await.map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(advice)))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub symbol: Option<String>,
    pub outcome: Option<String>,
}

impl HistoryQuery {
    fn into_filter(self) -> Result<AdviceFilter, EngineError> {
        let outcome = self
            .outcome
            .as_deref()
            .filter(|o| !o.trim().is_empty())
            .map(str::parse::<Outcome>)
            .transpose()?;
        Ok(AdviceFilter {
            symbol: self.symbol.filter(|s| !s.trim().is_empty()),
            outcome,
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        })
    }
}

pub async fn advice_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<AdvicePage>> {
    let engine = engine(&state)?;
    let filter = query.into_filter().map_err(bad_request)?;
    let page = engine.advice_history(filter).await.map_err(engine_error)?;
    Ok(Json(page))
}

pub async fn latest_advice(State(state): State<AppState>) -> ApiResult<Json<Advice>> {
    let engine = engine(&state)?;
    let advice = engine
        .latest_advice()
        .await
        .map_err(engine_error)?
        .ok_or((StatusCode::NOT_FOUND, "no advice yet".to_string()))?;
    Ok(Json(advice))
}

pub async fn evaluate_advice(State(state): State<AppState>) -> ApiResult<Json<EvaluationReport>> {
    let engine = engine(&state)?;
    let report = engine
        .evaluate_pending(Utc::now())
        .await
        .map_err(engine_error)?;
    Ok(Json(report))
}

pub async fn performance(State(state): State<AppState>) -> ApiResult<Json<PerformanceStats>> {
    let engine = engine(&state)?;
    let stats = engine.performance_stats().await.map_err(engine_error)?;
    Ok(Json(stats))
}

pub async fn get_advice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Advice>> {
    let engine = engine(&state)?;
    let advice = engine.advice(id).await.map_err(engine_error)?;
    Ok(Json(advice))
}

pub async fn get_strategy(State(state): State<AppState>) -> ApiResult<Json<Strategy>> {
    let engine = engine(&state)?;
    let strategy = engine.strategy().await.map_err(engine_error)?;
    Ok(Json(strategy))
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptsQuery {
    pub category: Option<String>,
}

pub async fn list_prompts(
    State(state): State<AppState>,
    Query(query): Query<PromptsQuery>,
) -> ApiResult<Json<Vec<AnalysisPrompt>>> {
    let engine = engine(&state)?;
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(str::parse::<PromptCategory>)
        .transpose()
        .map_err(bad_request)?;
    let prompts = engine.list_prompts(category).await.map_err(engine_error)?;
    Ok(Json(prompts))
}

pub async fn create_prompt(
    State(state): State<AppState>,
    Json(req): Json<NewPrompt>,
) -> ApiResult<(StatusCode, Json<AnalysisPrompt>)> {
    let engine = engine(&state)?;
    let created = engine.create_prompt(req).await.map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PromptUpdate>,
) -> ApiResult<Json<AnalysisPrompt>> {
    let engine = engine(&state)?;
    let updated = engine.update_prompt(id, req).await.map_err(engine_error)?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub symbol: String,
    #[serde(default, alias = "promptName")]
    pub prompt_name: Option<String>,
    #[serde(default, alias = "customPrompt")]
    pub custom_prompt: Option<CustomPrompt>,
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult<(StatusCode, Json<PromptAnalysis>)> {
    let engine = engine(&state)?;
    let result = engine
        .analyze_with_prompt(
            &req.symbol,
            req.prompt_name.as_deref(),
            req.custom_prompt.as_ref(),
        )
        .await
        .map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct RealtimeRequest {
    pub symbol: String,
    #[serde(default)]
    pub query: Option<String>,
}

pub async fn analyze_realtime(
    State(state): State<AppState>,
    Json(req): Json<RealtimeRequest>,
) -> ApiResult<Json<RealtimeAnalysis>> {
    let engine = engine(&state)?;
    let result = engine
        .analyze_realtime(&req.symbol, req.query.as_deref())
        .await
        .map_err(engine_error)?;
    Ok(Json(result))
}

pub async fn self_correct(
    State(state): State<AppState>,
    Path(advice_id): Path<Uuid>,
) -> ApiResult<Json<CorrectionOutcome>> {
    let engine = engine(&state)?;
    let outcome = engine.self_correct(advice_id).await.map_err(engine_error)?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct CorrectionsQuery {
    pub limit: Option<u32>,
}

pub async fn correction_history(
    State(state): State<AppState>,
    Query(query): Query<CorrectionsQuery>,
) -> ApiResult<Json<Vec<CorrectionLog>>> {
    let engine = engine(&state)?;
    let logs = engine
        .correction_history(query.limit.unwrap_or(DEFAULT_CORRECTION_LIMIT))
        .await
        .map_err(engine_error)?;
    Ok(Json(logs))
}
