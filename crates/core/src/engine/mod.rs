pub mod adapter;
pub mod correction;
pub mod evaluator;
pub mod fallback;
pub mod scoring;

#[cfg(test)]
mod tests;

use crate::config::Settings;
use crate::domain::advice::{
    Action, Advice, AdviceFilter, AdviceOrigin, AdvicePage, Outcome, Recommendation,
};
use crate::domain::asset::{asset_meta, category_of, normalize_symbol, AssetMeta};
use crate::domain::correction::{CorrectionLog, CorrectionOutcome, MarketConditions};
use crate::domain::prompt::{AnalysisPrompt, NewPrompt, PromptCategory, PromptUpdate};
use crate::domain::snapshot::{price_change_percent, IndicatorSnapshot};
use crate::domain::strategy::{
    LearningEntry, Strategy, Thresholds, Weights, DEFAULT_STRATEGY_NAME,
};
use crate::domain::EngineError;
use crate::engine::adapter::{AdaptationReport, OutcomeStats};
use crate::engine::correction::CorrectionDecision;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::prompt::{self, AnalysisFields, CorrectionFields, CustomPrompt};
use crate::llm::{json, AdvisorClient, Provider};
use crate::market::alpha_vantage::AlphaVantageClient;
use crate::market::MarketData;
use crate::storage::AdvisorStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

const RECENT_ADVICE_COUNT: u32 = 10;
const RECENT_LEARNING_COUNT: usize = 5;
const MAX_CORRECTION_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Minimum age before a pending advice is evaluated.
    pub maturation_window: chrono::Duration,
    /// Upper bound on every advisor call.
    pub call_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            maturation_window: chrono::Duration::hours(24),
            call_timeout: Duration::from_secs(20),
        }
    }
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            maturation_window: settings.maturation_window(),
            call_timeout: settings.collaborator_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedAdvice {
    pub id: Uuid,
    pub symbol: String,
    pub action: Action,
    pub outcome: Outcome,
    pub performance_score: f64,
    pub price_change_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationFailure {
    pub id: Uuid,
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub considered: usize,
    pub evaluated: Vec<EvaluatedAdvice>,
    /// Already terminal by the time the outcome was written.
    pub skipped: Vec<Uuid>,
    pub failures: Vec<EvaluationFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptation: Option<AdaptationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptation_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptAnalysis {
    pub advice: Advice,
    pub prompt_used: String,
    pub asset: Option<AssetMeta>,
    pub analysis: Recommendation,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeAnalysis {
    pub symbol: String,
    pub asset_name: String,
    pub snapshot: IndicatorSnapshot,
    pub analysis: Recommendation,
    pub origin: AdviceOrigin,
    pub user_query: Option<String>,
    pub is_real_time: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub total_advices: u64,
    pub evaluated_advices: u64,
    pub pending_advices: u64,
    pub successful_advices: u64,
    pub partial_advices: u64,
    pub failed_advices: u64,
    pub success_rate: f64,
    pub average_score: f64,
    pub weights: Weights,
    pub thresholds: Thresholds,
    pub recent_learnings: Vec<LearningEntry>,
    pub recent_advices: Vec<Advice>,
}

/// Owns the active strategy. Every strategy mutation goes through [`AdvisorEngine::adapt`].
pub struct AdvisorEngine {
    store: Arc<dyn AdvisorStore>,
    market: MarketData,
    advisor: Option<Arc<dyn AdvisorClient>>,
    strategy: Mutex<Strategy>,
    options: EngineOptions,
}

impl AdvisorEngine {
    /// Loads the active strategy, creating and persisting the default one on first start.
    pub async fn initialize(
        store: Arc<dyn AdvisorStore>,
        market: MarketData,
        advisor: Option<Arc<dyn AdvisorClient>>,
        options: EngineOptions,
    ) -> anyhow::Result<Self> {
        let strategy = match store.load_strategy(DEFAULT_STRATEGY_NAME).await? {
            Some(mut existing) => {
                if !existing.weights.is_normalized() {
                    tracing::warn!(sum = existing.weights.sum(), "stored strategy weights drifted; renormalizing");
                    existing.weights.normalize();
                    store.save_strategy(&existing).await?;
                }
                existing
            }
            None => {
                let created = Strategy::new_default(Utc::now());
                store.save_strategy(&created).await?;
                tracing::info!(name = %created.name, "created default strategy");
                created
            }
        };

        let now = Utc::now();
        for template in prompt::list(None) {
            if store.create_prompt(&template.to_stored(now)).await? {
                tracing::info!(name = template.name, "seeded analysis prompt");
            }
        }

        Ok(Self {
            store,
            market,
            advisor,
            strategy: Mutex::new(strategy),
            options,
        })
    }

    /// Wires the live market-data provider and the configured advisor from settings.
    pub async fn from_settings(settings: &Settings, store: Arc<dyn AdvisorStore>) -> anyhow::Result<Self> {
        let live = AlphaVantageClient::from_settings(settings)?;
        let market = MarketData::new(Some(Arc::new(live)), settings.collaborator_timeout());
        let advisor = crate::llm::advisor_from_settings(settings)?;
        match &advisor {
            Some(a) => tracing::info!(provider = %a.provider(), "advisor enabled"),
            None => tracing::info!("no advisor configured; using rule-based analysis"),
        }
        Self::initialize(store, market, advisor, EngineOptions::from_settings(settings)).await
    }

    pub fn has_advisor(&self) -> bool {
        self.advisor.is_some()
    }

    /// Current strategy, refreshed from the store so runs in other processes are seen.
    pub async fn strategy(&self) -> anyhow::Result<Strategy> {
        let mut guard = self.strategy.lock().await;
        if let Some(stored) = self.store.load_strategy(&guard.name).await? {
            *guard = stored;
        }
        Ok(guard.clone())
    }

    /// Daily pipeline: fresh snapshot, adaptive scoring, persisted advice.
    pub async fn generate_advice(&self, symbol: &str) -> anyhow::Result<Advice> {
        let symbol = normalize_symbol(symbol)?;
        let snapshot = self.market.snapshot(&symbol).await;
        let strategy = self.strategy().await?;
        let recommendation = scoring::score(&snapshot, &strategy);

        let advice = Advice::new(
            category_of(&symbol),
            snapshot,
            recommendation,
            AdviceOrigin::Scoring,
            Utc::now(),
        );
        self.store.save_advice(&advice).await?;

        tracing::info!(
            %symbol,
            advice_id = %advice.id,
            action = %advice.action,
            confidence = advice.confidence,
            source = ?advice.indicators.source,
            "generated advice"
        );
        Ok(advice)
    }

    /// Classifies every matured pending advice, then adapts the strategy.
    /// A failing record is reported and does not stop the batch.
    pub async fn evaluate_pending(&self, now: DateTime<Utc>) -> anyhow::Result<EvaluationReport> {
        let cutoff = now - self.options.maturation_window;
        let pending = self.store.find_pending(cutoff).await?;

        let mut report = EvaluationReport {
            considered: pending.len(),
            evaluated: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            adaptation: None,
            adaptation_error: None,
        };

        for advice in pending {
            match self.evaluate_one(&advice, now).await {
                Ok(Some(done)) => report.evaluated.push(done),
                Ok(None) => report.skipped.push(advice.id),
                Err(err) => {
                    tracing::warn!(advice_id = %advice.id, symbol = %advice.symbol, error = %format!("{err:#}"), "advice evaluation failed");
                    report.failures.push(EvaluationFailure {
                        id: advice.id,
                        symbol: advice.symbol.clone(),
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        match self.adapt(now).await {
            Ok(adaptation) => report.adaptation = Some(adaptation),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "strategy adaptation failed");
                report.adaptation_error = Some(format!("{err:#}"));
            }
        }

        tracing::info!(
            considered = report.considered,
            evaluated = report.evaluated.len(),
            skipped = report.skipped.len(),
            failures = report.failures.len(),
            "evaluation batch finished"
        );
        Ok(report)
    }

    async fn evaluate_one(
        &self,
        advice: &Advice,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<EvaluatedAdvice>> {
        let quote = self.market.quote(&advice.symbol).await;
        let evaluation = evaluator::evaluate(advice, quote.price, now)?;
        if !self.store.record_outcome(advice.id, &evaluation).await? {
            return Ok(None);
        }
        Ok(Some(EvaluatedAdvice {
            id: advice.id,
            symbol: advice.symbol.clone(),
            action: advice.action,
            outcome: evaluation.outcome,
            performance_score: evaluation.performance_score,
            price_change_percent: evaluation.price_change_percent,
        }))
    }

    /// Recomputes cumulative performance and adapts weights/thresholds.
    /// The in-memory strategy changes only after the store accepted the new one.
    pub async fn adapt(&self, now: DateTime<Utc>) -> anyhow::Result<AdaptationReport> {
        let mut guard = self.strategy.lock().await;

        let evaluated = self.store.list_evaluated().await?;
        let stats = OutcomeStats::from_advices(&evaluated);

        let mut next = match self.store.load_strategy(&guard.name).await? {
            Some(stored) => stored,
            None => guard.clone(),
        };
        let report = adapter::adapt(&mut next, &stats, now);
        self.store.save_strategy(&next).await?;
        *guard = next;

        if let Some(entry) = &report.learning_entry {
            tracing::info!(
                success_rate = entry.new_success_rate,
                sample_size = entry.sample_size,
                reason = %entry.reason,
                "strategy adapted"
            );
        }
        Ok(report)
    }

    /// Re-checks one advice against current conditions and logs a correction when warranted.
    pub async fn self_correct(&self, advice_id: Uuid) -> anyhow::Result<CorrectionOutcome> {
        let advice = self.advice(advice_id).await?;
        let current = self.market.snapshot(&advice.symbol).await;
        let price_change = price_change_percent(advice.price_at_advice, current.price);

        let decision = self
            .advisor_correction(&advice, &current, price_change)
            .await
            .or_else(|| correction::review(&advice, &current, price_change));

        let Some(decision) = decision else {
            return Ok(CorrectionOutcome {
                should_correct: false,
                price_change_percent: price_change,
                correction: None,
                learnings: None,
                reason: Some("Original advice appears to be on track".to_string()),
            });
        };

        if !decision.should_correct {
            return Ok(CorrectionOutcome {
                should_correct: false,
                price_change_percent: price_change,
                correction: None,
                learnings: decision.learnings,
                reason: Some(format!(
                    "Re-analysis agrees with the original {} call",
                    advice.action
                )),
            });
        }

        let log = CorrectionLog {
            id: Uuid::new_v4(),
            advice_id: advice.id,
            symbol: advice.symbol.clone(),
            original_action: advice.action,
            original_confidence: advice.confidence,
            corrected_action: decision.corrected_action,
            corrected_confidence: decision.corrected_confidence,
            correction_reason: decision.reason,
            learnings: decision.learnings.clone(),
            market_conditions: MarketConditions {
                price_change_percent: price_change,
                snapshot: current,
            },
            created_at: Utc::now(),
        };
        self.store.append_correction(&log).await?;

        tracing::info!(
            advice_id = %advice.id,
            from = %log.original_action,
            to = %log.corrected_action,
            "recorded correction"
        );
        Ok(CorrectionOutcome {
            should_correct: true,
            price_change_percent: price_change,
            correction: Some(log),
            learnings: decision.learnings,
            reason: None,
        })
    }

    async fn advisor_correction(
        &self,
        advice: &Advice,
        current: &IndicatorSnapshot,
        price_change: f64,
    ) -> Option<CorrectionDecision> {
        if self.advisor.is_none() {
            return None;
        }
        let (system, template) = match self.store.get_prompt_by_name(prompt::SELF_CORRECTION_PROMPT).await {
            Ok(Some(stored)) if stored.is_active => (stored.system_prompt, stored.template),
            Ok(_) => {
                let built_in = prompt::correction_prompt();
                (built_in.system_prompt.to_string(), built_in.template.to_string())
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "correction prompt lookup failed; using built-in");
                let built_in = prompt::correction_prompt();
                (built_in.system_prompt.to_string(), built_in.template.to_string())
            }
        };
        let user = CorrectionFields::new(advice, current, price_change).render(&template);
        let (provider, text) = self.consult(&system, &user).await?;
        match json::parse_correction(provider, &text) {
            Ok(verdict) => Some(correction::from_advisor(advice, verdict)),
            Err(err) => {
                tracing::warn!(advice_id = %advice.id, "advisor correction malformed; using rule-based review");
                log_advisor_error(provider, &err);
                None
            }
        }
    }

    /// Prompt-driven analysis. Persists the result as an advice.
    pub async fn analyze_with_prompt(
        &self,
        symbol: &str,
        prompt_name: Option<&str>,
        custom: Option<&CustomPrompt>,
    ) -> anyhow::Result<PromptAnalysis> {
        let symbol = normalize_symbol(symbol)?;
        if let Some(custom) = custom {
            custom.validate()?;
        }

        let snapshot = self.market.snapshot(&symbol).await;
        let asset = asset_meta(&symbol).copied();
        let fields = AnalysisFields::from_snapshot(&snapshot, asset.map(|a| a.name));

        let (prompt_used, system, user) = match custom {
            Some(custom) => (
                "custom".to_string(),
                custom.system_prompt().to_string(),
                fields.render(&custom.template),
            ),
            None => {
                let p = self.resolve_analysis_prompt(prompt_name).await?;
                let user = fields.render(&p.template);
                (p.name, p.system_prompt, user)
            }
        };

        let (analysis, origin) = self.advise_or_fallback(&system, &user, &snapshot).await;
        let now = Utc::now();
        if custom.is_none() {
            self.store.record_prompt_use(&prompt_used, now).await?;
        }
        let advice = Advice::new(
            category_of(&symbol),
            snapshot,
            analysis.clone(),
            origin,
            now,
        );
        self.store.save_advice(&advice).await?;

        tracing::info!(%symbol, advice_id = %advice.id, prompt = %prompt_used, origin = origin.as_str(), "prompt analysis stored");
        Ok(PromptAnalysis {
            advice,
            prompt_used,
            asset,
            analysis,
        })
    }

    /// Active stored prompt by name, else the stored default, else the built-in default.
    /// The correction prompt is never used for analysis.
    async fn resolve_analysis_prompt(&self, name: Option<&str>) -> anyhow::Result<AnalysisPrompt> {
        let requested = name
            .map(str::trim)
            .filter(|n| !n.is_empty() && *n != prompt::SELF_CORRECTION_PROMPT);
        for candidate in requested.into_iter().chain([prompt::DEFAULT_ANALYSIS_PROMPT]) {
            if let Some(found) = self.store.get_prompt_by_name(candidate).await? {
                if found.is_active {
                    return Ok(found);
                }
            }
        }
        Ok(prompt::analysis_prompt(None).to_stored(Utc::now()))
    }

    pub async fn list_prompts(&self, category: Option<PromptCategory>) -> anyhow::Result<Vec<AnalysisPrompt>> {
        self.store.list_prompts(category).await
    }

    pub async fn create_prompt(&self, request: NewPrompt) -> anyhow::Result<AnalysisPrompt> {
        let created = request.into_prompt(prompt::DEFAULT_CUSTOM_SYSTEM_PROMPT, Utc::now())?;
        if !self.store.create_prompt(&created).await? {
            return Err(EngineError::InvalidInput(format!("prompt {} already exists", created.name)).into());
        }
        tracing::info!(name = %created.name, category = %created.category, "created analysis prompt");
        Ok(created)
    }

    pub async fn update_prompt(&self, id: Uuid, update: PromptUpdate) -> anyhow::Result<AnalysisPrompt> {
        let not_found = || EngineError::NotFound(format!("prompt {id}"));
        let mut stored = self.store.get_prompt(id).await?.ok_or_else(not_found)?;
        update.apply(&mut stored, Utc::now())?;
        if !self.store.update_prompt(&stored).await? {
            return Err(not_found().into());
        }
        tracing::info!(name = %stored.name, active = stored.is_active, "updated analysis prompt");
        Ok(stored)
    }

    /// Ad hoc analysis; never persisted. The advisor is consulted only for a user question.
    pub async fn analyze_realtime(
        &self,
        symbol: &str,
        query: Option<&str>,
    ) -> anyhow::Result<RealtimeAnalysis> {
        let symbol = normalize_symbol(symbol)?;
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let snapshot = self.market.snapshot(&symbol).await;

        let (analysis, origin) = match query {
            Some(q) => {
                let (system, user) = prompt::realtime_prompts(&snapshot, q);
                self.advise_or_fallback(&system, &user, &snapshot).await
            }
            None => (fallback::respond(&snapshot), AdviceOrigin::Fallback),
        };

        Ok(RealtimeAnalysis {
            asset_name: asset_meta(&symbol)
                .map(|a| a.name.to_string())
                .unwrap_or_else(|| symbol.clone()),
            symbol,
            snapshot,
            analysis,
            origin,
            user_query: query.map(str::to_string),
            is_real_time: true,
            generated_at: Utc::now(),
        })
    }

    async fn advise_or_fallback(
        &self,
        system: &str,
        user: &str,
        snapshot: &IndicatorSnapshot,
    ) -> (Recommendation, AdviceOrigin) {
        if let Some((provider, text)) = self.consult(system, user).await {
            match json::parse_analysis(provider, &text) {
                Ok(rec) => return (rec, AdviceOrigin::Advisor),
                Err(err) => {
                    tracing::warn!(symbol = %snapshot.symbol, "advisor analysis malformed; using fallback responder");
                    log_advisor_error(provider, &err);
                }
            }
        }
        (fallback::respond(snapshot), AdviceOrigin::Fallback)
    }

    /// Calls the advisor under the engine timeout. Failure and absence look the same.
    async fn consult(&self, system: &str, user: &str) -> Option<(Provider, String)> {
        let advisor = self.advisor.as_ref()?;
        match tokio::time::timeout(self.options.call_timeout, advisor.complete(system, user)).await {
            Ok(Ok(text)) => Some((advisor.provider(), text)),
            Ok(Err(err)) => {
                log_advisor_error(advisor.provider(), &err);
                None
            }
            Err(_) => {
                tracing::warn!(provider = %advisor.provider(), timeout = ?self.options.call_timeout, "advisor call timed out");
                None
            }
        }
    }

    pub async fn performance_stats(&self) -> anyhow::Result<PerformanceStats> {
        let total = self.store.count_advice().await?;
        let evaluated = self.store.list_evaluated().await?;
        let stats = OutcomeStats::from_advices(&evaluated);
        let strategy = self.strategy().await?;
        let recent = self
            .store
            .list_advice(&AdviceFilter {
                page: 1,
                limit: RECENT_ADVICE_COUNT,
                ..AdviceFilter::default()
            })
            .await?;

        Ok(PerformanceStats {
            total_advices: total,
            evaluated_advices: stats.evaluated,
            pending_advices: total.saturating_sub(stats.evaluated),
            successful_advices: stats.successful,
            partial_advices: stats.partial,
            failed_advices: stats.failed,
            success_rate: stats.success_rate(),
            average_score: stats.average_score,
            weights: strategy.weights,
            thresholds: strategy.thresholds,
            recent_learnings: strategy.learning_history.recent(RECENT_LEARNING_COUNT),
            recent_advices: recent.items,
        })
    }

    pub async fn advice(&self, id: Uuid) -> anyhow::Result<Advice> {
        self.store
            .get_advice(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("advice {id}")).into())
    }

    pub async fn latest_advice(&self) -> anyhow::Result<Option<Advice>> {
        self.store.latest_advice().await
    }

    pub async fn advice_history(&self, mut filter: AdviceFilter) -> anyhow::Result<AdvicePage> {
        if let Some(symbol) = filter.symbol.take() {
            filter.symbol = Some(normalize_symbol(&symbol)?);
        }
        self.store.list_advice(&filter).await
    }

    pub async fn correction_history(&self, limit: u32) -> anyhow::Result<Vec<CorrectionLog>> {
        self.store
            .list_corrections(limit.clamp(1, MAX_CORRECTION_PAGE))
            .await
    }
}

/// Stage and detail at warn; raw advisor output at debug only.
fn log_advisor_error(provider: Provider, err: &anyhow::Error) {
    match err.downcast_ref::<LlmDiagnosticsError>() {
        Some(diag) => {
            tracing::warn!(
                provider = %diag.provider,
                stage = diag.stage,
                detail = %diag.detail,
                "advisor call failed"
            );
            if diag.raw_output.is_some() || diag.raw_response_json.is_some() {
                tracing::debug!(
                    provider = %diag.provider,
                    stage = diag.stage,
                    raw_output = ?diag.raw_output,
                    raw_response = ?diag.raw_response_json,
                    "advisor raw output"
                );
            }
        }
        None => tracing::warn!(%provider, error = %format!("{err:#}"), "advisor call failed"),
    }
}
