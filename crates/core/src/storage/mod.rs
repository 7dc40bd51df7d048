pub mod advice;
pub mod corrections;
pub mod lock;
pub mod memory;
pub mod prompts;
pub mod strategy;

use crate::domain::advice::{Advice, AdviceFilter, AdvicePage, Evaluation};
use crate::domain::correction::CorrectionLog;
use crate::domain::prompt::{AnalysisPrompt, PromptCategory};
use crate::domain::strategy::Strategy;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryStore;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Read/write contract the engine needs from durable storage.
#[async_trait::async_trait]
pub trait AdvisorStore: Send + Sync {
    async fn save_advice(&self, advice: &Advice) -> anyhow::Result<()>;

    async fn get_advice(&self, id: Uuid) -> anyhow::Result<Option<Advice>>;

    async fn latest_advice(&self) -> anyhow::Result<Option<Advice>>;

    /// Newest first.
    async fn list_advice(&self, filter: &AdviceFilter) -> anyhow::Result<AdvicePage>;

    async fn count_advice(&self) -> anyhow::Result<u64>;

    /// Pending advices created strictly before `older_than`, oldest first.
    async fn find_pending(&self, older_than: DateTime<Utc>) -> anyhow::Result<Vec<Advice>>;

    /// Every advice with a terminal outcome.
    async fn list_evaluated(&self) -> anyhow::Result<Vec<Advice>>;

    /// Applies `evaluation` only while the advice is still pending.
    /// Returns `false` when the record was already terminal (or is missing).
    async fn record_outcome(&self, id: Uuid, evaluation: &Evaluation) -> anyhow::Result<bool>;

    async fn load_strategy(&self, name: &str) -> anyhow::Result<Option<Strategy>>;

    async fn save_strategy(&self, strategy: &Strategy) -> anyhow::Result<()>;

    async fn append_correction(&self, log: &CorrectionLog) -> anyhow::Result<()>;

    /// Newest first.
    async fn list_corrections(&self, limit: u32) -> anyhow::Result<Vec<CorrectionLog>>;

    /// Returns `false` and stores nothing when the name is already taken.
    async fn create_prompt(&self, prompt: &AnalysisPrompt) -> anyhow::Result<bool>;

    /// Replaces the editable fields of the prompt with the same id.
    /// Returns `false` when no such prompt exists.
    async fn update_prompt(&self, prompt: &AnalysisPrompt) -> anyhow::Result<bool>;

    async fn get_prompt(&self, id: Uuid) -> anyhow::Result<Option<AnalysisPrompt>>;

    async fn get_prompt_by_name(&self, name: &str) -> anyhow::Result<Option<AnalysisPrompt>>;

    /// Active prompts, most used first.
    async fn list_prompts(&self, category: Option<PromptCategory>) -> anyhow::Result<Vec<AnalysisPrompt>>;

    /// Bumps the usage counter. Returns `false` for an unknown name.
    async fn record_prompt_use(&self, name: &str, at: DateTime<Utc>) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl AdvisorStore for PgStore {
    async fn save_advice(&self, advice: &Advice) -> anyhow::Result<()> {
        advice::insert(&self.pool, advice).await
    }

    async fn get_advice(&self, id: Uuid) -> anyhow::Result<Option<Advice>> {
        advice::get(&self.pool, id).await
    }

    async fn latest_advice(&self) -> anyhow::Result<Option<Advice>> {
        advice::latest(&self.pool).await
    }

    async fn list_advice(&self, filter: &AdviceFilter) -> anyhow::Result<AdvicePage> {
        advice::list(&self.pool, filter).await
    }

    async fn count_advice(&self) -> anyhow::Result<u64> {
        advice::count(&self.pool).await
    }

    async fn find_pending(&self, older_than: DateTime<Utc>) -> anyhow::Result<Vec<Advice>> {
        advice::find_pending(&self.pool, older_than).await
    }

    async fn list_evaluated(&self) -> anyhow::Result<Vec<Advice>> {
        advice::list_evaluated(&self.pool).await
    }

    async fn record_outcome(&self, id: Uuid, evaluation: &Evaluation) -> anyhow::Result<bool> {
        advice::record_outcome(&self.pool, id, evaluation).await
    }

    async fn load_strategy(&self, name: &str) -> anyhow::Result<Option<Strategy>> {
        strategy::load(&self.pool, name).await
    }

    async fn save_strategy(&self, s: &Strategy) -> anyhow::Result<()> {
        strategy::upsert(&self.pool, s).await
    }

    async fn append_correction(&self, log: &CorrectionLog) -> anyhow::Result<()> {
        corrections::insert(&self.pool, log).await
    }

    async fn list_corrections(&self, limit: u32) -> anyhow::Result<Vec<CorrectionLog>> {
        corrections::list(&self.pool, limit).await
    }

    async fn create_prompt(&self, prompt: &AnalysisPrompt) -> anyhow::Result<bool> {
        prompts::insert(&self.pool, prompt).await
    }

    async fn update_prompt(&self, prompt: &AnalysisPrompt) -> anyhow::Result<bool> {
        prompts::update(&self.pool, prompt).await
    }

    async fn get_prompt(&self, id: Uuid) -> anyhow::Result<Option<AnalysisPrompt>> {
        prompts::get(&self.pool, id).await
    }

    async fn get_prompt_by_name(&self, name: &str) -> anyhow::Result<Option<AnalysisPrompt>> {
        prompts::get_by_name(&self.pool, name).await
    }

    async fn list_prompts(&self, category: Option<PromptCategory>) -> anyhow::Result<Vec<AnalysisPrompt>> {
        prompts::list_active(&self.pool, category).await
    }

    async fn record_prompt_use(&self, name: &str, at: DateTime<Utc>) -> anyhow::Result<bool> {
        prompts::record_use(&self.pool, name, at).await
    }
}
