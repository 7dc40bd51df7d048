use crate::domain::advice::{Advice, AdviceFilter, AdvicePage, Evaluation};
use crate::domain::correction::CorrectionLog;
use crate::domain::prompt::{AnalysisPrompt, PromptCategory};
use crate::domain::strategy::Strategy;
use crate::storage::AdvisorStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Process-local store for tests and worker dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    // insertion order
    advices: Vec<Advice>,
    strategies: HashMap<String, Strategy>,
    corrections: Vec<CorrectionLog>,
    prompts: Vec<AnalysisPrompt>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store mutex poisoned"))
    }
}

fn newest_first(advices: &[Advice]) -> Vec<&Advice> {
    let mut out: Vec<&Advice> = advices.iter().rev().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}

#[async_trait::async_trait]
impl AdvisorStore for MemoryStore {
    async fn save_advice(&self, advice: &Advice) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        anyhow::ensure!(
            inner.advices.iter().all(|a| a.id != advice.id),
            "advice {} already exists",
            advice.id
        );
        inner.advices.push(advice.clone());
        Ok(())
    }

    async fn get_advice(&self, id: Uuid) -> anyhow::Result<Option<Advice>> {
        Ok(self.lock()?.advices.iter().find(|a| a.id == id).cloned())
    }

    async fn latest_advice(&self) -> anyhow::Result<Option<Advice>> {
        let inner = self.lock()?;
        Ok(newest_first(&inner.advices).first().map(|a| (*a).clone()))
    }

    async fn list_advice(&self, filter: &AdviceFilter) -> anyhow::Result<AdvicePage> {
        let inner = self.lock()?;
        let matching: Vec<&Advice> = newest_first(&inner.advices)
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect();
        let total = matching.len() as u64;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(filter.limit() as usize)
            .cloned()
            .collect();
        Ok(AdvicePage::new(items, total, filter))
    }

    async fn count_advice(&self) -> anyhow::Result<u64> {
        Ok(self.lock()?.advices.len() as u64)
    }

    async fn find_pending(&self, older_than: DateTime<Utc>) -> anyhow::Result<Vec<Advice>> {
        let inner = self.lock()?;
        let mut out: Vec<Advice> = inner
            .advices
            .iter()
            .filter(|a| !a.outcome.is_terminal() && a.created_at < older_than)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn list_evaluated(&self) -> anyhow::Result<Vec<Advice>> {
        let inner = self.lock()?;
        Ok(inner
            .advices
            .iter()
            .filter(|a| a.outcome.is_terminal())
            .cloned()
            .collect())
    }

    async fn record_outcome(&self, id: Uuid, evaluation: &Evaluation) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        let Some(advice) = inner
            .advices
            .iter_mut()
            .find(|a| a.id == id && !a.outcome.is_terminal())
        else {
            return Ok(false);
        };
        advice.outcome = evaluation.outcome;
        advice.performance_score = Some(evaluation.performance_score);
        advice.current_price = Some(evaluation.current_price);
        advice.evaluated_at = Some(evaluation.evaluated_at);
        Ok(true)
    }

    async fn load_strategy(&self, name: &str) -> anyhow::Result<Option<Strategy>> {
        Ok(self.lock()?.strategies.get(name).cloned())
    }

    async fn save_strategy(&self, strategy: &Strategy) -> anyhow::Result<()> {
        self.lock()?
            .strategies
            .insert(strategy.name.clone(), strategy.clone());
        Ok(())
    }

    async fn append_correction(&self, log: &CorrectionLog) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        anyhow::ensure!(
            inner.advices.iter().any(|a| a.id == log.advice_id),
            "correction references unknown advice {}",
            log.advice_id
        );
        inner.corrections.push(log.clone());
        Ok(())
    }

    async fn list_corrections(&self, limit: u32) -> anyhow::Result<Vec<CorrectionLog>> {
        let inner = self.lock()?;
        let mut out: Vec<CorrectionLog> = inner.corrections.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn create_prompt(&self, prompt: &AnalysisPrompt) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        if inner.prompts.iter().any(|p| p.name == prompt.name) {
            return Ok(false);
        }
        inner.prompts.push(prompt.clone());
        Ok(true)
    }

    async fn update_prompt(&self, prompt: &AnalysisPrompt) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        let Some(stored) = inner.prompts.iter_mut().find(|p| p.id == prompt.id) else {
            return Ok(false);
        };
        stored.description = prompt.description.clone();
        stored.category = prompt.category;
        stored.system_prompt = prompt.system_prompt.clone();
        stored.template = prompt.template.clone();
        stored.is_active = prompt.is_active;
        stored.updated_at = prompt.updated_at;
        Ok(true)
    }

    async fn get_prompt(&self, id: Uuid) -> anyhow::Result<Option<AnalysisPrompt>> {
        Ok(self.lock()?.prompts.iter().find(|p| p.id == id).cloned())
    }

    async fn get_prompt_by_name(&self, name: &str) -> anyhow::Result<Option<AnalysisPrompt>> {
        Ok(self.lock()?.prompts.iter().find(|p| p.name == name).cloned())
    }

    async fn list_prompts(&self, category: Option<PromptCategory>) -> anyhow::Result<Vec<AnalysisPrompt>> {
        let inner = self.lock()?;
        let mut out: Vec<AnalysisPrompt> = inner
            .prompts
            .iter()
            .filter(|p| p.is_active && category.map_or(true, |c| p.category == c))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.name.cmp(&b.name)));
        Ok(out)
    }

    async fn record_prompt_use(&self, name: &str, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        let Some(prompt) = inner.prompts.iter_mut().find(|p| p.name == name) else {
            return Ok(false);
        };
        prompt.usage_count += 1;
        prompt.last_used = Some(at);
        Ok(true)
    }
}
