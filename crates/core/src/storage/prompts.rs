use crate::domain::prompt::{AnalysisPrompt, PromptCategory};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, name, description, category, system_prompt, template, is_active, \
     usage_count, last_used, created_at, updated_at FROM analysis_prompts";

#[derive(Debug, sqlx::FromRow)]
struct PromptRow {
    id: Uuid,
    name: String,
    description: String,
    category: String,
    system_prompt: String,
    template: String,
    is_active: bool,
    usage_count: i64,
    last_used: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PromptRow> for AnalysisPrompt {
    type Error = anyhow::Error;

    fn try_from(row: PromptRow) -> anyhow::Result<Self> {
        let name = row.name;
        Ok(AnalysisPrompt {
            id: row.id,
            category: row
                .category
                .parse()
                .with_context(|| format!("prompt {name} has bad category"))?,
            usage_count: u64::try_from(row.usage_count)
                .with_context(|| format!("prompt {name} has bad usage_count"))?,
            name,
            description: row.description,
            system_prompt: row.system_prompt,
            template: row.template,
            is_active: row.is_active,
            last_used: row.last_used,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Returns `false` when the name is already taken.
pub async fn insert(pool: &sqlx::PgPool, prompt: &AnalysisPrompt) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "INSERT INTO analysis_prompts (id, name, description, category, system_prompt, template, \
         is_active, usage_count, last_used, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (name) DO NOTHING",
    )
    .bind(prompt.id)
    .bind(&prompt.name)
    .bind(&prompt.description)
    .bind(prompt.category.as_str())
    .bind(&prompt.system_prompt)
    .bind(&prompt.template)
    .bind(prompt.is_active)
    .bind(i64::try_from(prompt.usage_count).unwrap_or(i64::MAX))
    .bind(prompt.last_used)
    .bind(prompt.created_at)
    .bind(prompt.updated_at)
    .execute(pool)
    .await
    .with_context(|| format!("insert analysis_prompts failed (name={})", prompt.name))?;
    Ok(res.rows_affected() == 1)
}

/// Rewrites the editable columns. Usage counters are left to `record_use`.
pub async fn update(pool: &sqlx::PgPool, prompt: &AnalysisPrompt) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "UPDATE analysis_prompts SET description = $2, category = $3, system_prompt = $4, \
         template = $5, is_active = $6, updated_at = $7 WHERE id = $1",
    )
    .bind(prompt.id)
    .bind(&prompt.description)
    .bind(prompt.category.as_str())
    .bind(&prompt.system_prompt)
    .bind(&prompt.template)
    .bind(prompt.is_active)
    .bind(prompt.updated_at)
    .execute(pool)
    .await
    .with_context(|| format!("update analysis_prompts failed (id={})", prompt.id))?;
    Ok(res.rows_affected() == 1)
}

pub async fn get(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<Option<AnalysisPrompt>> {
    let row = sqlx::query_as::<_, PromptRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("select analysis_prompts failed (id={id})"))?;
    row.map(AnalysisPrompt::try_from).transpose()
}

pub async fn get_by_name(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<Option<AnalysisPrompt>> {
    let row = sqlx::query_as::<_, PromptRow>(&format!("{SELECT_COLUMNS} WHERE name = $1"))
        .bind(name)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("select analysis_prompts failed (name={name})"))?;
    row.map(AnalysisPrompt::try_from).transpose()
}

pub async fn list_active(
    pool: &sqlx::PgPool,
    category: Option<PromptCategory>,
) -> anyhow::Result<Vec<AnalysisPrompt>> {
    let rows = sqlx::query_as::<_, PromptRow>(&format!(
        "{SELECT_COLUMNS} WHERE is_active AND ($1::text IS NULL OR category = $1) \
         ORDER BY usage_count DESC, name ASC"
    ))
    .bind(category.map(PromptCategory::as_str))
    .fetch_all(pool)
    .await
    .context("select analysis_prompts failed")?;
    rows.into_iter().map(AnalysisPrompt::try_from).collect()
}

pub async fn record_use(pool: &sqlx::PgPool, name: &str, at: DateTime<Utc>) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "UPDATE analysis_prompts SET usage_count = usage_count + 1, last_used = $2 WHERE name = $1",
    )
    .bind(name)
    .bind(at)
    .execute(pool)
    .await
    .with_context(|| format!("update analysis_prompts usage failed (name={name})"))?;
    Ok(res.rows_affected() == 1)
}
