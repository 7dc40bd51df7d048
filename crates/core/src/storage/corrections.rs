use crate::domain::correction::{CorrectionLog, MarketConditions};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct CorrectionRow {
    id: Uuid,
    advice_id: Uuid,
    symbol: String,
    original_action: String,
    original_confidence: i16,
    corrected_action: String,
    corrected_confidence: i16,
    correction_reason: String,
    learnings: Option<String>,
    market_conditions: Json<MarketConditions>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CorrectionRow> for CorrectionLog {
    type Error = anyhow::Error;

    fn try_from(row: CorrectionRow) -> anyhow::Result<Self> {
        let id = row.id;
        Ok(CorrectionLog {
            id,
            advice_id: row.advice_id,
            symbol: row.symbol,
            original_action: row
                .original_action
                .parse()
                .with_context(|| format!("correction {id} has bad original_action"))?,
            original_confidence: u8::try_from(row.original_confidence)
                .with_context(|| format!("correction {id} has bad original_confidence"))?,
            corrected_action: row
                .corrected_action
                .parse()
                .with_context(|| format!("correction {id} has bad corrected_action"))?,
            corrected_confidence: u8::try_from(row.corrected_confidence)
                .with_context(|| format!("correction {id} has bad corrected_confidence"))?,
            correction_reason: row.correction_reason,
            learnings: row.learnings,
            market_conditions: row.market_conditions.0,
            created_at: row.created_at,
        })
    }
}

pub async fn insert(pool: &sqlx::PgPool, log: &CorrectionLog) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO correction_logs (id, advice_id, symbol, original_action, original_confidence, \
         corrected_action, corrected_confidence, correction_reason, learnings, market_conditions, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(log.id)
    .bind(log.advice_id)
    .bind(&log.symbol)
    .bind(log.original_action.as_str())
    .bind(i16::from(log.original_confidence))
    .bind(log.corrected_action.as_str())
    .bind(i16::from(log.corrected_confidence))
    .bind(&log.correction_reason)
    .bind(&log.learnings)
    .bind(Json(&log.market_conditions))
    .bind(log.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("insert correction_logs failed (advice_id={})", log.advice_id))?;
    Ok(())
}

pub async fn list(pool: &sqlx::PgPool, limit: u32) -> anyhow::Result<Vec<CorrectionLog>> {
    let rows = sqlx::query_as::<_, CorrectionRow>(
        "SELECT id, advice_id, symbol, original_action, original_confidence, corrected_action, \
         corrected_confidence, correction_reason, learnings, market_conditions, created_at \
         FROM correction_logs ORDER BY created_at DESC LIMIT $1",
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await
    .context("select correction_logs failed")?;
    rows.into_iter().map(CorrectionLog::try_from).collect()
}
