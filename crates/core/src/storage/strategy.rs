use crate::domain::strategy::{LearningHistory, Performance, Strategy, Thresholds, Weights};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

#[derive(Debug, sqlx::FromRow)]
struct StrategyRow {
    name: String,
    weights: Json<Weights>,
    thresholds: Json<Thresholds>,
    performance: Json<Performance>,
    learning_history: Json<LearningHistory>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StrategyRow> for Strategy {
    fn from(row: StrategyRow) -> Self {
        Strategy {
            name: row.name,
            weights: row.weights.0,
            thresholds: row.thresholds.0,
            performance: row.performance.0,
            learning_history: row.learning_history.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn load(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<Option<Strategy>> {
    let row = sqlx::query_as::<_, StrategyRow>(
        "SELECT name, weights, thresholds, performance, learning_history, created_at, updated_at \
         FROM strategies WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select strategy failed (name={name})"))?;
    Ok(row.map(Strategy::from))
}

pub async fn upsert(pool: &sqlx::PgPool, strategy: &Strategy) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO strategies (name, weights, thresholds, performance, learning_history, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (name) DO UPDATE SET \
           weights = EXCLUDED.weights, \
           thresholds = EXCLUDED.thresholds, \
           performance = EXCLUDED.performance, \
           learning_history = EXCLUDED.learning_history, \
           updated_at = EXCLUDED.updated_at",
    )
    .bind(&strategy.name)
    .bind(Json(&strategy.weights))
    .bind(Json(&strategy.thresholds))
    .bind(Json(&strategy.performance))
    .bind(Json(&strategy.learning_history))
    .bind(strategy.created_at)
    .bind(strategy.updated_at)
    .execute(pool)
    .await
    .with_context(|| format!("upsert strategy failed (name={})", strategy.name))?;
    Ok(())
}
