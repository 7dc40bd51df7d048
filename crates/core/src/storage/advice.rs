use crate::domain::advice::{Advice, AdviceFilter, AdvicePage, Evaluation, Outcome};
use crate::domain::snapshot::IndicatorSnapshot;
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, symbol, category, action, confidence, price_at_advice, target_price, \
     reasoning, indicators, origin, outcome, performance_score, current_price, evaluated_at, created_at \
     FROM advices";

#[derive(Debug, sqlx::FromRow)]
struct AdviceRow {
    id: Uuid,
    symbol: String,
    category: String,
    action: String,
    confidence: i16,
    price_at_advice: f64,
    target_price: f64,
    reasoning: String,
    indicators: Json<IndicatorSnapshot>,
    origin: String,
    outcome: String,
    performance_score: Option<f64>,
    current_price: Option<f64>,
    evaluated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AdviceRow> for Advice {
    type Error = anyhow::Error;

    fn try_from(row: AdviceRow) -> anyhow::Result<Self> {
        let id = row.id;
        Ok(Advice {
            id,
            symbol: row.symbol,
            category: row
                .category
                .parse()
                .with_context(|| format!("advice {id} has bad category"))?,
            action: row
                .action
                .parse()
                .with_context(|| format!("advice {id} has bad action"))?,
            confidence: u8::try_from(row.confidence)
                .with_context(|| format!("advice {id} has bad confidence"))?,
            price_at_advice: row.price_at_advice,
            target_price: row.target_price,
            reasoning: row.reasoning,
            indicators: row.indicators.0,
            origin: row
                .origin
                .parse()
                .with_context(|| format!("advice {id} has bad origin"))?,
            outcome: row
                .outcome
                .parse()
                .with_context(|| format!("advice {id} has bad outcome"))?,
            performance_score: row.performance_score,
            current_price: row.current_price,
            evaluated_at: row.evaluated_at,
            created_at: row.created_at,
        })
    }
}

fn into_advices(rows: Vec<AdviceRow>) -> anyhow::Result<Vec<Advice>> {
    rows.into_iter().map(Advice::try_from).collect()
}

pub async fn insert(pool: &sqlx::PgPool, advice: &Advice) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO advices (id, symbol, category, action, confidence, price_at_advice, target_price, \
         reasoning, indicators, origin, outcome, performance_score, current_price, evaluated_at, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(advice.id)
    .bind(&advice.symbol)
    .bind(advice.category.id())
    .bind(advice.action.as_str())
    .bind(i16::from(advice.confidence))
    .bind(advice.price_at_advice)
    .bind(advice.target_price)
    .bind(&advice.reasoning)
    .bind(Json(&advice.indicators))
    .bind(advice.origin.as_str())
    .bind(advice.outcome.as_str())
    .bind(advice.performance_score)
    .bind(advice.current_price)
    .bind(advice.evaluated_at)
    .bind(advice.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("insert advices failed (symbol={})", advice.symbol))?;
    Ok(())
}

pub async fn get(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<Option<Advice>> {
    let row = sqlx::query_as::<_, AdviceRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("select advice failed (id={id})"))?;
    row.map(Advice::try_from).transpose()
}

pub async fn latest(pool: &sqlx::PgPool) -> anyhow::Result<Option<Advice>> {
    let row = sqlx::query_as::<_, AdviceRow>(&format!(
        "{SELECT_COLUMNS} ORDER BY created_at DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await
    .context("select latest advice failed")?;
    row.map(Advice::try_from).transpose()
}

pub async fn list(pool: &sqlx::PgPool, filter: &AdviceFilter) -> anyhow::Result<AdvicePage> {
    let symbol = filter.symbol.as_deref();
    let outcome = filter.outcome.map(Outcome::as_str);

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM advices \
         WHERE ($1::text IS NULL OR symbol = $1) AND ($2::text IS NULL OR outcome = $2)",
    )
    .bind(symbol)
    .bind(outcome)
    .fetch_one(pool)
    .await
    .context("count advice history failed")?;

    let rows = sqlx::query_as::<_, AdviceRow>(&format!(
        "{SELECT_COLUMNS} \
         WHERE ($1::text IS NULL OR symbol = $1) AND ($2::text IS NULL OR outcome = $2) \
         ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(symbol)
    .bind(outcome)
    .bind(i64::from(filter.limit()))
    .bind(i64::try_from(filter.offset()).context("page offset out of range")?)
    .fetch_all(pool)
    .await
    .context("select advice history failed")?;

    Ok(AdvicePage::new(
        into_advices(rows)?,
        u64::try_from(total).unwrap_or(0),
        filter,
    ))
}

pub async fn count(pool: &sqlx::PgPool) -> anyhow::Result<u64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM advices")
        .fetch_one(pool)
        .await
        .context("count advices failed")?;
    Ok(u64::try_from(total).unwrap_or(0))
}

pub async fn find_pending(
    pool: &sqlx::PgPool,
    older_than: DateTime<Utc>,
) -> anyhow::Result<Vec<Advice>> {
    let rows = sqlx::query_as::<_, AdviceRow>(&format!(
        "{SELECT_COLUMNS} WHERE outcome = 'PENDING' AND created_at < $1 ORDER BY created_at ASC"
    ))
    .bind(older_than)
    .fetch_all(pool)
    .await
    .context("select pending advices failed")?;
    into_advices(rows)
}

pub async fn list_evaluated(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Advice>> {
    let rows = sqlx::query_as::<_, AdviceRow>(&format!(
        "{SELECT_COLUMNS} WHERE outcome <> 'PENDING' ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await
    .context("select evaluated advices failed")?;
    into_advices(rows)
}

pub async fn record_outcome(
    pool: &sqlx::PgPool,
    id: Uuid,
    evaluation: &Evaluation,
) -> anyhow::Result<bool> {
    // The PENDING guard makes a second evaluation of the same record a no-op.
    let res = sqlx::query(
        "UPDATE advices SET outcome = $2, performance_score = $3, current_price = $4, evaluated_at = $5 \
         WHERE id = $1 AND outcome = 'PENDING'",
    )
    .bind(id)
    .bind(evaluation.outcome.as_str())
    .bind(evaluation.performance_score)
    .bind(evaluation.current_price)
    .bind(evaluation.evaluated_at)
    .execute(pool)
    .await
    .with_context(|| format!("update advice outcome failed (id={id})"))?;
    Ok(res.rows_affected() == 1)
}
