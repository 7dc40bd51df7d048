use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Advisory locks are scoped to the Postgres session, so acquire and release must use the same
// connection. This is used as a best-effort guard against overlapping scheduled runs of the same
// job for the same market date.
const LOCK_NAMESPACE: i64 = 0x4144_5649_5345; // "ADVISE"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Generate,
    Evaluate,
}

impl Job {
    pub fn as_str(self) -> &'static str {
        match self {
            Job::Generate => "generate",
            Job::Evaluate => "evaluate",
        }
    }

    fn tag(self) -> i64 {
        match self {
            Job::Generate => 1,
            Job::Evaluate => 2,
        }
    }
}

fn lock_key(job: Job, date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (job.tag() << 40) ^ i64::from(date.num_days_from_ce())
}

pub async fn try_acquire_job_lock(
    conn: &mut sqlx::PgConnection,
    job: Job,
    date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = lock_key(job, date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (job={}, key={key})", job.as_str()))?;
    Ok(acquired.0)
}

pub async fn release_job_lock(
    conn: &mut sqlx::PgConnection,
    job: Job,
    date: NaiveDate,
) -> anyhow::Result<()> {
    let key = lock_key(job, date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release advisory lock (job={}, key={key})", job.as_str()))?;
    Ok(())
}
