use anyhow::Context;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use std::collections::HashSet;

const DEFAULT_UTC_OFFSET_HOURS: i32 = -5;

/// Market-local calendar date for `now_utc`, or the explicit `--date` argument.
pub fn resolve_market_date(date_arg: Option<&str>, now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    if let Some(s) = date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid date (expected YYYY-MM-DD): {s}"));
    }

    let offset_hours = std::env::var("MARKET_UTC_OFFSET_HOURS")
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or(DEFAULT_UTC_OFFSET_HOURS);
    market_date(now_utc, offset_hours)
}

pub fn market_date(now_utc: DateTime<Utc>, offset_hours: i32) -> anyhow::Result<NaiveDate> {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .with_context(|| format!("invalid market UTC offset: {offset_hours}h"))?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}

pub fn is_trading_day(date: NaiveDate) -> bool {
    !is_weekend(date) && !configured_holidays(date.year()).contains(&date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays(year: i32) -> HashSet<NaiveDate> {
    // Fixed-date closures only; extend via US_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out: HashSet<NaiveDate> = [(1, 1), (7, 4), (12, 25)]
        .into_iter()
        .filter_map(|(m, d)| NaiveDate::from_ymd_opt(year, m, d))
        .collect();

    if let Ok(s) = std::env::var("US_MARKET_HOLIDAYS") {
        out.extend(parse_holidays(&s));
    }

    out
}

fn parse_holidays(s: &str) -> Vec<NaiveDate> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match NaiveDate::parse_from_str(part, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(err) => {
                tracing::warn!(value = part, error = %err, "ignoring malformed US_MARKET_HOLIDAYS entry");
                None
            }
        })
        .collect()
}
