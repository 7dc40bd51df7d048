use crate::domain::advice::{Action, Advice, Evaluation, Outcome};
use crate::domain::snapshot::price_change_percent;
use anyhow::ensure;
use chrono::{DateTime, Utc};

/// Band around zero inside which a move counts as "stable".
pub const STABLE_BAND_PERCENT: f64 = 2.0;

/// Maps an action and the realized move onto an outcome and a 0..=100 score.
pub fn classify(action: Action, price_change: f64) -> (Outcome, f64) {
    match action {
        Action::Buy => {
            if price_change > STABLE_BAND_PERCENT {
                (Outcome::Success, (50.0 + price_change * 10.0).min(100.0))
            } else if price_change > 0.0 {
                (Outcome::Partial, 40.0 + price_change * 10.0)
            } else {
                (Outcome::Failure, (40.0 + price_change * 5.0).max(0.0))
            }
        }
        Action::Sell => {
            if price_change < -STABLE_BAND_PERCENT {
                (Outcome::Success, (50.0 + price_change.abs() * 10.0).min(100.0))
            } else if price_change < 0.0 {
                (Outcome::Partial, 40.0 + price_change.abs() * 10.0)
            } else {
                (Outcome::Failure, (40.0 - price_change * 5.0).max(0.0))
            }
        }
        // HOLD is never a failure.
        Action::Hold => {
            if price_change.abs() < STABLE_BAND_PERCENT {
                (Outcome::Success, 70.0)
            } else {
                (Outcome::Partial, 50.0)
            }
        }
    }
}

pub fn evaluate(
    advice: &Advice,
    current_price: f64,
    now: DateTime<Utc>,
) -> anyhow::Result<Evaluation> {
    ensure!(
        advice.price_at_advice.is_finite() && advice.price_at_advice > 0.0,
        "advice {} has invalid price_at_advice {}",
        advice.id,
        advice.price_at_advice
    );
    ensure!(
        current_price.is_finite() && current_price > 0.0,
        "invalid current price {current_price} for {}",
        advice.symbol
    );

    let price_change = price_change_percent(advice.price_at_advice, current_price);
    let (outcome, performance_score) = classify(advice.action, price_change);

    Ok(Evaluation {
        outcome,
        performance_score,
        price_change_percent: price_change,
        current_price,
        evaluated_at: now,
    })
}
