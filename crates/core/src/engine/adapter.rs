//! Performance aggregation and weight/threshold adaptation.

use crate::domain::advice::{Advice, Outcome};
use crate::domain::strategy::{Adjustments, LearningEntry, Performance, Strategy};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MIN_SAMPLE_FOR_ADAPTATION: u64 = 5;
pub const ADAPTATION_SUCCESS_RATE: f64 = 50.0;
pub const MAJOR_ADJUSTMENT_SUCCESS_RATE: f64 = 40.0;
pub const RSI_TO_MACD_SHIFT: f64 = 0.1;
pub const CONFIDENCE_MIN_STEP: f64 = 5.0;
pub const CONFIDENCE_MIN_CEILING: f64 = 70.0;

const RATE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OutcomeStats {
    pub evaluated: u64,
    pub successful: u64,
    pub partial: u64,
    pub failed: u64,
    pub average_score: f64,
}

impl OutcomeStats {
    /// Cumulative statistics over every terminal advice; pending ones are ignored.
    pub fn from_advices<'a>(advices: impl IntoIterator<Item = &'a Advice>) -> Self {
        let mut stats = Self::default();
        let mut score_sum = 0.0;
        for advice in advices {
            match advice.outcome {
                Outcome::Pending => continue,
                Outcome::Success => stats.successful += 1,
                Outcome::Partial => stats.partial += 1,
                Outcome::Failure => stats.failed += 1,
            }
            stats.evaluated += 1;
            score_sum += advice.performance_score.unwrap_or(0.0);
        }
        if stats.evaluated > 0 {
            stats.average_score = score_sum / stats.evaluated as f64;
        }
        stats
    }

    /// Partial outcomes count as half a success. 0..=100.
    pub fn success_rate(&self) -> f64 {
        if self.evaluated == 0 {
            return 0.0;
        }
        (self.successful as f64 + 0.5 * self.partial as f64) / self.evaluated as f64 * 100.0
    }

    pub fn performance(&self) -> Performance {
        Performance {
            total_advices: self.evaluated,
            successful_advices: self.successful,
            success_rate: self.success_rate(),
            average_score: self.average_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptationReport {
    pub performance: Performance,
    /// Set when this run appended a learning entry.
    pub learning_entry: Option<LearningEntry>,
}

/// Updates performance and, when results are poor, shifts weights and raises the
/// confidence floor. Weights are renormalized on every call.
pub fn adapt(strategy: &mut Strategy, stats: &OutcomeStats, now: DateTime<Utc>) -> AdaptationReport {
    let previous_success_rate = strategy.performance.success_rate;
    let performance = stats.performance();
    let success_rate = performance.success_rate;
    strategy.performance = performance;

    let mut learning_entry = None;
    if should_adapt(strategy, stats) {
        let mut adjustments = Adjustments::default();

        if success_rate < MAJOR_ADJUSTMENT_SUCCESS_RATE {
            let delta = strategy.weights.rsi * RSI_TO_MACD_SHIFT;
            strategy.weights.rsi -= delta;
            strategy.weights.macd += delta;
            adjustments.rsi_weight = Some(strategy.weights.rsi);
            adjustments.macd_weight = Some(strategy.weights.macd);

            let raised = (strategy.thresholds.confidence_min + CONFIDENCE_MIN_STEP)
                .min(CONFIDENCE_MIN_CEILING);
            strategy.thresholds.confidence_min = raised;
            adjustments.confidence_min = Some(raised);
        }

        let entry = LearningEntry {
            date: now,
            adjustments,
            reason: format!("Success rate dropped to {success_rate:.1}%"),
            previous_success_rate,
            new_success_rate: success_rate,
            sample_size: stats.evaluated,
        };
        strategy.learning_history.push(entry.clone());
        learning_entry = Some(entry);
    }

    strategy.weights.normalize();
    strategy.updated_at = now;

    AdaptationReport {
        performance,
        learning_entry,
    }
}

fn should_adapt(strategy: &Strategy, stats: &OutcomeStats) -> bool {
    if stats.evaluated < MIN_SAMPLE_FOR_ADAPTATION {
        return false;
    }
    let success_rate = stats.success_rate();
    if success_rate >= ADAPTATION_SUCCESS_RATE {
        return false;
    }
    // Unchanged statistics since the last adjustment: nothing new to learn from.
    !strategy.learning_history.last().is_some_and(|last| {
        last.sample_size == stats.evaluated
            && (last.new_success_rate - success_rate).abs() < RATE_EPSILON
    })
}
