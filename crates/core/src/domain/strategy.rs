use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_STRATEGY_NAME: &str = "default";
pub const LEARNING_HISTORY_CAPACITY: usize = 20;
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub rsi: f64,
    pub macd: f64,
    pub trend: f64,
    pub volume: f64,
    pub momentum: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            rsi: 0.20,
            macd: 0.25,
            trend: 0.25,
            volume: 0.15,
            momentum: 0.15,
        }
    }
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.rsi + self.macd + self.trend + self.volume + self.momentum
    }

    /// Rescales every weight so they sum to 1.0. A non-positive total resets to defaults.
    pub fn normalize(&mut self) {
        let total = self.sum();
        if !total.is_finite() || total <= 0.0 {
            *self = Self::default();
            return;
        }
        self.rsi /= total;
        self.macd /= total;
        self.trend /= total;
        self.volume /= total;
        self.momentum /= total;
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub confidence_min: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            confidence_min: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub total_advices: u64,
    pub successful_advices: u64,
    /// 0..=100
    pub success_rate: f64,
    pub average_score: f64,
}

/// Parameter changes applied by one adaptation. Unset fields were left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsi_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macd_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_min: Option<f64>,
}

impl Adjustments {
    pub fn is_empty(&self) -> bool {
        self.rsi_weight.is_none() && self.macd_weight.is_none() && self.confidence_min.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEntry {
    pub date: DateTime<Utc>,
    pub adjustments: Adjustments,
    pub reason: String,
    pub previous_success_rate: f64,
    pub new_success_rate: f64,
    /// Number of evaluated advices the rates were computed over.
    #[serde(default)]
    pub sample_size: u64,
}

/// Fixed-capacity FIFO of learning entries; pushing past capacity evicts the oldest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<LearningEntry>", into = "Vec<LearningEntry>")]
pub struct LearningHistory {
    entries: VecDeque<LearningEntry>,
}

impl LearningHistory {
    pub fn push(&mut self, entry: LearningEntry) {
        while self.entries.len() >= LEARNING_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LearningEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LearningEntry> {
        self.entries.iter()
    }

    /// Most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LearningEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

impl From<Vec<LearningEntry>> for LearningHistory {
    fn from(entries: Vec<LearningEntry>) -> Self {
        let mut history = Self::default();
        for entry in entries {
            history.push(entry);
        }
        history
    }
}

impl From<LearningHistory> for Vec<LearningEntry> {
    fn from(history: LearningHistory) -> Self {
        history.entries.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub weights: Weights,
    pub thresholds: Thresholds,
    pub performance: Performance,
    pub learning_history: LearningHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    pub fn new_default(now: DateTime<Utc>) -> Self {
        Self {
            name: DEFAULT_STRATEGY_NAME.to_string(),
            weights: Weights::default(),
            thresholds: Thresholds::default(),
            performance: Performance::default(),
            learning_history: LearningHistory::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(i: u64) -> LearningEntry {
        LearningEntry {
            date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            adjustments: Adjustments::default(),
            reason: format!("entry {i}"),
            previous_success_rate: 0.0,
            new_success_rate: i as f64,
            sample_size: i,
        }
    }

    #[test]
    fn default_weights_sum_to_one() {
        assert!(Weights::default().is_normalized());
    }

    #[test]
    fn normalize_rescales_drifted_weights() {
        let mut w = Weights {
            rsi: 0.4,
            macd: 0.5,
            trend: 0.5,
            volume: 0.3,
            momentum: 0.3,
        };
        w.normalize();
        assert!((w.sum() - 1.0).abs() < 1e-12);
        assert!((w.rsi - 0.2).abs() < 1e-12);
    }

    #[test]
    fn normalize_resets_degenerate_weights() {
        let mut w = Weights {
            rsi: 0.0,
            macd: 0.0,
            trend: 0.0,
            volume: 0.0,
            momentum: 0.0,
        };
        w.normalize();
        assert_eq!(w, Weights::default());
    }

    #[test]
    fn learning_history_evicts_oldest_first() {
        let mut history = LearningHistory::default();
        for i in 0..25 {
            history.push(entry(i));
        }
        assert_eq!(history.len(), LEARNING_HISTORY_CAPACITY);
        assert_eq!(history.iter().next().unwrap().reason, "entry 5");
        assert_eq!(history.last().unwrap().reason, "entry 24");
        let recent = history.recent(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].reason, "entry 20");
    }

    #[test]
    fn learning_history_deserialization_truncates() {
        let entries: Vec<_> = (0..30).map(entry).collect();
        let json = serde_json::to_value(&entries).unwrap();
        let history: LearningHistory = serde_json::from_value(json).unwrap();
        assert_eq!(history.len(), LEARNING_HISTORY_CAPACITY);
        assert_eq!(history.last().unwrap().sample_size, 29);
    }
}
