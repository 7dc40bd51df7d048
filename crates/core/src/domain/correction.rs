use crate::domain::advice::Action;
use crate::domain::snapshot::IndicatorSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    pub price_change_percent: f64,
    pub snapshot: IndicatorSnapshot,
}

/// Append-only record of a corrected recommendation. The original advice is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionLog {
    pub id: Uuid,
    pub advice_id: Uuid,
    pub symbol: String,
    pub original_action: Action,
    pub original_confidence: u8,
    pub corrected_action: Action,
    pub corrected_confidence: u8,
    pub correction_reason: String,
    pub learnings: Option<String>,
    pub market_conditions: MarketConditions,
    pub created_at: DateTime<Utc>,
}

/// Result of reviewing one past advice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionOutcome {
    pub should_correct: bool,
    pub price_change_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<CorrectionLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learnings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
