use crate::domain::asset::Category;
use crate::domain::snapshot::IndicatorSnapshot;
use crate::domain::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MAX_CONFIDENCE: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    pub fn target_multiplier(self) -> f64 {
        match self {
            Action::Buy => 1.05,
            Action::Sell => 0.95,
            Action::Hold => 1.0,
        }
    }

    /// Lenient parse used on advisor output: unknown strings become HOLD.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Action::Hold)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            "HOLD" => Ok(Action::Hold),
            other => Err(EngineError::InvalidInput(format!("unknown action: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pending,
    Success,
    Partial,
    Failure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Pending => "PENDING",
            Outcome::Success => "SUCCESS",
            Outcome::Partial => "PARTIAL",
            Outcome::Failure => "FAILURE",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Outcome::Pending),
            "SUCCESS" => Ok(Outcome::Success),
            "PARTIAL" => Ok(Outcome::Partial),
            "FAILURE" => Ok(Outcome::Failure),
            other => Err(EngineError::InvalidInput(format!("unknown outcome: {other}"))),
        }
    }
}

/// Which pipeline produced an advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceOrigin {
    Scoring,
    Advisor,
    Fallback,
}

impl AdviceOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            AdviceOrigin::Scoring => "scoring",
            AdviceOrigin::Advisor => "advisor",
            AdviceOrigin::Fallback => "fallback",
        }
    }
}

impl FromStr for AdviceOrigin {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scoring" => Ok(AdviceOrigin::Scoring),
            "advisor" => Ok(AdviceOrigin::Advisor),
            "fallback" => Ok(AdviceOrigin::Fallback),
            other => Err(EngineError::InvalidInput(format!("unknown origin: {other}"))),
        }
    }
}

/// Directional recommendation fields shared by every scoring path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    pub confidence: u8,
    pub target_price: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub id: Uuid,
    pub symbol: String,
    pub category: Category,
    pub action: Action,
    pub confidence: u8,
    pub price_at_advice: f64,
    pub target_price: f64,
    pub reasoning: String,
    pub indicators: IndicatorSnapshot,
    pub origin: AdviceOrigin,
    pub outcome: Outcome,
    pub performance_score: Option<f64>,
    pub current_price: Option<f64>,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Advice {
    pub fn new(
        category: Category,
        snapshot: IndicatorSnapshot,
        recommendation: Recommendation,
        origin: AdviceOrigin,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: snapshot.symbol.clone(),
            category,
            action: recommendation.action,
            confidence: recommendation.confidence.min(MAX_CONFIDENCE),
            price_at_advice: snapshot.price,
            target_price: recommendation.target_price,
            reasoning: recommendation.reasoning,
            indicators: snapshot,
            origin,
            outcome: Outcome::Pending,
            performance_score: None,
            current_price: None,
            evaluated_at: None,
            created_at,
        }
    }
}

/// Terminal classification of a matured advice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub outcome: Outcome,
    pub performance_score: f64,
    pub price_change_percent: f64,
    pub current_price: f64,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceFilter {
    pub symbol: Option<String>,
    pub outcome: Option<Outcome>,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

pub const MAX_PAGE_LIMIT: u32 = 100;

impl AdviceFilter {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit())
    }

    pub fn limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn matches(&self, advice: &Advice) -> bool {
        self.symbol.as_deref().map_or(true, |s| advice.symbol == s)
            && self.outcome.map_or(true, |o| advice.outcome == o)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvicePage {
    pub items: Vec<Advice>,
    pub total: u64,
    pub page: u32,
    pub pages: u64,
}

impl AdvicePage {
    pub fn new(items: Vec<Advice>, total: u64, filter: &AdviceFilter) -> Self {
        let limit = u64::from(filter.limit());
        Self {
            items,
            total,
            page: filter.page.max(1),
            pages: total.div_ceil(limit),
        }
    }
}
