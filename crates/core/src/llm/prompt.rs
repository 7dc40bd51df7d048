//! Built-in advisor prompts and `{{name}}` placeholder filling.
//!
//! Everything here is pure string formatting; nothing calls out to a model.

use crate::domain::advice::{Action, Advice};
use crate::domain::prompt::AnalysisPrompt;
use crate::domain::snapshot::IndicatorSnapshot;
use crate::domain::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::domain::prompt::PromptCategory;

pub const DEFAULT_ANALYSIS_PROMPT: &str = "technical_analysis";
pub const SELF_CORRECTION_PROMPT: &str = "self_correction";
pub const DEFAULT_CUSTOM_SYSTEM_PROMPT: &str = "You are an expert financial analyst.";

const HIGH_VOLUME: u64 = 5_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub category: PromptCategory,
    pub system_prompt: &'static str,
    pub template: &'static str,
}

impl PromptTemplate {
    /// Fresh, unused store record for this built-in.
    pub fn to_stored(&self, now: DateTime<Utc>) -> AnalysisPrompt {
        AnalysisPrompt {
            id: Uuid::new_v4(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            category: self.category,
            system_prompt: self.system_prompt.to_string(),
            template: self.template.to_string(),
            is_active: true,
            usage_count: 0,
            last_used: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Caller-supplied prompt for one analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomPrompt {
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(alias = "promptTemplate")]
    pub template: String,
}

impl CustomPrompt {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.template.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "custom prompt template must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CUSTOM_SYSTEM_PROMPT)
    }
}

static BUILT_IN: [PromptTemplate; 4] = [
    PromptTemplate {
        name: "technical_analysis",
        description: "Comprehensive technical analysis based on indicators",
        category: PromptCategory::Technical,
        system_prompt: "You are an expert technical analyst specializing in stock market analysis. You provide clear, actionable recommendations based on technical indicators.",
        template: r#"Analyze the following market data for {{symbol}} ({{assetName}}):

Current Price: ${{price}}
Price Change: {{changePercent}}%
Volume: {{volume}}

Technical Indicators:
- RSI (14-day): {{rsi}}
- MACD: {{macd}}
- SMA 20: ${{sma20}}
- SMA 50: ${{sma50}}

Based on this data, provide:
1. A clear recommendation: BUY, SELL, or HOLD
2. A confidence level (0-100%)
3. A target price
4. A detailed reasoning (2-3 sentences)

Format your response as JSON:
{
  "action": "BUY|SELL|HOLD",
  "confidence": 75,
  "targetPrice": 150.00,
  "reasoning": "Your analysis here"
}"#,
    },
    PromptTemplate {
        name: "momentum_analysis",
        description: "Focus on momentum and trend analysis",
        category: PromptCategory::Technical,
        system_prompt: "You are a momentum trader focusing on price trends and market momentum.",
        template: r#"Evaluate the momentum for {{symbol}}:

Price: ${{price}} ({{changePercent}}% today)
Volume: {{volume}}
RSI: {{rsi}}
MACD: {{macd}}
Trend: SMA20 (${{sma20}}) vs SMA50 (${{sma50}})

Determine if the momentum is bullish, bearish, or neutral.
Provide a trading recommendation with confidence.

JSON response:
{
  "action": "BUY|SELL|HOLD",
  "confidence": 75,
  "targetPrice": 150.00,
  "reasoning": "Your momentum analysis"
}"#,
    },
    PromptTemplate {
        name: "risk_assessment",
        description: "Risk-focused analysis for conservative investors",
        category: PromptCategory::Fundamental,
        system_prompt: "You are a risk-averse financial advisor focusing on capital preservation.",
        template: r#"Risk assessment for {{symbol}} ({{assetName}}):

Current Price: ${{price}}
Daily Change: {{changePercent}}%
RSI: {{rsi}} (oversold < 30, overbought > 70)
Trend: {{trend}}

Evaluate the risk/reward ratio and provide a conservative recommendation.
Consider volatility and potential downside.

JSON response:
{
  "action": "BUY|SELL|HOLD",
  "confidence": 75,
  "targetPrice": 150.00,
  "reasoning": "Your risk assessment"
}"#,
    },
    PromptTemplate {
        name: "self_correction",
        description: "Reviews a previous advice against current conditions",
        category: PromptCategory::General,
        system_prompt: "You are an AI analyst reviewing previous predictions to identify errors and improve future accuracy.",
        template: r#"Review this previous advice and current market conditions:

ORIGINAL ADVICE ({{adviceDate}}):
- Symbol: {{symbol}}
- Recommendation: {{originalAction}}
- Confidence: {{originalConfidence}}%
- Price at advice: ${{priceAtAdvice}}
- Reasoning: {{originalReasoning}}

CURRENT MARKET CONDITIONS:
- Current Price: ${{currentPrice}}
- Price Change: {{priceChange}}%
- RSI: {{currentRsi}}
- MACD: {{currentMacd}}
- Volume trend: {{volumeTrend}}

PERFORMANCE:
- Expected outcome: {{expectedOutcome}}
- Actual outcome: {{actualOutcome}}

Analyze if the original advice was correct. If not, explain what went wrong and provide a corrected recommendation.

JSON response:
{
  "shouldCorrect": true,
  "correctedAction": "BUY|SELL|HOLD",
  "correctedConfidence": 75,
  "correctionReason": "Explanation of what went wrong and why",
  "learnings": "What the system should learn from this"
}"#,
    },
];

const REALTIME_SYSTEM_PROMPT: &str = "You are an expert financial analyst providing real-time market analysis. \
Analyze the provided market data and answer the user's question concisely. \
Always include a recommendation (BUY/SELL/HOLD) with confidence level.";

pub fn built_in(name: &str) -> Option<&'static PromptTemplate> {
    BUILT_IN.iter().find(|p| p.name == name)
}

pub fn list(category: Option<PromptCategory>) -> Vec<&'static PromptTemplate> {
    BUILT_IN
        .iter()
        .filter(|p| category.map_or(true, |c| p.category == c))
        .collect()
}

/// Analysis prompt by name. Unknown names, and the correction prompt, resolve to
/// the default technical analysis.
pub fn analysis_prompt(name: Option<&str>) -> &'static PromptTemplate {
    name.filter(|n| *n != SELF_CORRECTION_PROMPT)
        .and_then(built_in)
        .unwrap_or(&BUILT_IN[0])
}

pub fn correction_prompt() -> &'static PromptTemplate {
    &BUILT_IN[3]
}

/// Replaces every `{{name}}` occurrence. Unknown placeholders are left as-is.
pub fn fill(template: &str, fields: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in fields {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFields {
    pub symbol: String,
    pub asset_name: String,
    pub price: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
}

impl AnalysisFields {
    pub fn from_snapshot(snapshot: &IndicatorSnapshot, asset_name: Option<&str>) -> Self {
        Self {
            symbol: snapshot.symbol.clone(),
            asset_name: asset_name.unwrap_or(&snapshot.symbol).to_string(),
            price: snapshot.price,
            change_percent: snapshot.change_percent,
            volume: snapshot.volume,
            rsi: snapshot.rsi,
            macd: snapshot.macd,
            sma20: snapshot.sma20,
            sma50: snapshot.sma50,
        }
    }

    fn trend(&self) -> &'static str {
        match (self.sma20, self.sma50) {
            (Some(a), Some(b)) if a > b => "Bullish (SMA20 > SMA50)",
            (Some(_), Some(_)) => "Bearish (SMA20 <= SMA50)",
            _ => "Unknown",
        }
    }

    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", self.symbol.clone()),
            ("assetName", self.asset_name.clone()),
            ("price", format!("{:.2}", self.price)),
            ("changePercent", format!("{:.2}", self.change_percent)),
            ("volume", thousands(self.volume)),
            ("rsi", optional(self.rsi, 1)),
            ("macd", optional(self.macd, 2)),
            ("sma20", optional(self.sma20, 2)),
            ("sma50", optional(self.sma50, 2)),
            ("trend", self.trend().to_string()),
        ]
    }

    pub fn render(&self, template: &str) -> String {
        fill(template, &self.pairs())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionFields {
    pub advice_date: String,
    pub symbol: String,
    pub original_action: Action,
    pub original_confidence: u8,
    pub price_at_advice: f64,
    pub original_reasoning: String,
    pub current_price: f64,
    pub price_change: f64,
    pub current_rsi: Option<f64>,
    pub current_macd: Option<f64>,
    pub current_volume: u64,
}

impl CorrectionFields {
    pub fn new(advice: &Advice, current: &IndicatorSnapshot, price_change: f64) -> Self {
        Self {
            advice_date: advice.created_at.format("%Y-%m-%d").to_string(),
            symbol: advice.symbol.clone(),
            original_action: advice.action,
            original_confidence: advice.confidence,
            price_at_advice: advice.price_at_advice,
            original_reasoning: advice.reasoning.clone(),
            current_price: current.price,
            price_change,
            current_rsi: current.rsi,
            current_macd: current.macd,
            current_volume: current.volume,
        }
    }

    fn expected_outcome(&self) -> &'static str {
        match self.original_action {
            Action::Buy => "Price increase",
            Action::Sell => "Price decrease",
            Action::Hold => "Price stability",
        }
    }

    fn actual_outcome(&self) -> &'static str {
        let change = self.price_change;
        match self.original_action {
            Action::Buy if change > 2.0 => "Price increased as expected",
            Action::Buy if change < -2.0 => "Price decreased unexpectedly",
            Action::Sell if change < -2.0 => "Price decreased as expected",
            Action::Sell if change > 2.0 => "Price increased unexpectedly",
            Action::Buy | Action::Sell => "Price stable",
            Action::Hold if change.abs() < 2.0 => "Price stayed stable as expected",
            Action::Hold => "Price moved unexpectedly",
        }
    }

    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("adviceDate", self.advice_date.clone()),
            ("symbol", self.symbol.clone()),
            ("originalAction", self.original_action.to_string()),
            ("originalConfidence", self.original_confidence.to_string()),
            ("priceAtAdvice", format!("{:.2}", self.price_at_advice)),
            ("originalReasoning", self.original_reasoning.clone()),
            ("currentPrice", format!("{:.2}", self.current_price)),
            ("priceChange", format!("{:.2}", self.price_change)),
            ("currentRsi", optional(self.current_rsi, 1)),
            ("currentMacd", optional(self.current_macd, 2)),
            (
                "volumeTrend",
                if self.current_volume > HIGH_VOLUME { "High" } else { "Normal" }.to_string(),
            ),
            ("expectedOutcome", self.expected_outcome().to_string()),
            ("actualOutcome", self.actual_outcome().to_string()),
        ]
    }

    pub fn render(&self, template: &str) -> String {
        fill(template, &self.pairs())
    }
}

/// System and user prompt for a free-form question about one symbol.
pub fn realtime_prompts(snapshot: &IndicatorSnapshot, query: &str) -> (String, String) {
    let sign = if snapshot.change_percent >= 0.0 { "+" } else { "" };
    let user = format!(
        "Market Data for {symbol}:\n\
- Price: ${price:.2} ({sign}{change:.2}%)\n\
- Volume: {volume}\n\
- RSI: {rsi}\n\
- MACD: {macd}\n\
- SMA20: ${sma20}\n\
- SMA50: ${sma50}\n\n\
User Question: {query}\n\n\
Respond with your analysis and recommendation in JSON format:\n\
{{\n  \"action\": \"BUY|SELL|HOLD\",\n  \"confidence\": 75,\n  \"targetPrice\": 150.00,\n  \"reasoning\": \"Your analysis answering the user's question\"\n}}",
        symbol = snapshot.symbol,
        price = snapshot.price,
        change = snapshot.change_percent,
        volume = thousands(snapshot.volume),
        rsi = optional(snapshot.rsi, 1),
        macd = optional(snapshot.macd, 2),
        sma20 = optional(snapshot.sma20, 2),
        sma50 = optional(snapshot.sma50, 2),
    );
    (REALTIME_SYSTEM_PROMPT.to_string(), user)
}

fn optional(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "N/A".to_string(),
    }
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
