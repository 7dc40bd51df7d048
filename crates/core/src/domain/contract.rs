use crate::domain::advice::{Action, Recommendation, MAX_CONFIDENCE};
use anyhow::{bail, Context};
use serde_json::Value;

const DEFAULT_ADVISOR_CONFIDENCE: i64 = 50;
const DEFAULT_ADVISOR_REASONING: &str = "AI analysis completed";

/// Raw analysis object as returned by a language-model advisor.
/// Every field is optional on the wire; `validate` decides what is acceptable.
#[derive(Debug, Clone, Default)]
pub struct LlmAnalysis {
    pub action: Option<String>,
    pub confidence: Option<Value>,
    pub target_price: Option<Value>,
    pub reasoning: Option<String>,
}

impl LlmAnalysis {
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        let Value::Object(map) = value else {
            bail!("advisor analysis must be a JSON object");
        };
        Ok(Self {
            action: map.get("action").and_then(Value::as_str).map(str::to_string),
            confidence: map.get("confidence").cloned(),
            target_price: map
                .get("targetPrice")
                .or_else(|| map.get("target_price"))
                .cloned(),
            reasoning: map.get("reasoning").and_then(Value::as_str).map(str::to_string),
        })
    }

    pub fn validate(self) -> Recommendation {
        let action = self
            .action
            .as_deref()
            .map(Action::parse_lenient)
            .unwrap_or(Action::Hold);
        let confidence = clamp_confidence(
            self.confidence
                .as_ref()
                .and_then(integer_like)
                .unwrap_or(DEFAULT_ADVISOR_CONFIDENCE),
        );
        let target_price = self
            .target_price
            .as_ref()
            .and_then(number_like)
            .filter(|p| p.is_finite())
            .unwrap_or(0.0);
        let reasoning = self
            .reasoning
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ADVISOR_REASONING.to_string());

        Recommendation {
            action,
            confidence,
            target_price,
            reasoning,
        }
    }
}

/// Validated self-correction verdict from an advisor.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmCorrection {
    pub should_correct: bool,
    pub corrected_action: Action,
    pub corrected_confidence: u8,
    pub correction_reason: String,
    pub learnings: Option<String>,
}

impl LlmCorrection {
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        let Value::Object(map) = value else {
            bail!("advisor correction must be a JSON object");
        };

        let should_correct = map
            .get("shouldCorrect")
            .or_else(|| map.get("should_correct"))
            .and_then(Value::as_bool)
            .context("advisor correction is missing boolean shouldCorrect")?;

        let corrected_action = map
            .get("correctedAction")
            .or_else(|| map.get("corrected_action"))
            .and_then(Value::as_str)
            .map(Action::parse_lenient)
            .unwrap_or(Action::Hold);

        let corrected_confidence = clamp_confidence(
            map.get("correctedConfidence")
                .or_else(|| map.get("corrected_confidence"))
                .and_then(integer_like)
                .unwrap_or(DEFAULT_ADVISOR_CONFIDENCE),
        );

        let correction_reason = map
            .get("correctionReason")
            .or_else(|| map.get("correction_reason"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if should_correct && correction_reason.is_none() {
            bail!("advisor correction is missing correctionReason");
        }

        let learnings = map
            .get("learnings")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            should_correct,
            corrected_action,
            corrected_confidence,
            correction_reason: correction_reason.unwrap_or_default(),
            learnings,
        })
    }
}

fn clamp_confidence(raw: i64) -> u8 {
    raw.clamp(0, i64::from(MAX_CONFIDENCE)) as u8
}

/// Accepts integers, floats (truncated) and numeric strings such as "75" or "75%".
fn integer_like(v: &Value) -> Option<i64> {
    number_like(v).map(|n| n.trunc() as i64)
}

fn number_like(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analysis_normalizes_action_and_clamps_confidence() {
        let rec = LlmAnalysis::from_value(json!({
            "action": "buy",
            "confidence": 120,
            "targetPrice": "187.5",
            "reasoning": "  Strong trend.  "
        }))
        .unwrap()
        .validate();

        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence, 95);
        assert_eq!(rec.target_price, 187.5);
        assert_eq!(rec.reasoning, "Strong trend.");
    }

    #[test]
    fn analysis_defaults_invalid_fields() {
        let rec = LlmAnalysis::from_value(json!({
            "action": "ACCUMULATE",
            "confidence": -4,
            "targetPrice": "n/a"
        }))
        .unwrap()
        .validate();

        assert_eq!(rec.action, Action::Hold);
        assert_eq!(rec.confidence, 0);
        assert_eq!(rec.target_price, 0.0);
        assert_eq!(rec.reasoning, DEFAULT_ADVISOR_REASONING);
    }

    #[test]
    fn analysis_rejects_non_objects() {
        assert!(LlmAnalysis::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn correction_requires_should_correct_flag() {
        assert!(LlmCorrection::from_value(json!({"correctedAction": "SELL"})).is_err());
    }

    #[test]
    fn correction_requires_reason_when_correcting() {
        let res = LlmCorrection::from_value(json!({
            "shouldCorrect": true,
            "correctedAction": "SELL",
        }));
        assert!(res.is_err());
    }

    #[test]
    fn correction_parses_full_payload() {
        let c = LlmCorrection::from_value(json!({
            "shouldCorrect": true,
            "correctedAction": "sell",
            "correctedConfidence": "72",
            "correctionReason": "Momentum reversed",
            "learnings": "Weight MACD more"
        }))
        .unwrap();

        assert!(c.should_correct);
        assert_eq!(c.corrected_action, Action::Sell);
        assert_eq!(c.corrected_confidence, 72);
        assert_eq!(c.learnings.as_deref(), Some("Weight MACD more"));
    }
}
