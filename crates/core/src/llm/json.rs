use crate::domain::advice::Recommendation;
use crate::domain::contract::{LlmAnalysis, LlmCorrection};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::Provider;
use anyhow::Context;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.split_once('\n').map(|(_, rest)| rest) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

fn parse_value(text: &str) -> anyhow::Result<serde_json::Value> {
    let json_str = extract_json(text).context("advisor output contains no JSON object")?;
    serde_json::from_str(&json_str)
        .with_context(|| format!("advisor output is not valid JSON: {json_str}"))
}

/// Failures carry the raw advisor text as an [`LlmDiagnosticsError`] with stage `parse`.
pub fn parse_analysis(provider: Provider, text: &str) -> anyhow::Result<Recommendation> {
    parse_value(text)
        .and_then(LlmAnalysis::from_value)
        .map(LlmAnalysis::validate)
        .map_err(|e| LlmDiagnosticsError::parse(provider, format!("{e:#}"), text).into())
}

pub fn parse_correction(provider: Provider, text: &str) -> anyhow::Result<LlmCorrection> {
    parse_value(text)
        .and_then(LlmCorrection::from_value)
        .map_err(|e| LlmDiagnosticsError::parse(provider, format!("{e:#}"), text).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::advice::Action;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "Here is my analysis: {\"a\":1} hope it helps";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn analysis_embedded_in_prose_is_validated() {
        let text = r#"Sure. {"action": "buy", "confidence": 120, "targetPrice": "185.5", "reasoning": "Breakout above resistance"} Thanks."#;
        let rec = parse_analysis(Provider::Anthropic, text).unwrap();
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence, 95);
        assert_eq!(rec.target_price, 185.5);
        assert_eq!(rec.reasoning, "Breakout above resistance");
    }

    #[test]
    fn analysis_defaults_for_bad_fields() {
        let rec = parse_analysis(Provider::OpenAI, r#"{"action": "STRONG BUY", "targetPrice": "n/a"}"#).unwrap();
        assert_eq!(rec.action, Action::Hold);
        assert_eq!(rec.confidence, 50);
        assert_eq!(rec.target_price, 0.0);
        assert_eq!(rec.reasoning, "AI analysis completed");
    }

    #[test]
    fn analysis_rejects_non_json() {
        assert!(parse_analysis(Provider::Anthropic, "{not json}").is_err());

        let err = parse_analysis(Provider::OpenAI, "I think you should buy.").unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.provider, Provider::OpenAI);
        assert_eq!(diag.stage, "parse");
        assert_eq!(diag.raw_output.as_deref(), Some("I think you should buy."));
        assert!(diag.detail.contains("no JSON object"));
    }

    #[test]
    fn correction_requires_verdict() {
        let ok = parse_correction(
            Provider::Anthropic,
            "```json\n{\"shouldCorrect\": true, \"correctedAction\": \"sell\", \"correctedConfidence\": 72, \"correctionReason\": \"RSI overbought\"}\n```",
        )
        .unwrap();
        assert!(ok.should_correct);
        assert_eq!(ok.corrected_action, Action::Sell);
        assert_eq!(ok.corrected_confidence, 72);

        let err = parse_correction(Provider::Anthropic, r#"{"correctedAction": "SELL"}"#).unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "parse");
        assert_eq!(diag.raw_output.as_deref(), Some(r#"{"correctedAction": "SELL"}"#));
    }
}
