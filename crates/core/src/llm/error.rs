use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Advisor failure carrying enough of the raw exchange to debug a bad response.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn parse(provider: Provider, detail: impl Into<String>, raw_output: &str) -> Self {
        Self {
            provider,
            stage: "parse",
            detail: detail.into(),
            raw_output: Some(raw_output.to_string()),
            raw_response_json: None,
        }
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "advisor error (provider={}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}
