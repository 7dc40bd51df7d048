pub mod anthropic;
pub mod error;
pub mod json;
pub mod openai;
pub mod prompt;

use crate::config::Settings;
use anyhow::bail;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A language-model backend that answers a filled prompt with free text.
/// Callers extract and validate the JSON payload themselves.
#[async_trait::async_trait]
pub trait AdvisorClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

/// Picks the advisor named by `ADVISOR_PROVIDER`, or the first provider with a key.
/// `Ok(None)` means the rule-based paths are used for everything.
pub fn advisor_from_settings(settings: &Settings) -> anyhow::Result<Option<Arc<dyn AdvisorClient>>> {
    let choice = settings
        .advisor_provider
        .as_deref()
        .map(|s| s.trim().to_ascii_lowercase());

    match choice.as_deref() {
        Some("none") | Some("off") => Ok(None),
        Some("anthropic") => Ok(Some(Arc::new(anthropic::AnthropicClient::from_settings(
            settings,
        )?))),
        Some("openai") => Ok(Some(Arc::new(openai::OpenAiClient::from_settings(settings)?))),
        Some(other) if !other.is_empty() => bail!("unknown ADVISOR_PROVIDER: {other}"),
        _ => {
            if settings.anthropic_api_key.is_some() {
                Ok(Some(Arc::new(anthropic::AnthropicClient::from_settings(
                    settings,
                )?)))
            } else if settings.openai_api_key.is_some() {
                Ok(Some(Arc::new(openai::OpenAiClient::from_settings(settings)?)))
            } else {
                Ok(None)
            }
        }
    }
}
