//! Analysis prompts as stored records: the built-in templates are seeded once, callers
//! may add or edit their own, and every analysis bumps the usage counter.

use crate::domain::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptCategory {
    Technical,
    Fundamental,
    Sentiment,
    #[default]
    General,
    Custom,
}

impl PromptCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptCategory::Technical => "technical",
            PromptCategory::Fundamental => "fundamental",
            PromptCategory::Sentiment => "sentiment",
            PromptCategory::General => "general",
            PromptCategory::Custom => "custom",
        }
    }
}

impl fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptCategory {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "technical" => Ok(PromptCategory::Technical),
            "fundamental" => Ok(PromptCategory::Fundamental),
            "sentiment" => Ok(PromptCategory::Sentiment),
            "general" => Ok(PromptCategory::General),
            "custom" => Ok(PromptCategory::Custom),
            other => Err(EngineError::InvalidInput(format!(
                "unknown prompt category: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPrompt {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: PromptCategory,
    pub system_prompt: String,
    pub template: String,
    pub is_active: bool,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a create request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPrompt {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: PromptCategory,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(alias = "promptTemplate")]
    pub template: String,
}

impl NewPrompt {
    /// Trims and checks the request, producing an unused prompt.
    pub fn into_prompt(self, default_system_prompt: &str, now: DateTime<Utc>) -> Result<AnalysisPrompt, EngineError> {
        let name = validate_name(&self.name)?;
        let template = validate_template(&self.template)?;
        let system_prompt = self
            .system_prompt
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_system_prompt.to_string());

        Ok(AnalysisPrompt {
            id: Uuid::new_v4(),
            name,
            description: self.description.trim().to_string(),
            category: self.category,
            system_prompt,
            template,
            is_active: true,
            usage_count: 0,
            last_used: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial edit. The name is the lookup key for analyses and cannot change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptUpdate {
    pub description: Option<String>,
    pub category: Option<PromptCategory>,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(default, alias = "promptTemplate")]
    pub template: Option<String>,
    #[serde(default, alias = "isActive")]
    pub is_active: Option<bool>,
}

impl PromptUpdate {
    pub fn apply(self, prompt: &mut AnalysisPrompt, now: DateTime<Utc>) -> Result<(), EngineError> {
        if let Some(template) = self.template {
            prompt.template = validate_template(&template)?;
        }
        if let Some(system_prompt) = self.system_prompt {
            let trimmed = system_prompt.trim();
            if trimmed.is_empty() {
                return Err(EngineError::InvalidInput(
                    "system prompt must not be empty".to_string(),
                ));
            }
            prompt.system_prompt = trimmed.to_string();
        }
        if let Some(description) = self.description {
            prompt.description = description.trim().to_string();
        }
        if let Some(category) = self.category {
            prompt.category = category;
        }
        if let Some(active) = self.is_active {
            prompt.is_active = active;
        }
        prompt.updated_at = now;
        Ok(())
    }
}

fn validate_name(raw: &str) -> Result<String, EngineError> {
    let name = raw.trim();
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(EngineError::InvalidInput(format!(
            "prompt name must be 1-{MAX_NAME_LEN} letters, digits, '_' or '-': {raw:?}"
        )));
    }
    Ok(name.to_string())
}

fn validate_template(raw: &str) -> Result<String, EngineError> {
    if raw.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "prompt template must not be empty".to_string(),
        ));
    }
    Ok(raw.to_string())
}
