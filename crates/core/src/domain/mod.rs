pub mod advice;
pub mod asset;
pub mod contract;
pub mod correction;
pub mod prompt;
pub mod snapshot;
pub mod strategy;

use std::fmt;

/// Rejections and lookups that callers must see as-is, carried inside `anyhow::Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidInput(String),
    NotFound(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidInput(detail) => write!(f, "invalid input: {detail}"),
            EngineError::NotFound(detail) => write!(f, "not found: {detail}"),
        }
    }
}

impl std::error::Error for EngineError {}
