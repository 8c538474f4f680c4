//! Inbound request and response bodies.

use serde::{Deserialize, Serialize};

use super::messages::assemble_messages;
use crate::error::{Error, Result};
use crate::upstream::CompletionRequest;

/// One prior exchange. Either side may be missing; other keys are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HistoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,
}

/// Body accepted by `/api/chat` and `/api/chat/stream`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub prompt: String,
    /// Passed upstream as `max_tokens`
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Falls back to the configured default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_max_length() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_stream() -> bool {
    true
}

/// Body returned by `/api/chat`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    pub text: String,
}

impl ChatRequest {
    /// Check the sampling parameters are in range.
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(Error::Validation(
                "max_length must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::Validation(format!(
                "temperature must be between 0 and 1, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(Error::Validation(format!(
                "top_p must be between 0 and 1, got {}",
                self.top_p
            )));
        }
        Ok(())
    }

    /// Build the upstream call for this request.
    pub fn to_completion(&self, default_model: &str) -> CompletionRequest {
        CompletionRequest {
            model: self
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            messages: assemble_messages(&self.prompt, self.history.as_deref().unwrap_or_default()),
            max_tokens: self.max_length,
            temperature: self.temperature,
            top_p: self.top_p,
            stream: self.stream,
        }
    }
}
