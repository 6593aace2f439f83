//! LLM-backed generation: BRDs, stories, analysis, estimation and editing

pub mod prompts;
pub mod provider;
mod service;

use crate::db::AiConfiguration;
use serde::Serialize;

pub use provider::{
    ChatProvider, ChatRequest, ChatRole, ChatTurn, OpenAIProvider, ProviderError,
    ProviderResponse,
};
pub use service::{
    extract_json_array, extract_json_object, normalize_criteria_text, parse_estimate, snap_points,
    AiClient, AiError, AiService, AnalysisReport, GeneratedStory,
};

/// Story point scale
pub const FIBONACCI_POINTS: [i64; 7] = [1, 2, 3, 5, 8, 13, 21];

pub const ALLOWED_MODELS: [&str; 4] =
    ["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo", "gpt-3.5-turbo-16k"];
pub const LANGUAGES: [&str; 6] = ["en", "es", "fr", "de", "ar", "zh"];
pub const DETAIL_LEVELS: [&str; 3] = ["brief", "standard", "detailed"];

pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=2.0;
pub const MAX_TOKENS_RANGE: std::ops::RangeInclusive<i64> = 100..=4000;

/// Generation settings used when calling the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub language: String,
    pub detail_level: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            language: "en".to_string(),
            detail_level: "standard".to_string(),
        }
    }
}

impl AiSettings {
    pub fn from_config(config: &AiConfiguration) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            language: config.language.clone(),
            detail_level: config.detail_level.clone(),
        }
    }

    /// First rule the settings break, if any
    pub fn validate(&self) -> Result<(), String> {
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err("Temperature must be between 0 and 2".to_string());
        }
        if !MAX_TOKENS_RANGE.contains(&self.max_tokens) {
            return Err("Max tokens must be between 100 and 4000".to_string());
        }
        if !ALLOWED_MODELS.contains(&self.model.as_str()) {
            return Err(format!("Invalid model. Allowed: {}", ALLOWED_MODELS.join(", ")));
        }
        if !LANGUAGES.contains(&self.language.as_str()) {
            return Err(format!("Invalid language. Allowed: {}", LANGUAGES.join(", ")));
        }
        if !DETAIL_LEVELS.contains(&self.detail_level.as_str()) {
            return Err(format!(
                "Invalid detail level. Allowed: {}",
                DETAIL_LEVELS.join(", ")
            ));
        }
        Ok(())
    }
}
