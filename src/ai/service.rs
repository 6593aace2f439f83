//! Analyst workflows on top of a chat provider

use super::prompts::{self, StoryBrief};
use super::provider::{ChatProvider, ChatRequest, ChatTurn, OpenAIProvider, ProviderError};
use super::{AiSettings, FIBONACCI_POINTS};
use crate::config::OpenAiConfig;
use crate::db::{Database, DatabaseError, NewAiStory, UserStory};
use crate::security::SecretCipher;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

lazy_static! {
    static ref JSON_ARRAY: Regex = Regex::new(r"\[[\s\S]*\]").expect("valid regex");
    static ref JSON_OBJECT: Regex = Regex::new(r"\{[\s\S]*\}").expect("valid regex");
    static ref FIRST_INTEGER: Regex = Regex::new(r"-?\d+").expect("valid regex");
}

const DEFAULT_POINTS: i64 = 5;
const ESTIMATION_TEMPERATURE: f64 = 0.3;
const ESTIMATION_MAX_TOKENS: i64 = 10;
const EXTRACTION_TEMPERATURE: f64 = 0.3;
const ANALYSIS_TEMPERATURE: f64 = 0.5;
const CHAT_MAX_TOKENS: i64 = 500;
/// Most recent turns forwarded with a chat message
const CHAT_HISTORY_LIMIT: usize = 20;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI configuration not set")]
    NotConfigured,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Could not parse model output: {0}")]
    Parse(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Story as returned by the model, after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedStory {
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub estimated_points: i64,
    pub priority: String,
    pub business_value: Option<String>,
}

impl GeneratedStory {
    /// Lenient conversion from one element of the model's JSON array
    pub fn from_value(value: &Value) -> Option<Self> {
        let title = value.get("title")?.as_str()?.trim().to_string();
        if title.is_empty() {
            return None;
        }

        let points = match value.get("estimated_points") {
            Some(Value::Number(n)) => n.as_f64().map(|f| f.round() as i64),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        Some(Self {
            title,
            description: text_field(value, "description").unwrap_or_default(),
            acceptance_criteria: value
                .get("acceptance_criteria")
                .map(normalize_criteria_value)
                .unwrap_or_default(),
            estimated_points: snap_points(points),
            priority: text_field(value, "priority").unwrap_or_else(|| "P2".to_string()),
            business_value: text_field(value, "business_value"),
        })
    }

    pub fn into_new(self, brd_id: Option<String>, diagram_id: Option<i64>) -> NewAiStory {
        NewAiStory {
            brd_id,
            diagram_id,
            title: self.title,
            description: self.description,
            acceptance_criteria: self.acceptance_criteria,
            estimated_points: self.estimated_points,
            priority: self.priority,
            business_value: self.business_value,
        }
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Quality report for a BRD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub score: i64,
    pub summary: String,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub suggestions: Vec<String>,
    pub risk_level: String,
}

impl AnalysisReport {
    fn from_value(value: &Value) -> Self {
        let list = |key: &str| {
            value
                .get(key)
                .map(normalize_criteria_value)
                .unwrap_or_default()
        };

        let score = value
            .get("score")
            .and_then(Value::as_f64)
            .map(|s| (s.round() as i64).clamp(1, 100))
            .unwrap_or(50);

        let risk_level = match value
            .get("risk_level")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            Some("low") => "Low",
            Some("high") => "High",
            _ => "Medium",
        };

        Self {
            score,
            summary: text_field(value, "summary").unwrap_or_default(),
            strengths: list("strengths"),
            gaps: list("gaps"),
            suggestions: list("suggestions"),
            risk_level: risk_level.to_string(),
        }
    }
}

/// Outermost JSON array in free-form model output
pub fn extract_json_array(text: &str) -> Option<&str> {
    JSON_ARRAY.find(text).map(|m| m.as_str())
}

/// Outermost JSON object in free-form model output
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

/// Nearest value on the Fibonacci scale; missing or non-positive input gives 5
pub fn snap_points(points: Option<i64>) -> i64 {
    match points {
        Some(p) if p > 0 => FIBONACCI_POINTS
            .iter()
            .copied()
            .min_by_key(|f| (f - p).abs())
            .unwrap_or(DEFAULT_POINTS),
        _ => DEFAULT_POINTS,
    }
}

/// Estimation answers must be exactly on the scale, anything else falls back to 5
pub fn parse_estimate(answer: &str) -> i64 {
    FIRST_INTEGER
        .find(answer)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .filter(|p| FIBONACCI_POINTS.contains(p))
        .unwrap_or(DEFAULT_POINTS)
}

/// Acceptance criteria stored as a JSON array, or as text split on newline, `;` or `,`
pub fn normalize_criteria_text(text: &str) -> Vec<String> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
        return normalize_criteria_value(&Value::Array(items));
    }

    text.split(['\n', ';', ','])
        .map(|part| part.trim().trim_start_matches(['-', '*']).trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_criteria_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => normalize_criteria_text(s),
        _ => Vec::new(),
    }
}

fn parse_stories(output: &str) -> Result<Vec<GeneratedStory>, AiError> {
    let raw = extract_json_array(output)
        .ok_or_else(|| AiError::Parse("no JSON array in response".to_string()))?;
    let items: Vec<Value> =
        serde_json::from_str(raw).map_err(|e| AiError::Parse(e.to_string()))?;

    Ok(items.iter().filter_map(GeneratedStory::from_value).collect())
}

/// Builds providers and resolves which key a user's calls go out with
#[derive(Clone)]
pub struct AiService {
    base_url: String,
    timeout: Duration,
    server_key: Option<String>,
    cipher: SecretCipher,
}

impl AiService {
    pub fn new(config: &OpenAiConfig, cipher: SecretCipher) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            server_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            cipher,
        }
    }

    pub fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    pub fn provider(&self, api_key: &str) -> OpenAIProvider {
        OpenAIProvider::new(&self.base_url, api_key, self.timeout)
    }

    /// Settings and key for `user_id`: personal key first, then the server key
    pub async fn client_for(&self, db: &Database, user_id: i64) -> Result<AiClient, AiError> {
        let stored = db.get_ai_config(user_id).await?;

        let personal_key = stored.as_ref().and_then(|config| {
            if config.api_key.is_empty() {
                return None;
            }
            match self.cipher.decrypt(&config.api_key) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!("Stored API key for user {} is unreadable: {}", user_id, e);
                    None
                }
            }
        });

        let key = personal_key
            .or_else(|| self.server_key.clone())
            .ok_or(AiError::NotConfigured)?;

        let settings = stored
            .as_ref()
            .map(AiSettings::from_config)
            .unwrap_or_default();

        Ok(AiClient::new(Box::new(self.provider(&key)), settings))
    }

    /// Check that `api_key` can list models
    pub async fn test_key(&self, api_key: &str) -> Result<(), ProviderError> {
        self.provider(api_key).validate_connection().await
    }
}

/// A provider bound to one user's settings
pub struct AiClient {
    provider: Box<dyn ChatProvider>,
    settings: AiSettings,
}

impl AiClient {
    pub fn new(provider: Box<dyn ChatProvider>, settings: AiSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }

    async fn ask(
        &self,
        system: &str,
        user: String,
        temperature: Option<f64>,
        max_tokens: Option<i64>,
    ) -> Result<String, AiError> {
        self.send(ChatRequest {
            model: self.settings.model.clone(),
            system: system.to_string(),
            history: Vec::new(),
            user,
            temperature: temperature.unwrap_or(self.settings.temperature),
            max_tokens: max_tokens.or(Some(self.settings.max_tokens)),
        })
        .await
    }

    async fn send(&self, request: ChatRequest) -> Result<String, AiError> {
        let response = self.provider.complete(&request).await?;
        tracing::debug!(
            model = %response.model,
            finish_reason = ?response.finish_reason,
            "Completion received"
        );
        Ok(response.content.trim().to_string())
    }

    /// Free-form assistant reply; only the latest turns of `history` are sent
    pub async fn chat(&self, message: &str, history: &[ChatTurn]) -> Result<String, AiError> {
        let skip = history.len().saturating_sub(CHAT_HISTORY_LIMIT);
        self.send(ChatRequest {
            model: self.settings.model.clone(),
            system: prompts::CHAT_SYSTEM.to_string(),
            history: history[skip..].to_vec(),
            user: message.trim().to_string(),
            temperature: self.settings.temperature,
            max_tokens: Some(CHAT_MAX_TOKENS),
        })
        .await
    }

    pub async fn generate_brd(
        &self,
        stories: &[UserStory],
        template: Option<&str>,
        context: Option<&str>,
    ) -> Result<String, AiError> {
        let criteria: Vec<Vec<String>> = stories
            .iter()
            .map(|s| {
                s.acceptance_criteria
                    .as_deref()
                    .map(normalize_criteria_text)
                    .unwrap_or_default()
            })
            .collect();

        let briefs: Vec<StoryBrief<'_>> = stories
            .iter()
            .zip(criteria.iter())
            .map(|(s, c)| StoryBrief {
                title: &s.title,
                description: s.description.as_deref().unwrap_or(""),
                acceptance_criteria: c,
                priority: &s.priority,
            })
            .collect();

        let prompt = prompts::brd_prompt(
            &briefs,
            template,
            &self.settings.language,
            &self.settings.detail_level,
            context,
        );

        let content = self.ask(prompts::BRD_SYSTEM, prompt, None, None).await?;
        if content.is_empty() {
            return Err(AiError::Parse("empty BRD returned".to_string()));
        }
        Ok(content)
    }

    pub async fn analyze_brd(&self, content: &str) -> Result<AnalysisReport, AiError> {
        let output = self
            .ask(
                prompts::ANALYSIS_SYSTEM,
                prompts::analysis_prompt(content),
                Some(ANALYSIS_TEMPERATURE),
                None,
            )
            .await?;

        let raw = extract_json_object(&output)
            .ok_or_else(|| AiError::Parse("no JSON object in response".to_string()))?;
        let value: Value = serde_json::from_str(raw).map_err(|e| AiError::Parse(e.to_string()))?;

        Ok(AnalysisReport::from_value(&value))
    }

    pub async fn stories_from_requirements(
        &self,
        requirements: &str,
        count: usize,
    ) -> Result<Vec<GeneratedStory>, AiError> {
        let output = self
            .ask(
                prompts::STORY_SYSTEM,
                prompts::stories_from_requirements_prompt(requirements, count),
                None,
                None,
            )
            .await?;
        parse_stories(&output)
    }

    pub async fn stories_from_brd(&self, content: &str) -> Result<Vec<GeneratedStory>, AiError> {
        let output = self
            .ask(
                prompts::EXTRACT_SYSTEM,
                prompts::stories_from_brd_prompt(content),
                Some(EXTRACTION_TEMPERATURE),
                None,
            )
            .await?;
        parse_stories(&output)
    }

    pub async fn stories_from_diagram(
        &self,
        diagram_type: &str,
        code: &str,
    ) -> Result<Vec<GeneratedStory>, AiError> {
        let output = self
            .ask(
                prompts::DIAGRAM_SYSTEM,
                prompts::stories_from_diagram_prompt(diagram_type, code),
                Some(EXTRACTION_TEMPERATURE),
                None,
            )
            .await?;
        parse_stories(&output)
    }

    /// Never fails: provider errors and off-scale answers give 5
    pub async fn estimate_points(
        &self,
        title: &str,
        description: &str,
        criteria: &[String],
    ) -> i64 {
        let answer = self
            .ask(
                prompts::ESTIMATION_SYSTEM,
                prompts::estimation_prompt(title, description, criteria),
                Some(ESTIMATION_TEMPERATURE),
                Some(ESTIMATION_MAX_TOKENS),
            )
            .await;

        match answer {
            Ok(text) => parse_estimate(&text),
            Err(e) => {
                tracing::warn!("Estimation failed for '{}': {}", title, e);
                DEFAULT_POINTS
            }
        }
    }

    pub async fn regenerate_section(
        &self,
        document: &str,
        section_title: &str,
        instructions: Option<&str>,
    ) -> Result<String, AiError> {
        self.ask(
            prompts::BRD_SYSTEM,
            prompts::section_prompt(document, section_title, instructions),
            None,
            None,
        )
        .await
    }

    pub async fn smart_edit(
        &self,
        text: &str,
        instruction: &str,
        context: Option<&str>,
    ) -> Result<String, AiError> {
        self.ask(
            prompts::EDITOR_SYSTEM,
            prompts::smart_edit_prompt(text, instruction, context),
            None,
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{ChatRole, ProviderResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Replays a canned answer and records the requests it saw
    struct CannedProvider {
        answer: String,
        seen: Arc<Mutex<Vec<ChatRequest>>>,
    }

    impl CannedProvider {
        fn boxed(answer: &str) -> Box<Self> {
            Box::new(Self {
                answer: answer.to_string(),
                seen: Arc::default(),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for CannedProvider {
        async fn complete(&self, request: &ChatRequest) -> Result<ProviderResponse, ProviderError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ProviderResponse {
                content: self.answer.clone(),
                model: request.model.clone(),
                finish_reason: Some("stop".into()),
            })
        }

        async fn validate_connection(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["gpt-3.5-turbo".into()])
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        async fn complete(&self, _: &ChatRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::ConnectionError("down".into()))
        }

        async fn validate_connection(&self) -> Result<(), ProviderError> {
            Err(ProviderError::ConnectionError("down".into()))
        }

        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_json_extraction() {
        let text = "Here you go:\n```json\n[{\"title\": \"A\"}]\n```";
        assert_eq!(extract_json_array(text), Some("[{\"title\": \"A\"}]"));
        assert_eq!(extract_json_object("score: {\"a\": 1} done"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_array("nothing"), None);
    }

    #[test]
    fn test_points() {
        assert_eq!(snap_points(Some(4)), 3);
        assert_eq!(snap_points(Some(8)), 8);
        assert_eq!(snap_points(Some(40)), 21);
        assert_eq!(snap_points(Some(0)), 5);
        assert_eq!(snap_points(None), 5);

        assert_eq!(parse_estimate("13"), 13);
        assert_eq!(parse_estimate("Estimate: 8 points"), 8);
        assert_eq!(parse_estimate("4"), 5);
        assert_eq!(parse_estimate("large"), 5);
    }

    #[test]
    fn test_criteria_normalization() {
        assert_eq!(
            normalize_criteria_text(r#"["a", "b"]"#),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            normalize_criteria_text("- first\n- second; third, fourth"),
            vec!["first", "second", "third", "fourth"]
        );
        assert!(normalize_criteria_text("  ").is_empty());
    }

    #[test]
    fn test_generated_story_is_lenient() {
        let story = GeneratedStory::from_value(&json!({
            "title": " Export report ",
            "acceptance_criteria": "CSV; PDF",
            "estimated_points": "7"
        }))
        .unwrap();

        assert_eq!(story.title, "Export report");
        assert_eq!(story.acceptance_criteria, vec!["CSV", "PDF"]);
        assert_eq!(story.estimated_points, 8);
        assert_eq!(story.priority, "P2");
        assert!(GeneratedStory::from_value(&json!({ "description": "no title" })).is_none());
    }

    #[tokio::test]
    async fn test_analysis_parsing() {
        let provider = CannedProvider::boxed(
            r#"Sure! {"score": 140, "summary": "Solid", "strengths": ["Scope"], "gaps": [], "suggestions": ["Add NFRs"], "risk_level": "high"}"#,
        );
        let client = AiClient::new(provider, AiSettings::default());

        let report = client.analyze_brd("# BRD").await.unwrap();
        assert_eq!(report.score, 100);
        assert_eq!(report.risk_level, "High");
        assert_eq!(report.suggestions, vec!["Add NFRs"]);
    }

    #[tokio::test]
    async fn test_estimation_request_shape() {
        let provider = CannedProvider::boxed("13");
        let seen = Arc::clone(&provider.seen);
        let client = AiClient::new(provider, AiSettings::default());

        assert_eq!(client.estimate_points("Login", "As a user", &[]).await, 13);

        let requests = seen.lock().unwrap();
        assert_eq!(requests[0].temperature, 0.3);
        assert_eq!(requests[0].max_tokens, Some(10));
        assert_eq!(requests[0].system, prompts::ESTIMATION_SYSTEM);
    }

    #[tokio::test]
    async fn test_estimation_falls_back_on_error() {
        let client = AiClient::new(Box::new(FailingProvider), AiSettings::default());
        assert_eq!(client.estimate_points("Login", "", &[]).await, 5);
    }

    #[tokio::test]
    async fn test_story_extraction_requires_array() {
        let client = AiClient::new(CannedProvider::boxed("no json here"), AiSettings::default());
        assert!(matches!(
            client.stories_from_brd("# BRD").await,
            Err(AiError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_chat_forwards_latest_history() {
        let provider = CannedProvider::boxed("  Sure.  ");
        let seen = Arc::clone(&provider.seen);
        let client = AiClient::new(provider, AiSettings::default());

        let history: Vec<ChatTurn> = (0..25)
            .map(|i| ChatTurn {
                role: if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant },
                content: format!("turn {}", i),
            })
            .collect();
        assert_eq!(client.chat(" What is a BRD? ", &history).await.unwrap(), "Sure.");

        let requests = seen.lock().unwrap();
        assert_eq!(requests[0].system, prompts::CHAT_SYSTEM);
        assert_eq!(requests[0].user, "What is a BRD?");
        assert_eq!(requests[0].max_tokens, Some(500));
        assert_eq!(requests[0].history.len(), 20);
        assert_eq!(requests[0].history[0].content, "turn 5");
    }
}
