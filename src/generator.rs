//! External generation capability
//!
//! [`Generator`] is the seam the orchestrator calls on a pattern miss.
//! [`OpenRouterGenerator`] talks to any OpenAI-compatible chat completions
//! endpoint (OpenRouter by default) and expects a JSON object back.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::types::{CodeRequest, DocsRequest, ExpandRequest, FeatureRequest, FixRequest, IdeasRequest, PatternKind};

/// Kind-specific parameters handed to the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum GenerationRequest {
    Documentation(DocsRequest),
    CodeGeneration(CodeRequest),
    CodeFix(FixRequest),
    FeatureAddition(FeatureRequest),
    IdeaGeneration(IdeasRequest),
    IdeaExpansion(ExpandRequest),
}

impl GenerationRequest {
    pub fn kind(&self) -> PatternKind {
        match self {
            GenerationRequest::Documentation(_) => PatternKind::Documentation,
            GenerationRequest::CodeGeneration(_) => PatternKind::CodeGeneration,
            GenerationRequest::CodeFix(_) => PatternKind::CodeFix,
            GenerationRequest::FeatureAddition(_) => PatternKind::FeatureAddition,
            GenerationRequest::IdeaGeneration(_) => PatternKind::IdeaGeneration,
            GenerationRequest::IdeaExpansion(_) => PatternKind::IdeaExpansion,
        }
    }
}

/// Produces the output for a request the pattern store could not answer.
/// The returned JSON must match the kind's response shape.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Value, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Chat-completions backed generator
#[derive(Clone)]
pub struct OpenRouterGenerator {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenRouterGenerator {
    pub fn new(config: &GeneratorConfig, api_key: String) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Send one chat completion and return the assistant text
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(self.max_tokens),
            response_format: serde_json::json!({ "type": "json_object" }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "Pattern Forge")
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body: truncate(&body, 500) });
        }

        let body = response.text().await.map_err(|e| GenerationError::Request(e.to_string()))?;
        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Malformed(format!("{} (body: {})", e, truncate(&body, 500))))?;

        let content = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| GenerationError::Malformed("response has no message content".into()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl Generator for OpenRouterGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Value, GenerationError> {
        let kind = request.kind();
        let params = serde_json::to_string_pretty(&request).map_err(|e| GenerationError::Request(e.to_string()))?;
        let messages = vec![ChatMessage::system(system_prompt(kind)), ChatMessage::user(params)];

        debug!("Calling generator for {} with model {}", kind, self.model);
        let content = self.complete(messages).await?;
        parse_json_content(&content)
    }
}

/// Response contract for each kind, stated as the JSON shape to return
fn system_prompt(kind: PatternKind) -> String {
    let shape = match kind {
        PatternKind::Documentation => r#"{"text": string}"#,
        PatternKind::CodeGeneration => r#"{"code": string, "explanation": string, "suggestedFileName": string | null}"#,
        PatternKind::CodeFix => r#"{"code": string, "explanation": string}"#,
        PatternKind::FeatureAddition => {
            r#"{"files": [{"path": string, "content": string}], "explanation": string, "logs": [string]}"#
        }
        PatternKind::IdeaGeneration => {
            r#"{"ideas": [{"title": string, "description": string, "features": [string]}], "inspirations": [string]}"#
        }
        PatternKind::IdeaExpansion => r#"{"expandedIdea": object}"#,
    };
    format!(
        "You are a Minecraft mod development assistant performing the task '{}'. \
         The user message holds the task parameters as JSON. \
         Reply with a single JSON object of the form {} and nothing else.",
        kind, shape
    )
}

/// Parse the assistant text as JSON, tolerating a surrounding code fence
fn parse_json_content(content: &str) -> Result<Value, GenerationError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: Value = serde_json::from_str(unfenced)
        .map_err(|e| GenerationError::Malformed(format!("{} (content: {})", e, truncate(unfenced, 200))))?;
    if !value.is_object() {
        return Err(GenerationError::Malformed("expected a JSON object".into()));
    }
    Ok(value)
}

/// Truncate on a char boundary
fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_fenced_json() {
        let plain = parse_json_content(r#"{"text": "/** Foo */"}"#).unwrap();
        assert_eq!(plain["text"], "/** Foo */");

        let fenced = parse_json_content("```json\n{\"code\": \"x\"}\n```").unwrap();
        assert_eq!(fenced["code"], "x");
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(matches!(parse_json_content("[1, 2]"), Err(GenerationError::Malformed(_))));
        assert!(matches!(parse_json_content("sorry, I can't"), Err(GenerationError::Malformed(_))));
    }

    #[test]
    fn test_generation_request_tags_kind() {
        let req = GenerationRequest::IdeaExpansion(ExpandRequest {
            title: "Sky Islands".into(),
            description: "floating biomes".into(),
        });
        assert_eq!(req.kind(), PatternKind::IdeaExpansion);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["kind"], "idea_expansion");
        assert_eq!(json["params"]["title"], "Sky Islands");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[test]
    fn test_system_prompt_names_shape() {
        assert!(system_prompt(PatternKind::Documentation).contains(r#""text""#));
        assert!(system_prompt(PatternKind::FeatureAddition).contains("files"));
    }
}
