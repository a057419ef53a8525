//! Generative service abstraction and Anthropic Messages API client.
//!
//! [`LanguageModel`] has two entry points: [`LanguageModel::converse`] drives
//! the tool-use conversation, [`LanguageModel::complete`] is a single-shot
//! prompt used by the analysis steps for structured JSON output.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use distill_shared::{AnthropicConfig, DistillError, Result, read_secret};

const SERVICE: &str = "anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Conversation model
// ---------------------------------------------------------------------------

/// One content block in the wire shape of the Messages API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// The model's reply to one conversation turn.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelTurn {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl ModelTurn {
    /// Tool invocations in the order the model listed them.
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolInvocation {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One turn of the tool-use conversation.
    async fn converse(
        &self,
        system: &str,
        tools: &[ToolSchema],
        transcript: &[ChatMessage],
    ) -> Result<ModelTurn>;

    /// Single-shot completion returning the reply text.
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

/// Anthropic Messages API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_tokens,
        }
    }

    /// Build a client from configuration, reading the key from the
    /// environment variable it names.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self> {
        let key = read_secret(&config.api_key_env)?;
        Ok(Self::new(
            key,
            config.model.clone(),
            config.base_url.clone(),
            config.max_tokens,
        ))
    }

    async fn send(
        &self,
        system: &str,
        tools: &[ToolSchema],
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<ModelTurn> {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": messages,
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DistillError::external(SERVICE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    format!("authentication failed ({status}): {text}")
                }
                StatusCode::TOO_MANY_REQUESTS => format!("rate limit exceeded ({status})"),
                _ => format!("HTTP {status}: {text}"),
            };
            return Err(DistillError::external(SERVICE, message));
        }

        let turn: ModelTurn = response
            .json()
            .await
            .map_err(|e| DistillError::external(SERVICE, format!("undecodable response: {e}")))?;
        debug!(
            blocks = turn.content.len(),
            stop_reason = ?turn.stop_reason,
            "model replied"
        );
        Ok(turn)
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    #[instrument(skip_all, fields(model = %self.model, messages = transcript.len()))]
    async fn converse(
        &self,
        system: &str,
        tools: &[ToolSchema],
        transcript: &[ChatMessage],
    ) -> Result<ModelTurn> {
        self.send(system, tools, transcript, self.max_tokens).await
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let turn = self
            .send(system, &[], &[ChatMessage::user_text(prompt)], max_tokens)
            .await?;
        Ok(turn.text())
    }
}

// ---------------------------------------------------------------------------
// Structured output
// ---------------------------------------------------------------------------

static FENCED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?\s*```").expect("valid regex")
});

/// Parse a JSON reply, accepting either a bare document or the first fenced
/// code block. `context` names the step for error messages.
pub fn parse_llm_json<T: DeserializeOwned>(context: &str, text: &str) -> Result<T> {
    let stripped = text.trim();

    if let Ok(value) = serde_json::from_str(stripped) {
        return Ok(value);
    }

    let fenced = FENCED_RE
        .captures(stripped)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim());
    if let Some(body) = fenced {
        if let Ok(value) = serde_json::from_str(body) {
            return Ok(value);
        }
    }

    let preview: String = text.chars().take(500).collect();
    Err(DistillError::malformed(
        context,
        format!("no JSON object of the expected shape in reply: {preview}"),
    ))
}
