use std::sync::LazyLock;

use log::{debug, info, trace};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::prompts::theme_message;
use crate::story::response::StoryLlmResponse;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("no story model credential is configured")]
    MissingCredential,

    #[error("request to story model failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("story model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("story model returned an empty completion")]
    EmptyCompletion,

    #[error("no JSON object found in model output. Raw output:\n{0}")]
    NoJson(String),

    #[error("failed to decode story document: {0}")]
    Decode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Chat message helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

impl std::fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.role, self.content)
    }
}

/// Messages for one story request: the fixed instruction, then the theme.
pub fn story_messages(system_prompt: &str, theme: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(theme_message(theme)),
    ]
}

// ---------------------------------------------------------------------------
// Story model seam
// ---------------------------------------------------------------------------

/// An external service that turns an instruction and a theme into a story
/// document. One call, one attempt.
pub trait StoryModel {
    fn generate(&self, system_prompt: &str, theme: &str) -> Result<StoryLlmResponse, LlmError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    /// Refuses to build without a credential, so no request is ever sent
    /// unauthenticated.
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(LlmError::MissingCredential)?;
        let http = reqwest::blocking::Client::builder().build()?;

        info!(
            "Story model: {} at {}",
            settings.model,
            settings.llm_base_url()
        );

        Ok(Self {
            http,
            api_key,
            base_url: settings.llm_base_url().trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        info!("=== LLM CALL: {} messages ===", messages.len());
        for (i, msg) in messages.iter().enumerate() {
            trace!("  msg[{i}] {msg}");
        }

        let request = ChatRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json()?;
        let output = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyCompletion)?;

        trace!(
            "=== LLM RAW OUTPUT ({} chars) ===\n{}\n=== END OUTPUT ===",
            output.len(),
            output
        );
        Ok(output)
    }
}

impl StoryModel for OpenAiClient {
    fn generate(&self, system_prompt: &str, theme: &str) -> Result<StoryLlmResponse, LlmError> {
        let raw = self.complete(&story_messages(system_prompt, theme))?;
        parse_story_response(&raw)
    }
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

static RE_THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("valid regex"));
static RE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?").expect("valid regex"));

/// Pull the story document out of a raw completion.
pub fn parse_story_response(raw: &str) -> Result<StoryLlmResponse, LlmError> {
    for cap in RE_THINK.captures_iter(raw) {
        let thought = cap.get(1).map_or("", |m| m.as_str()).trim();
        if !thought.is_empty() {
            debug!("Model thinking:\n{thought}");
        }
    }

    let cleaned = RE_THINK.replace_all(raw, "");
    let cleaned = RE_FENCE.replace_all(&cleaned, "");

    // Try each opening brace in turn and decode exactly one value from there,
    // so braces in surrounding chatter cannot swallow the document.
    let mut last_err = None;
    for (start, _) in cleaned.match_indices('{') {
        let mut values =
            serde_json::Deserializer::from_str(&cleaned[start..]).into_iter::<StoryLlmResponse>();
        match values.next() {
            Some(Ok(doc)) => {
                debug!("Decoded story document at offset {start}");
                return Ok(doc);
            }
            Some(Err(e)) => {
                trace!("No story document at offset {start}: {e}");
                last_err.get_or_insert(e);
            }
            None => {}
        }
    }

    match last_err {
        Some(e) => Err(LlmError::Decode(e)),
        None => Err(LlmError::NoJson(raw.to_string())),
    }
}
