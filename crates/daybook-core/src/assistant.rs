use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;

const API_KEY_ENV_VAR: &str = "DAYBOOK_API_KEY";
const SYSTEM_PROMPT: &str = "You are a terse planning assistant inside a \
personal productivity dashboard. Answer with concrete, actionable steps.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// One-shot chat completion against the configured endpoint. This is
/// the only network path in the crate; every failure mode (missing key,
/// HTTP error, empty reply) is an explicit error value and nothing in
/// the derivation engine depends on it.
#[tracing::instrument(skip(cfg, messages))]
pub fn complete(cfg: &Config, messages: Vec<ChatMessage>) -> anyhow::Result<String> {
    let api_key = std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("{API_KEY_ENV_VAR} is not set"))?;

    let mut payload = vec![ChatMessage::system(SYSTEM_PROMPT)];
    payload.extend(messages);

    info!(
        endpoint = %cfg.assistant.endpoint,
        model = %cfg.assistant.model,
        messages = payload.len(),
        "requesting chat completion"
    );

    let client = reqwest::blocking::Client::new();
    let response = client
        .post(&cfg.assistant.endpoint)
        .bearer_auth(api_key)
        .json(&ChatRequest {
            model: &cfg.assistant.model,
            messages: payload,
        })
        .send()
        .context("chat completion request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(anyhow!(
            "chat completion returned {status}: {}",
            body.chars().take(200).collect::<String>()
        ));
    }

    let parsed: ChatResponse = response
        .json()
        .context("failed to decode chat completion response")?;

    debug!(choices = parsed.choices.len(), "completion received");

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow!("chat completion had no content"))
}
