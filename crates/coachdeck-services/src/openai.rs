//! Chat-completions text generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use coachdeck::collaborators::{GenerationParams, TextGenerator};
use coachdeck::config::GenerationConfig;
use coachdeck_api::{ApiError, Result};

use crate::http::{self, Upstream};

const UPSTREAM: Upstream = Upstream::Collaborator("generation");

pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    default_model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ApiError::invalid_input("generation.api_key is not configured"))?;
        Ok(Self {
            client: http::build_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: config.model.clone(),
        })
    }
}

fn chat_request<'a>(
    prompt: &'a str,
    params: &'a GenerationParams,
    default_model: &'a str,
) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = params.system.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: prompt,
    });
    ChatRequest {
        model: params.model.as_deref().unwrap_or(default_model),
        messages,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
    }
}

/// First choice's text. A response without one is a collaborator failure.
pub fn parse_completion(body: &str) -> Result<String> {
    let response: ChatResponse = http::parse_json(body, "chat/completions", UPSTREAM)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| UPSTREAM.error("Completion returned no text"))
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    #[tracing::instrument(name = "provider.openai.complete", skip(self, prompt, params))]
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_url);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&chat_request(prompt, params, &self.default_model));

        let body = http::send(request, &url, "generate text", UPSTREAM).await?;
        let text = parse_completion(&body)?;
        debug!("[OpenAiGenerator] Generated {} chars", text.len());
        Ok(text)
    }
}
