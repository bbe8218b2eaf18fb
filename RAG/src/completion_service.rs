//! Completion gateways: ordered messages in, answer plus token usage out.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{AzureOpenAiConfig, GeminiConfig};
use crate::error::{RagError, Result};
use crate::http_client::ensure_success;
use crate::models::*;

const SERVICE: &str = "completion";

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<Completion>;
}

pub struct AzureOpenAiChat {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    n: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

impl AzureOpenAiChat {
    pub fn new(client: Client, config: &AzureOpenAiConfig) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            config.endpoint.trim_end_matches('/'),
            config.deployment,
            config.api_version
        );
        Self {
            client,
            url,
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl CompletionGateway for AzureOpenAiChat {
    async fn complete(&self, messages: &[Message]) -> Result<Completion> {
        let request = ChatRequest {
            messages,
            max_tokens: 500,
            temperature: 0.7,
            top_p: 0.95,
            n: 1,
        };

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        let body: ChatResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        let token_usage = body.usage.map(|u| u.total_tokens).unwrap_or_default();
        log::info!("Total tokens: {}", token_usage);

        let answer = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::upstream(SERVICE, "response contained no answer"))?;

        Ok(Completion {
            answer,
            token_usage,
        })
    }
}

pub struct GeminiChat {
    client: Client,
    url: String,
}

impl GeminiChat {
    pub fn new(client: Client, config: &GeminiConfig) -> Self {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            config.model, config.api_key
        );
        Self { client, url }
    }
}

/// Maps chat messages onto Gemini's request shape.
///
/// Gemini has no system role inside `contents` and wants the conversation to
/// end on a user turn. Every system message but the last becomes the system
/// instruction; the last one (the retrieved context naming the question) is
/// sent as the closing user turn after the history.
pub(crate) fn gemini_request(messages: &[Message]) -> GeminiRequest {
    let system: Vec<&Message> = messages.iter().filter(|m| m.role == Role::System).collect();
    let (instruction, closing) = match system.split_last() {
        Some((last, rest)) => (rest.to_vec(), Some(*last)),
        None => (Vec::new(), None),
    };

    let mut contents: Vec<GeminiContent> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| gemini_content(m.role, &m.content))
        .collect();
    if let Some(closing) = closing {
        contents.push(gemini_content(Role::User, &closing.content));
    }

    let system_instruction = (!instruction.is_empty()).then(|| GeminiContent {
        role: None,
        parts: instruction
            .iter()
            .map(|m| GeminiPart {
                text: m.content.clone(),
            })
            .collect(),
    });

    GeminiRequest {
        system_instruction,
        contents,
        generation_config: Some(GeminiGenerationConfig {
            temperature: 0.3,
            max_output_tokens: 1000,
        }),
    }
}

fn gemini_content(role: Role, text: &str) -> GeminiContent {
    let role = match role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    };
    GeminiContent {
        role: Some(role.to_string()),
        parts: vec![GeminiPart {
            text: text.to_string(),
        }],
    }
}

#[async_trait]
impl CompletionGateway for GeminiChat {
    async fn complete(&self, messages: &[Message]) -> Result<Completion> {
        let request = gemini_request(messages);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        let gemini_response: GeminiResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        let token_usage = gemini_response
            .usage_metadata
            .map(|u| u.total_token_count)
            .unwrap_or_default();
        log::info!("Total tokens: {}", token_usage);

        let answer = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| RagError::upstream(SERVICE, "no response generated"))?;

        Ok(Completion {
            answer,
            token_usage,
        })
    }
}
