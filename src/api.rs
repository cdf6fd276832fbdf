use crate::models::{ConversationMessage, ModelConfig, UserContext};
use crate::prompts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Trait defining the interface for text-generation backends
#[async_trait]
pub trait LLMApiProvider: Send + Sync {
    // Sends the system instruction plus full history and returns the assistant's text.
    // `timeout` bounds the whole request and wins over `provider_options.timeout_secs`.
    async fn send_conversation(
        &self,
        config: &ModelConfig,
        api_key: Option<&str>,
        messages: &[ConversationMessage],
        context: Option<&UserContext>,
        timeout: Duration,
    ) -> Result<String>;
}

/// Provider-specific settings stored as JSON in `ModelConfig::provider_options`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProviderOptions {
    #[serde(default = "ProviderOptions::default_model")]
    pub model: String,
    #[serde(default = "ProviderOptions::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "ProviderOptions::default_temperature")]
    pub temperature: f32,
    #[serde(default = "ProviderOptions::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderOptions {
    fn default_model() -> String {
        "gpt-3.5-turbo".to_string()
    }

    fn default_max_tokens() -> u32 {
        600
    }

    fn default_temperature() -> f32 {
        0.7
    }

    fn default_timeout_secs() -> u64 {
        60
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let options_json = config.provider_options.as_deref().unwrap_or("{}");
        serde_json::from_str(options_json).context("Failed to parse provider_options JSON")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            max_tokens: Self::default_max_tokens(),
            temperature: Self::default_temperature(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

// --- OpenAI Compatible Provider Implementation ---

#[derive(Serialize, Debug)]
struct OpenAIRequestBody {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize, Debug)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

pub struct OpenAICompatibleProvider {
    client: Client,
}

impl OpenAICompatibleProvider {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for OpenAICompatibleProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn request_messages(
    messages: &[ConversationMessage],
    context: Option<&UserContext>,
) -> Vec<OpenAIMessage> {
    let system = OpenAIMessage {
        role: "system".to_string(),
        content: prompts::system_prompt(context),
    };
    std::iter::once(system)
        .chain(messages.iter().map(|msg| OpenAIMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }))
        .collect()
}

#[async_trait]
impl LLMApiProvider for OpenAICompatibleProvider {
    async fn send_conversation(
        &self,
        config: &ModelConfig,
        api_key: Option<&str>,
        messages: &[ConversationMessage],
        context: Option<&UserContext>,
        timeout: Duration,
    ) -> Result<String> {
        let options = ProviderOptions::from_config(config)?;
        log::info!(
            "Sending request to OpenAI compatible API: {} using model: {} (timeout {:?})",
            config.api_url,
            options.model,
            timeout
        );

        let request_body = OpenAIRequestBody {
            model: options.model.clone(),
            messages: request_messages(messages, context),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let request_url = format!("{}/chat/completions", config.api_url.trim_end_matches('/'));

        let mut request = self
            .client
            .post(&request_url)
            .timeout(timeout)
            .json(&request_body);
        // A same-origin proxy holds the credential itself.
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send request to chat completion API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "<Failed to read error body>".to_string());
            log::error!("Chat completion request failed with status {}: {}", status, error_body);
            return Err(anyhow::anyhow!(
                "API request failed with status {}: {}",
                status,
                error_body
            ));
        }

        let body: OpenAIResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("Chat completion response contained no choices")
    }
}
