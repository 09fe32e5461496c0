use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use crate::error::{KonspektError, Result};
use crate::usage::TokenUsage;

/// One generation response: the message text plus the token counts the
/// provider reported for the call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// The generative-model capability the pipeline stages depend on.
/// Three operations: plain text completion, vision completion over a
/// JPEG frame, and schema-constrained chat completion. Implementations
/// must be usable behind a shared reference across sequential stages.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete_text(&self, system: &str, user: &str) -> Result<Completion>;

    async fn complete_vision(&self, prompt: &str, jpeg: &[u8]) -> Result<Completion>;

    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        schema: Value,
    ) -> Result<Completion>;
}

#[derive(Clone, Debug, Default)]
pub enum Provider {
    #[default]
    Grok,
    Openai,
    Gemini,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-5.1",
                env_var: "OPENAI_API_KEY",
            },
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-3-pro",
                env_var: "GEMINI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Grok => "Grok",
            Provider::Openai => "OpenAI",
            Provider::Gemini => "Gemini",
        }
    }

    pub fn validate_api_key(&self) -> Result<String> {
        let config = self.config();
        std::env::var(config.env_var).map_err(|_| KonspektError::MissingApiKey {
            env_var: config.env_var.to_string(),
        })
    }
}

/// `CompletionClient` over an OpenAI-compatible chat completions
/// endpoint. The API key is validated at construction so a missing
/// credential fails the run before any work starts.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    provider: Provider,
    api_key: String,
}

impl HttpCompletionClient {
    pub fn new(provider: Provider) -> Result<Self> {
        let api_key = provider.validate_api_key()?;
        Ok(Self {
            http: reqwest::Client::new(),
            provider,
            api_key,
        })
    }

    async fn post_chat(&self, mut body: Value) -> Result<Completion> {
        let config = self.provider.config();
        body["model"] = Value::String(config.model.to_string());

        let response = self
            .http
            .post(config.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload = response.text().await?;

        if !status.is_success() {
            return Err(KonspektError::CompletionFailed {
                status: Some(status.as_u16()),
                message: payload.clone(),
                retry_after: parse_retry_after(&payload),
            });
        }

        let parsed: Value = serde_json::from_str(&payload)?;
        let text = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| KonspektError::CompletionFailed {
                status: None,
                message: format!("response has no message content: {payload}"),
                retry_after: None,
            })?
            .to_string();

        let usage = TokenUsage::new(
            parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        );

        Ok(Completion { text, usage })
    }
}

/// Pull a `retry_after` hint (seconds) out of an error payload, when
/// the provider includes one.
fn parse_retry_after(payload: &str) -> Option<u64> {
    let parsed: Value = serde_json::from_str(payload).ok()?;
    parsed["error"]["retry_after"]
        .as_u64()
        .or_else(|| parsed["retry_after"].as_u64())
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete_text(&self, system: &str, user: &str) -> Result<Completion> {
        self.post_chat(serde_json::json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.3,
        }))
        .await
    }

    async fn complete_vision(&self, prompt: &str, jpeg: &[u8]) -> Result<Completion> {
        let data_uri = format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg));
        self.post_chat(serde_json::json!({
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        { "type": "image_url", "image_url": { "url": data_uri } },
                    ],
                },
            ],
            "temperature": 0.0,
        }))
        .await
    }

    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        schema: Value,
    ) -> Result<Completion> {
        self.post_chat(serde_json::json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.2,
            "response_format": {
                "type": "json_schema",
                "json_schema": schema,
            },
        }))
        .await
    }
}
