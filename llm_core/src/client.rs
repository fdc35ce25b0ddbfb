use std::env;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, MessageRole},
    models::ModelOptions,
    Ollama,
};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, trace};

use crate::framing::{decode_openai_line, LineFramer};
use crate::{ChatMessage, GenerationOptions, OnToken, TokenProducer};

/// Which wire protocol the chat endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl LlmProvider {
    /// Parse a provider name as used in `LLM_PROVIDER`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

/// Request body for the OpenAI chat completions API
#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

fn ollama_message(msg: &ChatMessage) -> ollama_rs::generation::chat::ChatMessage {
    let role = match msg.role.as_str() {
        "system" => MessageRole::System,
        "assistant" => MessageRole::Assistant,
        _ => MessageRole::User,
    };
    ollama_rs::generation::chat::ChatMessage::new(role, msg.content.clone())
}

/// Streaming chat client for OpenAI-compatible and Ollama servers.
///
/// OpenAI-compatible endpoints are read as Server-Sent Events over
/// `reqwest`; Ollama goes through `ollama-rs`.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    model: String,
    base_url: String,
    api_key: Option<String>,
    options: GenerationOptions,
    client: Client,
}

impl LlmClient {
    /// Create a new client. The OpenAI API key is read from `OPENAI_API_KEY`
    /// when set; local OpenAI-compatible servers work without one.
    pub fn new(provider: LlmProvider, model: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        let api_key = match provider {
            LlmProvider::OpenAI => env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            LlmProvider::Ollama => None,
        };
        Ok(Self {
            provider,
            model: model.to_string(),
            base_url: provider.default_base_url().to_string(),
            api_key,
            options: GenerationOptions::default(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn temperature(&self) -> f32 {
        if self.options.do_sample {
            0.7
        } else {
            0.0
        }
    }

    async fn generate_openai(&self, messages: &[ChatMessage], on_token: OnToken<'_>) -> anyhow::Result<()> {
        let req = self.client.post(self.endpoint()).json(&OpenAiRequest {
            model: &self.model,
            messages,
            max_tokens: self.options.max_new_tokens,
            temperature: self.temperature(),
            stream: true,
        });
        let req = match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        };

        let response = req
            .send()
            .await
            .with_context(|| format!("failed to reach LLM endpoint {}", self.endpoint()))?
            .error_for_status()?; // convert non-200 into error

        let mut body = response.bytes_stream();
        let mut framer = LineFramer::default();
        let mut tokens = 0usize;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("LLM response stream interrupted")?;
            for line in framer.push(&chunk) {
                let decoded = decode_openai_line(&line)?;
                if let Some(token) = decoded.token.filter(|t| !t.is_empty()) {
                    trace!(%token, "llm token");
                    tokens += 1;
                    on_token(token);
                }
                if decoded.done {
                    debug!(tokens, "generation finished");
                    return Ok(());
                }
            }
        }

        if let Some(line) = framer.finish() {
            if let Some(token) = decode_openai_line(&line)?.token.filter(|t| !t.is_empty()) {
                tokens += 1;
                on_token(token);
            }
        }
        debug!(tokens, "generation stream ended");
        Ok(())
    }

    async fn generate_ollama(&self, messages: &[ChatMessage], on_token: OnToken<'_>) -> anyhow::Result<()> {
        let ollama = Ollama::try_new(self.base_url.as_str())
            .with_context(|| format!("invalid Ollama base URL {}", self.base_url))?;
        let req = ChatMessageRequest::new(self.model.clone(), messages.iter().map(ollama_message).collect())
            .options(
                ModelOptions::default()
                    .temperature(self.temperature())
                    .num_predict(self.options.max_new_tokens as i32),
            );

        let mut stream = ollama
            .send_chat_messages_stream(req)
            .await
            .with_context(|| format!("failed to reach Ollama at {}", self.base_url))?;
        let mut tokens = 0usize;

        while let Some(resp) = stream.next().await {
            let resp = resp.map_err(|e| anyhow::anyhow!("Ollama stream error: {e:?}"))?;
            let token = resp.message.content;
            if !token.is_empty() {
                trace!(%token, "llm token");
                tokens += 1;
                on_token(token);
            }
            if resp.done {
                break;
            }
        }
        debug!(tokens, "generation finished");
        Ok(())
    }
}

#[async_trait]
impl TokenProducer for LlmClient {
    async fn generate(&self, messages: &[ChatMessage], on_token: OnToken<'_>) -> anyhow::Result<()> {
        debug!(provider = ?self.provider, model = %self.model, messages = messages.len(), "starting generation");
        match self.provider {
            LlmProvider::OpenAI => self.generate_openai(messages, on_token).await,
            LlmProvider::Ollama => self.generate_ollama(messages, on_token).await,
        }
    }
}
