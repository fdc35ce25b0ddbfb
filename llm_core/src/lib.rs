//! Token producers: everything that turns a conversation into a sequence of
//! text fragments.
//!
//! The [`TokenProducer`] trait is the only thing the streaming coordinator
//! knows about generation. [`LlmClient`] streams from an HTTP chat endpoint,
//! [`ScriptedProducer`] replays a fixed script.

mod client;
mod fetch;
mod framing;
mod scripted;
mod typewriter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{LlmClient, LlmProvider};
pub use fetch::fetch_text_stream;
pub use scripted::ScriptedProducer;
pub use typewriter::typewriter;

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Decoding options sent along with every generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_new_tokens: u32,
    /// `false` means greedy decoding (temperature 0).
    pub do_sample: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 1024,
            do_sample: false,
        }
    }
}

/// Callback invoked once per generated token, in generation order.
pub type OnToken<'a> = &'a mut (dyn FnMut(String) + Send);

/// Anything that can generate a reply token by token.
///
/// Implementations call `on_token` zero or more times, in order, and then
/// resolve. An `Err` means generation failed; tokens already delivered stay
/// delivered.
#[async_trait]
pub trait TokenProducer: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage], on_token: OnToken<'_>) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: TokenProducer + ?Sized> TokenProducer for std::sync::Arc<T> {
    async fn generate(&self, messages: &[ChatMessage], on_token: OnToken<'_>) -> anyhow::Result<()> {
        (**self).generate(messages, on_token).await
    }
}

/// Collect a whole reply into a `String`.
pub async fn generate_to_string<P: TokenProducer + ?Sized>(
    producer: &P,
    messages: &[ChatMessage],
) -> anyhow::Result<String> {
    let mut out = String::new();
    producer
        .generate(messages, &mut |token: String| out.push_str(&token))
        .await?;
    tracing::debug!(len = out.len(), "llm full response");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_to_string_concatenates_in_order() {
        let producer = ScriptedProducer::new(["Hello", " ", "world", "."]);
        let text = generate_to_string(&producer, &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(text, "Hello world.");
    }

    #[test]
    fn default_options_are_greedy() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.max_new_tokens, 1024);
        assert!(!opts.do_sample);
    }
}
