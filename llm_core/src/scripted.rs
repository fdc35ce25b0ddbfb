use std::time::Duration;

use async_trait::async_trait;

use crate::{ChatMessage, OnToken, TokenProducer};

/// Replays a fixed list of tokens instead of calling a model.
///
/// Useful for tests and for running the pipeline without an LLM. In echo
/// mode the reply is the last user message, split into words.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProducer {
    tokens: Vec<String>,
    echo: bool,
    delay: Option<Duration>,
    fail_after: Option<usize>,
}

impl ScriptedProducer {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Tokenize `text` at word boundaries, keeping the whitespace attached.
    pub fn from_text(text: &str) -> Self {
        Self::new(split_words(text))
    }

    /// Reply with the last user message.
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Sleep before every token.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail once `k` tokens have been delivered.
    pub fn failing_after(mut self, k: usize) -> Self {
        self.fail_after = Some(k);
        self
    }

    fn script(&self, messages: &[ChatMessage]) -> Vec<String> {
        if !self.echo {
            return self.tokens.clone();
        }
        messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| split_words(&m.content))
            .unwrap_or_default()
    }
}

fn split_words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl TokenProducer for ScriptedProducer {
    async fn generate(&self, messages: &[ChatMessage], on_token: OnToken<'_>) -> anyhow::Result<()> {
        for (i, token) in self.script(messages).into_iter().enumerate() {
            if self.fail_after == Some(i) {
                anyhow::bail!("scripted generation failed after {i} tokens");
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            on_token(token);
        }
        if let Some(k) = self.fail_after {
            anyhow::bail!("scripted generation failed after {k} tokens");
        }
        Ok(())
    }
}
