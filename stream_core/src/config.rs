// Session configuration, read from the environment with defaults

use std::time::Duration;

use crate::SegmentPolicy;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Segments allowed in the channel at once. Later segments wait in the
    /// session until the consumer takes one.
    pub channel_capacity: usize,
    pub segment_policy: SegmentPolicy,
    /// Voice used when a request does not name one.
    pub default_voice: String,
    /// Stop generation as soon as synthesis fails.
    pub cancel_producer_on_consumer_failure: bool,
    pub llm_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            segment_policy: SegmentPolicy::Sentence { max_chars: 200 },
            default_voice: "af_maple".to_string(),
            cancel_producer_on_consumer_failure: true,
            llm_timeout_secs: 120,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let channel_capacity = std::env::var("STREAM_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&c: &usize| c > 0)
            .unwrap_or(defaults.channel_capacity);

        let max_chars = std::env::var("STREAM_MAX_SEGMENT_CHARS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(200);

        let segment_policy = std::env::var("STREAM_SEGMENT_POLICY")
            .ok()
            .and_then(|v| SegmentPolicy::parse(&v, max_chars))
            .unwrap_or(defaults.segment_policy);

        let default_voice = std::env::var("STREAM_DEFAULT_VOICE")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_voice);

        let cancel_producer_on_consumer_failure = std::env::var("STREAM_CANCEL_ON_CONSUMER_FAILURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cancel_producer_on_consumer_failure);

        let llm_timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.llm_timeout_secs);

        Self {
            channel_capacity,
            segment_policy,
            default_voice,
            cancel_producer_on_consumer_failure,
            llm_timeout_secs,
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}
