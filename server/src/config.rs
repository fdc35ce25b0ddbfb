// Configuration for the server process

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Whole-request limit; keep it above `LLM_TIMEOUT_SECS`.
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// `openai`, `ollama` or `scripted`.
    pub llm_provider: String,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    /// `tone` or `piper`.
    pub tts_backend: String,
    pub tts_voice_map: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            request_timeout_secs: 180,
            cors_allowed_origins: None,
            llm_provider: "openai".to_string(),
            llm_model: None,
            llm_base_url: None,
            tts_backend: "tone".to_string(),
            tts_voice_map: "models/map.json".to_string(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        Self {
            port,
            request_timeout_secs,
            cors_allowed_origins,
            llm_provider: non_empty_var("LLM_PROVIDER")
                .map(|p| p.to_ascii_lowercase())
                .unwrap_or(defaults.llm_provider),
            llm_model: non_empty_var("LLM_MODEL"),
            llm_base_url: non_empty_var("LLM_BASE_URL"),
            tts_backend: non_empty_var("TTS_BACKEND")
                .map(|b| b.to_ascii_lowercase())
                .unwrap_or(defaults.tts_backend),
            tts_voice_map: non_empty_var("TTS_VOICE_MAP").unwrap_or(defaults.tts_voice_map),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_core::SessionConfig;

    #[test]
    fn request_timeout_outlasts_llm_timeout_by_default() {
        let server = ServerConfig::default();
        let session = SessionConfig::default();
        assert!(server.request_timeout() > session.llm_timeout());
    }
}
