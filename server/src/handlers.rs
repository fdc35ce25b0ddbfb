use axum::{extract::State, Json};
use llm_core::ChatMessage;
use serde::{Deserialize, Serialize};
use stream_core::CancellationToken;
use tracing::info;
use tts_core::{default_voice_for_language, AudioChunk};

use crate::error::ApiError;
use crate::validation::{validate_messages, validate_voice_available};
use crate::{AppState, SpeechCoordinator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub voice: Option<String>,
    /// UI language, e.g. `zh-CN`; picks the voice when `voice` is absent.
    #[serde(default)]
    pub language: Option<String>,
}

/// One synthesized segment, as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakChunk {
    pub index: usize,
    pub text: Option<String>,
    pub audio_base64: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

impl SpeakChunk {
    pub fn encode(index: usize, chunk: &AudioChunk) -> anyhow::Result<Self> {
        Ok(Self {
            index,
            text: chunk.text.clone(),
            audio_base64: chunk.to_wav_base64()?,
            sample_rate: chunk.sample_rate,
            duration_ms: chunk.duration_ms(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakResponse {
    pub reply: String,
    pub voice: String,
    pub segments: usize,
    pub chunks: Vec<SpeakChunk>,
    pub duration_ms: u64,
    pub elapsed_ms: u64,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_voices(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let synth = state.synthesizer()?;
    Ok(Json(synth.list_voices()))
}

/// Validate a request and pick its voice.
pub fn prepare_session(
    state: &AppState,
    req: &SpeakRequest,
) -> Result<(SpeechCoordinator, String), ApiError> {
    validate_messages(&req.messages)?;
    let voice = req
        .voice
        .clone()
        .or_else(|| {
            req.language
                .as_deref()
                .map(|lang| default_voice_for_language(lang.trim()).to_string())
        })
        .unwrap_or_else(|| state.session.default_voice.clone());
    let synth = state.synthesizer()?;
    validate_voice_available(&voice, &synth.list_voices())?;
    Ok((state.coordinator()?, voice))
}

pub async fn speak_endpoint(
    State(state): State<AppState>,
    Json(req): Json<SpeakRequest>,
) -> Result<Json<SpeakResponse>, ApiError> {
    let (coordinator, voice) = prepare_session(&state, &req)?;
    info!(
        "Speak request received: messages={}, voice={}",
        req.messages.len(),
        voice
    );

    let mut chunks = Vec::new();
    let report = coordinator
        .run(
            &req.messages,
            Some(&voice),
            |_: &str| {},
            |chunk: AudioChunk| -> anyhow::Result<()> {
                let index = chunks.len();
                chunks.push(SpeakChunk::encode(index, &chunk)?);
                Ok(())
            },
            CancellationToken::new(),
        )
        .await?;

    info!(
        "Speak request done in {:.2}s, reply length={}, chunks={}",
        report.elapsed.as_secs_f64(),
        report.text.len(),
        chunks.len()
    );

    Ok(Json(SpeakResponse {
        reply: report.text,
        voice,
        segments: report.segments,
        chunks,
        duration_ms: report.audio_ms,
        elapsed_ms: report.elapsed.as_millis() as u64,
    }))
}
