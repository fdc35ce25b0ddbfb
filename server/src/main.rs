use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use llm_core::{LlmClient, LlmProvider, ScriptedProducer, TokenProducer};
use stream_core::SessionConfig;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tts_core::{Synthesizer, ToneSynthesizer};

use speech_server::config::ServerConfig;
use speech_server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

fn build_producer(config: &ServerConfig) -> anyhow::Result<Arc<dyn TokenProducer>> {
    if config.llm_provider == "scripted" {
        info!("LLM_PROVIDER=scripted, replies echo the last user message");
        return Ok(Arc::new(ScriptedProducer::echo()));
    }

    let provider = LlmProvider::parse(&config.llm_provider).unwrap_or_else(|| {
        warn!("Unknown LLM_PROVIDER '{}', using openai", config.llm_provider);
        LlmProvider::OpenAI
    });
    let model = config.llm_model.clone().unwrap_or_else(|| match provider {
        LlmProvider::OpenAI => "gpt-3.5-turbo".into(),
        LlmProvider::Ollama => "llama2".into(),
    });
    let mut client = LlmClient::new(provider, &model)?;
    if let Some(url) = &config.llm_base_url {
        client = client.with_base_url(url.clone());
    }
    info!("LLM provider={:?}, model={}", provider, model);
    Ok(Arc::new(client))
}

fn build_synthesizer(config: &ServerConfig) -> anyhow::Result<Arc<dyn Synthesizer>> {
    match config.tts_backend.as_str() {
        "piper" => {
            #[cfg(feature = "piper")]
            {
                let voices = tts_core::VoiceMap::from_file(&config.tts_voice_map)?;
                info!("Loaded {} Piper voices from {}", voices.list_voices().len(), config.tts_voice_map);
                Ok(Arc::new(tts_core::PiperSynthesizer::new(voices)))
            }
            #[cfg(not(feature = "piper"))]
            {
                anyhow::bail!("TTS_BACKEND=piper requires building with `--features piper`")
            }
        }
        "tone" => Ok(Arc::new(ToneSynthesizer::default())),
        other => anyhow::bail!("Unknown TTS_BACKEND '{other}'. Expected tone or piper"),
    }
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting speech server...");

    let config = ServerConfig::from_env();
    let session = SessionConfig::from_env();

    let state = AppState {
        llm: Arc::new(stream_core::ModelHandle::new("LLM")),
        tts: Arc::new(stream_core::ModelHandle::new("TTS model")),
        session: session.clone(),
        config: config.clone(),
    };
    state.llm.load(|| async { build_producer(&config) }).await?;
    let synth = state.tts.load(|| async { build_synthesizer(&config) }).await?;
    info!("Loaded {} TTS voices", synth.list_voices().len());

    info!(
        "Server configuration loaded: port={}, llm_timeout={}s, channel_capacity={}, segments={:?}",
        config.port, session.llm_timeout_secs, session.channel_capacity, session.segment_policy
    );

    if config.request_timeout() <= session.llm_timeout() {
        warn!(
            "REQUEST_TIMEOUT_SECS={} does not exceed LLM_TIMEOUT_SECS={}; slow generations will be cut off before they can report a timeout",
            config.request_timeout_secs, session.llm_timeout_secs
        );
    }

    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}. Try a different PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
