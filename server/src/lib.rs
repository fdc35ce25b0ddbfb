//! HTTP and WebSocket front end for speaking sessions.
//!
//! `POST /speak` runs a session to completion and returns the reply with all
//! of its audio. `GET /speak/ws` streams tokens and audio chunks as they are
//! produced; closing the socket cancels the session.

pub mod config;
pub mod error;
pub mod handlers;
pub mod validation;
pub mod ws;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use llm_core::TokenProducer;
use stream_core::{Coordinator, ModelHandle, SessionConfig};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tts_core::Synthesizer;

use crate::config::ServerConfig;
use crate::error::ApiError;

pub type SpeechCoordinator = Coordinator<dyn TokenProducer, dyn Synthesizer>;

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<ModelHandle<dyn TokenProducer>>,
    pub tts: Arc<ModelHandle<dyn Synthesizer>>,
    pub session: SessionConfig,
    pub config: ServerConfig,
}

impl AppState {
    /// State with both models already loaded.
    pub fn new(
        llm: Arc<dyn TokenProducer>,
        tts: Arc<dyn Synthesizer>,
        session: SessionConfig,
        config: ServerConfig,
    ) -> Self {
        Self {
            llm: Arc::new(ModelHandle::loaded("LLM", llm)),
            tts: Arc::new(ModelHandle::loaded("TTS model", tts)),
            session,
            config,
        }
    }

    pub fn synthesizer(&self) -> Result<Arc<dyn Synthesizer>, ApiError> {
        self.tts.require().map_err(|e| ApiError::NotReady(e.to_string()))
    }

    pub fn coordinator(&self) -> Result<SpeechCoordinator, ApiError> {
        let producer = self.llm.require().map_err(|e| ApiError::NotReady(e.to_string()))?;
        let synth = self.synthesizer()?;
        Ok(Coordinator::new(producer, synth, self.session.clone()))
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set or empty, allowing all origins (development mode)");
        AllowOrigin::from(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(Any)
        .allow_credentials(false)
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Routes are served both at the root and under `/api`.
pub fn build_router(state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors_layer(&state.config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/voices", get(handlers::list_voices))
        .route("/speak", post(handlers::speak_endpoint))
        .route("/speak/ws", get(ws::speak_ws));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state)
}
