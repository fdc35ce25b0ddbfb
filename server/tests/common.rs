//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use llm_core::{ScriptedProducer, TokenProducer};
use serde_json::Value;
use stream_core::{SegmentPolicy, SessionConfig};
use tower::ServiceExt;
use tts_core::ToneSynthesizer;

use speech_server::config::ServerConfig;
use speech_server::{build_router, AppState};

/// State that speaks every token as its own segment.
pub fn test_state(producer: impl TokenProducer + 'static) -> AppState {
    test_state_with(
        producer,
        SessionConfig {
            segment_policy: SegmentPolicy::PerToken,
            ..SessionConfig::default()
        },
    )
}

pub fn test_state_with(producer: impl TokenProducer + 'static, session: SessionConfig) -> AppState {
    AppState::new(
        Arc::new(producer),
        Arc::new(ToneSynthesizer::default()),
        session,
        ServerConfig::default(),
    )
}

/// Router backed by a scripted producer and the tone synthesizer
pub fn create_test_app(producer: impl TokenProducer + 'static) -> Router {
    build_router(test_state(producer))
}

/// Router whose producer echoes the last user message
pub fn create_echo_app() -> Router {
    create_test_app(ScriptedProducer::echo())
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
