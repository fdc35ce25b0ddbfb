//! WebSocket streaming tests against a real listener

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use llm_core::ScriptedProducer;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use common::*;
use speech_server::ws::StreamFrame;

async fn start_server(producer: ScriptedProducer) -> std::net::SocketAddr {
    let app = create_test_app(producer);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

/// Send one request and collect frames until the server closes the socket.
async fn run_session(addr: std::net::SocketAddr, request: Value) -> Vec<StreamFrame> {
    let (mut ws, _) = connect_async(format!("ws://{addr}/speak/ws")).await.unwrap();
    ws.send(WsMessage::Text(request.to_string())).await.unwrap();

    let mut frames = Vec::new();
    while let Some(msg) = tokio::time::timeout(Duration::from_secs(10), ws.next())
        .await
        .expect("server stalled")
    {
        match msg {
            Ok(WsMessage::Text(text)) => frames.push(serde_json::from_str(&text).unwrap()),
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    frames
}

#[tokio::test]
async fn streams_tokens_then_chunks_then_complete() {
    let addr = start_server(ScriptedProducer::new(["Hello ", "world."])).await;
    let frames = run_session(
        addr,
        json!({ "messages": [{ "role": "user", "content": "Say hello" }] }),
    )
    .await;

    let tokens: Vec<_> = frames
        .iter()
        .filter_map(|f| match f {
            StreamFrame::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["Hello ", "world."]);

    let chunks: Vec<_> = frames
        .iter()
        .filter_map(|f| match f {
            StreamFrame::Chunk(c) => Some((c.index, c.text.clone().unwrap())),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![(0, "Hello ".to_string()), (1, "world.".to_string())]);

    match frames.last() {
        Some(StreamFrame::Complete {
            reply,
            segments,
            chunks,
            ..
        }) => {
            assert_eq!(reply, "Hello world.");
            assert_eq!(*segments, 2);
            assert_eq!(*chunks, 2);
        }
        other => panic!("expected complete frame, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_request_gets_error_frame() {
    let addr = start_server(ScriptedProducer::echo()).await;
    let frames = run_session(addr, json!({ "messages": [] })).await;
    assert_eq!(frames.len(), 1);
    assert!(matches!(&frames[0], StreamFrame::Error { code: 400, .. }));
}

#[tokio::test]
async fn generation_failure_after_partial_output() {
    let addr = start_server(ScriptedProducer::new(["a ", "b ", "c"]).failing_after(2)).await;
    let frames = run_session(
        addr,
        json!({ "messages": [{ "role": "user", "content": "go" }] }),
    )
    .await;

    let chunk_count = frames
        .iter()
        .filter(|f| matches!(f, StreamFrame::Chunk(_)))
        .count();
    assert_eq!(chunk_count, 2);
    assert!(matches!(frames.last(), Some(StreamFrame::Error { code: 502, .. })));
}

#[tokio::test]
async fn closing_the_socket_cancels_the_session() {
    let producer = ScriptedProducer::new(["slow ", "reply"]).with_delay(Duration::from_secs(30));
    let addr = start_server(producer).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/speak/ws")).await.unwrap();
    ws.send(WsMessage::Text(
        json!({ "messages": [{ "role": "user", "content": "hi" }] }).to_string(),
    ))
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    ws.close(None).await.unwrap();

    // the server finishes the session and closes its side promptly
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
    assert!(drained.is_ok(), "server kept the session open after client close");
}
