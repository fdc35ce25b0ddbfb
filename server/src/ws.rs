//! `GET /speak/ws`: one speaking session per socket.
//!
//! The client sends a single JSON [`SpeakRequest`]. The server answers with
//! `token` frames as text is generated, `chunk` frames as audio is ready, and
//! ends with either a `complete` or an `error` frame. If the client goes away
//! the session is cancelled.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{
    stream::{SplitStream, StreamExt},
    SinkExt,
};
use serde::{Deserialize, Serialize};
use stream_core::CancellationToken;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tts_core::AudioChunk;

use crate::error::ApiError;
use crate::handlers::{prepare_session, SpeakChunk, SpeakRequest};
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Token {
        text: String,
    },
    Chunk(SpeakChunk),
    Complete {
        reply: String,
        segments: usize,
        chunks: usize,
        duration_ms: u64,
        elapsed_ms: u64,
    },
    Error {
        error: String,
        code: u16,
    },
}

impl StreamFrame {
    fn error(err: &ApiError) -> Self {
        Self::Error {
            error: err.message(),
            code: err.status().as_u16(),
        }
    }

    fn to_message(&self) -> Message {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","error":"frame encoding failed: {e}","code":500}}"#)
        });
        Message::Text(json.into())
    }
}

pub async fn speak_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn next_request(receiver: &mut SplitStream<WebSocket>) -> Result<SpeakRequest, ApiError> {
    while let Some(msg) = receiver.next().await {
        match msg.map_err(|e| ApiError::InvalidInput(format!("WebSocket error: {e}")))? {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str())
                    .map_err(|e| ApiError::InvalidInput(format!("Invalid request: {e}")));
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(ApiError::InvalidInput(
        "Connection closed before a request was sent".to_string(),
    ))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let prepared = match next_request(&mut receiver).await {
        Ok(request) => prepare_session(&state, &request).map(|p| (request, p)),
        Err(e) => Err(e),
    };
    let (request, (coordinator, voice)) = match prepared {
        Ok(p) => p,
        Err(e) => {
            warn!("Rejected streaming request: {e}");
            let _ = sender.send(StreamFrame::error(&e).to_message()).await;
            let _ = sender.close().await;
            return;
        }
    };
    info!(
        "Streaming session started: messages={}, voice={}",
        request.messages.len(),
        voice
    );

    let cancel = CancellationToken::new();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<StreamFrame>();

    let writer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                if let Err(e) = sender.send(frame.to_message()).await {
                    warn!("Failed to send WS message: {e}");
                    cancel.cancel();
                    break;
                }
            }
            let _ = sender.close().await;
        })
    };

    // anything but a close from the client is ignored once the session runs
    let reader = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                    break;
                }
            }
            debug!("client disconnected; cancelling session");
            cancel.cancel();
        })
    };

    let token_tx = frames_tx.clone();
    let chunk_tx = frames_tx.clone();
    let mut index = 0usize;
    let result = coordinator
        .run(
            &request.messages,
            Some(&voice),
            move |token: &str| {
                let _ = token_tx.send(StreamFrame::Token {
                    text: token.to_string(),
                });
            },
            move |chunk: AudioChunk| -> anyhow::Result<()> {
                let frame = SpeakChunk::encode(index, &chunk)?;
                index += 1;
                chunk_tx
                    .send(StreamFrame::Chunk(frame))
                    .map_err(|_| anyhow::anyhow!("socket writer closed"))
            },
            cancel.clone(),
        )
        .await;

    let last = match result {
        Ok(report) => {
            info!(
                "Streaming session complete in {:.2}s: chunks={}",
                report.elapsed.as_secs_f64(),
                report.chunks
            );
            StreamFrame::Complete {
                reply: report.text,
                segments: report.segments,
                chunks: report.chunks,
                duration_ms: report.audio_ms,
                elapsed_ms: report.elapsed.as_millis() as u64,
            }
        }
        Err(e) => StreamFrame::error(&ApiError::from(e)),
    };
    let _ = frames_tx.send(last);
    drop(frames_tx);

    let _ = writer.await;
    reader.abort();
}
