//! Speaking sessions: one generation piped into one synthesis.
//!
//! [`Coordinator::run`] opens a segment channel, feeds it from a
//! [`TokenProducer`] and drains it through [`tts_core::speak`] into an
//! [`AudioSink`]. Both halves are polled by the calling task and the session
//! returns only once both have finished. The channel is closed exactly once
//! when generation ends, whether it succeeded, failed, timed out or was
//! cancelled.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures::StreamExt;
use llm_core::{ChatMessage, TokenProducer};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tts_core::{AudioChunk, Synthesizer};

use crate::{
    channel::{self, SegmentReceiver, SegmentSender},
    CoordinatorError, SessionConfig, Segmenter,
};

/// Receives synthesized chunks in order. An error ends the session.
pub trait AudioSink: Send {
    fn accept(&mut self, chunk: AudioChunk) -> anyhow::Result<()>;
}

impl<F> AudioSink for F
where
    F: FnMut(AudioChunk) -> anyhow::Result<()> + Send,
{
    fn accept(&mut self, chunk: AudioChunk) -> anyhow::Result<()> {
        self(chunk)
    }
}

/// What the consumer half delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub chunks: usize,
    pub audio_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Full generated reply.
    pub text: String,
    /// Segments pushed into the channel.
    pub segments: usize,
    pub chunks: usize,
    pub audio_ms: u64,
    pub elapsed: Duration,
}

/// Pairs a token producer with a synthesizer.
pub struct Coordinator<P: ?Sized, S: ?Sized> {
    producer: Arc<P>,
    synth: Arc<S>,
    config: SessionConfig,
}

impl<P: ?Sized, S: ?Sized> Clone for Coordinator<P, S> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            synth: Arc::clone(&self.synth),
            config: self.config.clone(),
        }
    }
}

impl<P, S> Coordinator<P, S>
where
    P: TokenProducer + ?Sized,
    S: Synthesizer + ?Sized + 'static,
{
    pub fn new(producer: Arc<P>, synth: Arc<S>, config: SessionConfig) -> Self {
        Self {
            producer,
            synth,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn voice_or_default(&self, voice: Option<&str>) -> String {
        voice
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.config.default_voice)
            .to_string()
    }

    /// Open a channel and start a consumer task speaking into `sink`.
    ///
    /// The caller owns the producer side: push segments, then close the
    /// sender (dropping it also closes). The task resolves once the channel
    /// is closed and drained, the sink or synthesizer fails, or `cancel`
    /// fires.
    pub fn open_speech<K>(
        &self,
        voice: Option<&str>,
        sink: K,
        cancel: CancellationToken,
    ) -> (SegmentSender, JoinHandle<Result<ConsumerStats, CoordinatorError>>)
    where
        K: AudioSink + 'static,
    {
        let (tx, rx) = channel::open(self.config.channel_capacity);
        let synth = Arc::clone(&self.synth);
        let voice = self.voice_or_default(voice);
        let task = tokio::spawn(async move {
            let (outcome, stats) = drain_into_sink(synth, rx, voice, sink, &cancel).await;
            outcome.map(|()| stats)
        });
        (tx, task)
    }

    /// Generate a reply to `messages` and speak it.
    ///
    /// `on_token` sees every generated token as it arrives; `sink` receives
    /// audio in segment order. Returns once generation and synthesis have
    /// both finished.
    ///
    /// If generation fails, the segments already produced are still spoken
    /// and then the generation error is returned. If synthesis fails,
    /// generation is cancelled too unless the session config says otherwise.
    pub async fn run<T, K>(
        &self,
        messages: &[ChatMessage],
        voice: Option<&str>,
        on_token: T,
        sink: K,
        cancel: CancellationToken,
    ) -> Result<SessionReport, CoordinatorError>
    where
        T: FnMut(&str) + Send,
        K: AudioSink,
    {
        let channel = channel::open(self.config.channel_capacity);
        self.run_on(channel, messages, voice, on_token, sink, cancel).await
    }

    async fn run_on<T, K>(
        &self,
        (tx, rx): (SegmentSender, SegmentReceiver),
        messages: &[ChatMessage],
        voice: Option<&str>,
        mut on_token: T,
        sink: K,
        cancel: CancellationToken,
    ) -> Result<SessionReport, CoordinatorError>
    where
        T: FnMut(&str) + Send,
        K: AudioSink,
    {
        let started = Instant::now();
        let voice = self.voice_or_default(voice);
        let producer_cancel = cancel.child_token();
        let llm_timeout = self.config.llm_timeout();
        let policy = self.config.segment_policy;
        let cancel_producer_on_failure = self.config.cancel_producer_on_consumer_failure;

        info!(
            messages = messages.len(),
            voice = %voice,
            capacity = self.config.channel_capacity,
            ?policy,
            "speaking session started"
        );

        let generating = {
            let producer_cancel = producer_cancel.clone();
            async move {
                let mut segmenter = Segmenter::new(policy);
                let mut reply = String::new();
                // segments wait here while the channel is full
                let (staged_tx, mut staged_rx) = mpsc::unbounded_channel::<String>();

                let produce = async {
                    let result = {
                        let mut forward = |token: String| {
                            on_token(&token);
                            reply.push_str(&token);
                            for segment in segmenter.push(&token) {
                                let _ = staged_tx.send(segment);
                            }
                        };
                        let generate = self.producer.generate(messages, &mut forward);
                        tokio::select! {
                            biased;
                            _ = producer_cancel.cancelled() => Err(CoordinatorError::Cancelled),
                            r = tokio::time::timeout(llm_timeout, generate) => match r {
                                Ok(Ok(())) => Ok(()),
                                Ok(Err(e)) => Err(CoordinatorError::Producer(e)),
                                Err(_) => Err(CoordinatorError::Timeout(llm_timeout)),
                            },
                        }
                    };
                    if result.is_ok() {
                        if let Some(rest) = segmenter.finish() {
                            let _ = staged_tx.send(rest);
                        }
                    }
                    drop(staged_tx);
                    result
                };

                let tx = &tx;
                let feed = async move {
                    while let Some(segment) = staged_rx.recv().await {
                        if !tx.send(segment).await {
                            break;
                        }
                    }
                };

                let (result, ()) = tokio::join!(produce, feed);
                tx.close();
                let pushed = tx.pushed();
                if let Err(e) = &result {
                    warn!(error = %e, pushed, "generation ended early");
                }
                (result, reply, pushed)
            }
        };

        let speaking = {
            let synth = Arc::clone(&self.synth);
            let cancel = cancel.clone();
            async move {
                let (outcome, stats) = drain_into_sink(synth, rx, voice, sink, &cancel).await;
                if let Err(e) = &outcome {
                    if e.is_consumer_failure() && cancel_producer_on_failure {
                        debug!("synthesis failed; cancelling generation");
                        producer_cancel.cancel();
                    }
                }
                (outcome, stats)
            }
        };

        let ((produced, text, segments), (consumed, stats)) = tokio::join!(generating, speaking);

        let result = match (produced, consumed) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(p), Ok(())) => Err(p),
            (Ok(()), Err(c)) => Err(c),
            // generation was stopped because synthesis failed
            (Err(CoordinatorError::Cancelled), Err(c)) if !cancel.is_cancelled() => Err(c),
            (Err(CoordinatorError::Cancelled), Err(CoordinatorError::Cancelled)) => {
                Err(CoordinatorError::Cancelled)
            }
            (Err(p), Err(c)) => Err(CoordinatorError::Both {
                producer: Box::new(p),
                consumer: Box::new(c),
            }),
        };

        let elapsed = started.elapsed();
        match result {
            Ok(()) => {
                info!(
                    segments,
                    chunks = stats.chunks,
                    audio_ms = stats.audio_ms,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "speaking session complete"
                );
                Ok(SessionReport {
                    text,
                    segments,
                    chunks: stats.chunks,
                    audio_ms: stats.audio_ms,
                    elapsed,
                })
            }
            Err(e) => {
                warn!(error = %e, segments, chunks = stats.chunks, "speaking session failed");
                Err(e)
            }
        }
    }
}

async fn drain_into_sink<S, K>(
    synth: Arc<S>,
    rx: SegmentReceiver,
    voice: String,
    mut sink: K,
    cancel: &CancellationToken,
) -> (Result<(), CoordinatorError>, ConsumerStats)
where
    S: Synthesizer + ?Sized + 'static,
    K: AudioSink,
{
    let mut chunks = Box::pin(tts_core::speak(synth, rx, voice));
    let mut stats = ConsumerStats::default();
    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Err(CoordinatorError::Cancelled),
            next = chunks.next() => next,
        };
        match next {
            None => break Ok(()),
            Some(Ok(chunk)) => {
                stats.chunks += 1;
                stats.audio_ms += chunk.duration_ms();
                if let Err(e) = sink.accept(chunk) {
                    break Err(CoordinatorError::Consumer(e.context("audio sink rejected chunk")));
                }
            }
            Some(Err(e)) => break Err(CoordinatorError::Consumer(e)),
        }
    };
    // releases the receiver so a still-running producer stops buffering
    drop(chunks);
    (outcome, stats)
}
