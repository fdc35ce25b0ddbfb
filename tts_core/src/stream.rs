//! Streaming synthesis over a segment stream.
//!
//! Segments are synthesized one at a time, in arrival order, each on the
//! blocking pool. The resulting stream ends when the segment stream ends, so a
//! closed and drained input always yields a finite output.

use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

use crate::{AudioChunk, Synthesizer};

/// Synthesize every segment of `segments` with `voice`.
///
/// Each chunk carries the segment it was made from. Whitespace-only segments
/// are consumed without producing audio. The first synthesis error ends the
/// stream.
pub fn speak<T, S>(
    synth: Arc<T>,
    segments: S,
    voice: String,
) -> impl Stream<Item = anyhow::Result<AudioChunk>> + Send
where
    T: Synthesizer + ?Sized + 'static,
    S: Stream<Item = String> + Send + 'static,
{
    try_stream! {
        let mut segments = Box::pin(segments);
        let mut index = 0usize;
        while let Some(segment) = segments.next().await {
            index += 1;
            if segment.trim().is_empty() {
                trace!(index, "skipping blank segment");
                continue;
            }

            let synth = Arc::clone(&synth);
            let voice = voice.clone();
            let text = segment.clone();
            let (samples, sample_rate) = tokio::task::spawn_blocking(move || synth.synthesize(&text, &voice))
                .await
                .map_err(|e| anyhow::anyhow!("synthesis task join error: {e}"))??;

            debug!(index, samples = samples.len(), sample_rate, "segment synthesized");
            yield AudioChunk {
                samples,
                sample_rate,
                text: Some(segment),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToneSynthesizer;
    use futures::stream;

    fn segments(items: &[&str]) -> impl Stream<Item = String> + Send + 'static {
        stream::iter(items.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn chunks_follow_segment_order() {
        let synth = Arc::new(ToneSynthesizer::default());
        let chunks: Vec<_> = speak(synth, segments(&["Hello ", "world."]), "af_maple".into())
            .collect()
            .await;
        let texts: Vec<_> = chunks
            .into_iter()
            .map(|c| c.unwrap().text.unwrap())
            .collect();
        assert_eq!(texts, vec!["Hello ", "world."]);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        let synth = Arc::new(ToneSynthesizer::default());
        let chunks: Vec<_> = speak(synth, segments(&[]), "af_maple".into()).collect().await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn blank_segments_are_consumed_silently() {
        let synth = Arc::new(ToneSynthesizer::default());
        let chunks: Vec<_> = speak(synth, segments(&["a", " \n", "b"]), "af_maple".into())
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn unknown_voice_ends_stream_with_error() {
        let synth = Arc::new(ToneSynthesizer::default());
        let chunks: Vec<_> = speak(synth, segments(&["a", "b"]), "nobody".into())
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_err());
    }
}
