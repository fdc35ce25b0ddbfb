//! Speech synthesis: the consumer side of a speaking session.
//!
//! A [`Synthesizer`] turns one piece of text into samples. [`speak`] drives a
//! synthesizer over a stream of text segments and yields [`AudioChunk`]s in
//! segment order.

mod stream;
mod tone;
mod voices;
mod wav;

#[cfg(feature = "piper")]
mod piper;

pub use stream::speak;
pub use tone::ToneSynthesizer;
pub use voices::{default_voice_for_language, VoiceEntry, VoiceMap};
pub use wav::encode_wav_base64;

#[cfg(feature = "piper")]
pub use piper::PiperSynthesizer;

/// A unit of synthesized audio, tagged with the text it was made from.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono PCM in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub text: Option<String>,
}

impl AudioChunk {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as f64 / self.sample_rate as f64 * 1000.0) as u64
    }

    /// 16-bit PCM WAV, Base64 encoded.
    pub fn to_wav_base64(&self) -> anyhow::Result<String> {
        encode_wav_base64(&self.samples, self.sample_rate)
    }
}

/// Blocking text-to-speech engine.
///
/// `synthesize` may take a while; callers on an async runtime run it on the
/// blocking pool (see [`speak`]).
pub trait Synthesizer: Send + Sync {
    /// Voice ids accepted by [`Synthesizer::synthesize`].
    fn list_voices(&self) -> Vec<String>;

    /// Synthesize `text` with `voice`, returning samples and their sample rate.
    fn synthesize(&self, text: &str, voice: &str) -> anyhow::Result<(Vec<f32>, u32)>;
}

impl<T: Synthesizer + ?Sized> Synthesizer for std::sync::Arc<T> {
    fn list_voices(&self) -> Vec<String> {
        (**self).list_voices()
    }

    fn synthesize(&self, text: &str, voice: &str) -> anyhow::Result<(Vec<f32>, u32)> {
        (**self).synthesize(text, voice)
    }
}
