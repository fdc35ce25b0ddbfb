use std::f32::consts::TAU;

use crate::Synthesizer;

/// Model-free synthesizer that renders text as a tone.
///
/// Every non-whitespace character becomes `ms_per_char` of sine wave, every
/// whitespace character the same amount of silence. The pitch depends on the
/// voice, so different voices are distinguishable. Meant for tests and for
/// running the pipeline without model files.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    voices: Vec<String>,
    sample_rate: u32,
    ms_per_char: u32,
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self::new(["af_maple", "zm_yunjian"])
    }
}

impl ToneSynthesizer {
    pub fn new<I, S>(voices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            voices: voices.into_iter().map(Into::into).collect(),
            sample_rate: 24_000,
            ms_per_char: 10,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_ms_per_char(mut self, ms: u32) -> Self {
        self.ms_per_char = ms;
        self
    }

    fn pitch(voice: &str) -> f32 {
        let offset = voice.bytes().fold(0u32, |acc, b| acc.wrapping_add(b as u32)) % 220;
        220.0 + offset as f32
    }
}

impl Synthesizer for ToneSynthesizer {
    fn list_voices(&self) -> Vec<String> {
        self.voices.clone()
    }

    fn synthesize(&self, text: &str, voice: &str) -> anyhow::Result<(Vec<f32>, u32)> {
        if !self.voices.iter().any(|v| v == voice) {
            return Err(anyhow::anyhow!(
                "Unknown voice '{}'. Available voices: {}",
                voice,
                self.voices.join(", ")
            ));
        }

        let per_char = (self.sample_rate as u64 * self.ms_per_char as u64 / 1000) as usize;
        let freq = Self::pitch(voice);
        let rate = self.sample_rate as f32;
        let mut samples = Vec::with_capacity(per_char * text.chars().count());
        for ch in text.chars() {
            if ch.is_whitespace() {
                samples.extend(std::iter::repeat(0.0).take(per_char));
            } else {
                let start = samples.len();
                samples.extend((0..per_char).map(|i| 0.2 * (TAU * freq * (start + i) as f32 / rate).sin()));
            }
        }
        Ok((samples, self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_scales_with_text() {
        let synth = ToneSynthesizer::default();
        let (short, rate) = synth.synthesize("ab", "af_maple").unwrap();
        let (long, _) = synth.synthesize("abcd", "af_maple").unwrap();
        assert_eq!(rate, 24_000);
        assert_eq!(short.len(), 480);
        assert_eq!(long.len(), 2 * short.len());
    }

    #[test]
    fn whitespace_is_silent_and_samples_stay_in_range() {
        let synth = ToneSynthesizer::default();
        let (samples, _) = synth.synthesize("a b", "af_maple").unwrap();
        assert!(samples[240..480].iter().all(|&s| s == 0.0));
        assert!(samples.iter().all(|s| s.abs() <= 0.2 + f32::EPSILON));
    }

    #[test]
    fn rejects_unknown_voice() {
        let err = ToneSynthesizer::default().synthesize("hi", "xx").unwrap_err();
        assert!(err.to_string().contains("Unknown voice"));
    }
}
