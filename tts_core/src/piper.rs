//! Piper-backed synthesizer (feature `piper`).

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, Mutex, RwLock},
};

use anyhow::Context;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use tracing::info;

use crate::{Synthesizer, VoiceMap};

// Cached synthesizer and sample rate
struct CachedSynth {
    synth: RwLock<PiperSpeechSynthesizer>,
    sample_rate: u32,
}

/// Synthesizes with Piper ONNX voices listed in a [`VoiceMap`].
///
/// Models are loaded on first use and kept for the lifetime of the
/// synthesizer, one per config path.
pub struct PiperSynthesizer {
    voices: VoiceMap,
    cache: Mutex<HashMap<String, Arc<CachedSynth>>>,
}

impl std::fmt::Debug for PiperSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiperSynthesizer")
            .field("voices", &self.voices)
            .finish_non_exhaustive()
    }
}

impl PiperSynthesizer {
    pub fn new(voices: VoiceMap) -> Self {
        Self {
            voices,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Read sample rate from model config JSON
    fn read_sample_rate<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<u32> {
        let text = fs::read_to_string(cfg_path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", cfg_path.as_ref().display()))?;
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Config file is not valid JSON")?;

        let sample_rate = json
            .get("audio")
            .and_then(|a| a.get("sample_rate"))
            .and_then(|sr| sr.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;
        Ok(sample_rate as u32)
    }

    fn get_or_create(&self, cfg_path: &str) -> anyhow::Result<Arc<CachedSynth>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow::anyhow!("Synthesizer cache lock poisoned"))?;
        if let Some(cached) = cache.get(cfg_path) {
            return Ok(Arc::clone(cached));
        }

        info!(config = %cfg_path, "loading piper voice");
        let sample_rate = Self::read_sample_rate(cfg_path)?;
        let model = piper_rs::from_config_path(Path::new(cfg_path))
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = PiperSpeechSynthesizer::new(model)?;
        let cached = Arc::new(CachedSynth {
            synth: RwLock::new(synth),
            sample_rate,
        });
        cache.insert(cfg_path.to_string(), Arc::clone(&cached));
        Ok(cached)
    }
}

impl Synthesizer for PiperSynthesizer {
    fn list_voices(&self) -> Vec<String> {
        self.voices.list_voices()
    }

    fn synthesize(&self, text: &str, voice: &str) -> anyhow::Result<(Vec<f32>, u32)> {
        let entry = self.voices.find_voice(voice).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown voice '{}'. Available voices: {}",
                voice,
                self.voices.list_voices().join(", ")
            )
        })?;
        let cached = self.get_or_create(&entry.config)?;
        let synth = cached
            .synth
            .read()
            .map_err(|_| anyhow::anyhow!("Synthesizer lock poisoned"))?;

        let iter: PiperSpeechStreamParallel = synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?.into_vec());
        }
        Ok((samples, cached.sample_rate))
    }
}
