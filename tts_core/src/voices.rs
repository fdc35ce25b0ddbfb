//! Voice catalogue loaded from `map.json`.
//!
//! Two formats are accepted per language key:
//!
//! ```json
//! {
//!   "de_DE": "models/de_DE/de_DE-mls-medium.onnx.json",
//!   "fr_FR": { "config": "models/fr_FR/siwis.onnx.json", "default_speaker": 0 },
//!   "en_US": {
//!     "default_voice": "lessac",
//!     "voices": { "lessac": { "config": "models/en_US/lessac.onnx.json" } }
//!   }
//! }
//! ```
//!
//! In the two legacy forms the language key doubles as the voice id.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Voice used when the caller does not pick one.
pub fn default_voice_for_language(lang: &str) -> &'static str {
    if lang == "zh-CN" {
        "zm_yunjian"
    } else {
        "af_maple"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEntry {
    pub config: String,
    pub speaker_id: Option<i64>,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub quality: Option<String>,
}

impl VoiceEntry {
    fn with_config(config: String, speaker_id: Option<i64>) -> Self {
        Self {
            config,
            speaker_id,
            display_name: None,
            gender: None,
            quality: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct LanguageVoices {
    default_voice: String,
    voices: BTreeMap<String, VoiceEntry>,
}

/// Language key -> voices, with a default voice per language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceMap {
    languages: BTreeMap<String, LanguageVoices>,
}

impl VoiceMap {
    pub fn from_file<P: AsRef<Path>>(p: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(p.as_ref())
            .with_context(|| format!("Failed to load {}", p.as_ref().display()))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let json: Value = serde_json::from_str(text).context("map.json is not valid JSON")?;
        let obj = json
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("map.json must be a JSON object"))?;

        let mut languages = BTreeMap::new();
        for (lang, v) in obj {
            let entry = match v {
                Value::Object(o) if o.contains_key("voices") => Self::parse_multi_voice(lang, o)?,
                Value::String(path) => LanguageVoices {
                    default_voice: lang.clone(),
                    voices: BTreeMap::from([(lang.clone(), VoiceEntry::with_config(path.clone(), None))]),
                },
                Value::Object(o) => {
                    let config = o
                        .get("config")
                        .and_then(|x| x.as_str())
                        .ok_or_else(|| anyhow::anyhow!("missing 'config' for key {}", lang))?
                        .to_string();
                    let spk = o.get("default_speaker").and_then(|x| x.as_i64());
                    LanguageVoices {
                        default_voice: lang.clone(),
                        voices: BTreeMap::from([(lang.clone(), VoiceEntry::with_config(config, spk))]),
                    }
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "invalid entry for key {} (expected string or object)",
                        lang
                    ))
                }
            };
            languages.insert(lang.clone(), entry);
        }
        Ok(Self { languages })
    }

    fn parse_multi_voice(lang: &str, o: &serde_json::Map<String, Value>) -> anyhow::Result<LanguageVoices> {
        let default_voice = o
            .get("default_voice")
            .and_then(|x| x.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'default_voice' for language {}", lang))?
            .to_string();
        let voices_obj = o
            .get("voices")
            .and_then(|x| x.as_object())
            .ok_or_else(|| anyhow::anyhow!("missing 'voices' object for language {}", lang))?;

        let mut voices = BTreeMap::new();
        for (voice_id, data) in voices_obj {
            let entry: VoiceEntry = serde_json::from_value(data.clone())
                .with_context(|| format!("invalid voice entry {voice_id} for language {lang}"))?;
            voices.insert(voice_id.clone(), entry);
        }
        if !voices.contains_key(&default_voice) {
            return Err(anyhow::anyhow!(
                "default voice '{}' for language '{}' is not among its voices",
                default_voice,
                lang
            ));
        }
        Ok(LanguageVoices { default_voice, voices })
    }

    /// Sorted language keys.
    pub fn list_languages(&self) -> Vec<String> {
        self.languages.keys().cloned().collect()
    }

    /// Every voice id across all languages, sorted and deduplicated.
    pub fn list_voices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .languages
            .values()
            .flat_map(|l| l.voices.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn default_voice(&self, lang: &str) -> Option<&str> {
        self.languages.get(lang).map(|l| l.default_voice.as_str())
    }

    /// Resolve the voice for a language, falling back to its default voice.
    pub fn resolve(&self, lang: &str, voice: Option<&str>) -> anyhow::Result<(&str, &VoiceEntry)> {
        let l = self.languages.get(lang).ok_or_else(|| {
            anyhow::anyhow!("Unknown language key: {lang}. Use /voices to list.")
        })?;
        let voice_id = voice.unwrap_or(l.default_voice.as_str());
        l.voices
            .get_key_value(voice_id)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown voice '{}' for language '{}'. Available voices: {}",
                    voice_id,
                    lang,
                    l.voices.keys().cloned().collect::<Vec<_>>().join(", ")
                )
            })
    }

    /// Look a voice id up in any language.
    pub fn find_voice(&self, voice: &str) -> Option<&VoiceEntry> {
        self.languages.values().find_map(|l| l.voices.get(voice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MAP: &str = r#"{
        "de_DE": "models/de_DE/de_DE-mls-medium.onnx.json",
        "fr_FR": { "config": "models/fr_FR/siwis.onnx.json", "default_speaker": 3 },
        "en_US": {
            "default_voice": "lessac",
            "voices": {
                "lessac": { "config": "models/en_US/lessac.onnx.json", "gender": "female" },
                "ryan": { "config": "models/en_US/ryan.onnx.json", "speaker_id": 1 }
            }
        }
    }"#;

    #[test]
    fn parses_both_formats() {
        let map = VoiceMap::from_json_str(MAP).unwrap();
        assert_eq!(map.list_languages(), vec!["de_DE", "en_US", "fr_FR"]);
        assert_eq!(map.list_voices(), vec!["de_DE", "fr_FR", "lessac", "ryan"]);

        let (id, entry) = map.resolve("fr_FR", None).unwrap();
        assert_eq!(id, "fr_FR");
        assert_eq!(entry.speaker_id, Some(3));
    }

    #[test]
    fn resolves_default_and_explicit_voices() {
        let map = VoiceMap::from_json_str(MAP).unwrap();
        let (id, entry) = map.resolve("en_US", None).unwrap();
        assert_eq!(id, "lessac");
        assert_eq!(entry.gender.as_deref(), Some("female"));

        let (id, entry) = map.resolve("en_US", Some("ryan")).unwrap();
        assert_eq!(id, "ryan");
        assert_eq!(entry.speaker_id, Some(1));

        let err = map.resolve("en_US", Some("bob")).unwrap_err();
        assert!(err.to_string().contains("Available voices: lessac, ryan"));
        assert!(map.resolve("xx_XX", None).is_err());
    }

    #[test]
    fn find_voice_searches_every_language() {
        let map = VoiceMap::from_json_str(MAP).unwrap();
        assert_eq!(map.find_voice("ryan").unwrap().config, "models/en_US/ryan.onnx.json");
        assert_eq!(map.find_voice("de_DE").unwrap().config, "models/de_DE/de_DE-mls-medium.onnx.json");
        assert!(map.find_voice("nobody").is_none());
    }

    #[test]
    fn rejects_malformed_maps() {
        assert!(VoiceMap::from_json_str("[]").is_err());
        assert!(VoiceMap::from_json_str(r#"{"de_DE": 5}"#).is_err());
        assert!(VoiceMap::from_json_str(r#"{"de_DE": {"speaker": 1}}"#).is_err());
        assert!(VoiceMap::from_json_str(
            r#"{"en_US": {"default_voice": "x", "voices": {"y": {"config": "c"}}}}"#
        )
        .is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MAP.as_bytes()).unwrap();
        let map = VoiceMap::from_file(file.path()).unwrap();
        assert_eq!(map.default_voice("en_US"), Some("lessac"));
        assert!(VoiceMap::from_file("does/not/exist.json").is_err());
    }

    #[test]
    fn default_voice_depends_on_language() {
        assert_eq!(default_voice_for_language("zh-CN"), "zm_yunjian");
        assert_eq!(default_voice_for_language("en"), "af_maple");
    }
}
