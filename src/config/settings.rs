//! Application settings structs, defaults and TOML persistence.
//!
//! Every section is `#[serde(default)]`, so a hand-written `settings.toml`
//! only needs the keys it wants to change.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::{UtteranceLimits, DEFAULT_FRAME_SAMPLES};
use crate::speech::{VoiceSettings, DEFAULT_MIN_UNIT_CHARS};

use super::AppPaths;

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Where the dialogue backend lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket URL, e.g. `ws://localhost:8080`.
    pub url: String,
    /// Seconds to wait for the connection before failing the session.
    pub connect_timeout_secs: u64,
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080".into(),
            connect_timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationConfig
// ---------------------------------------------------------------------------

/// What is sent alongside every user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Mode tag for voice calls (`None` omits it from messages).
    pub mode: Option<String>,
    /// Mode tag for text chat.
    pub chat_mode: Option<String>,
    /// Operator knowledge base, forwarded verbatim as `config`.
    pub knowledge_base: String,
    /// Read the knowledge base from this file instead, when set.
    pub knowledge_base_file: Option<String>,
}

impl ConversationConfig {
    /// The configuration text to send: the file's contents when
    /// `knowledge_base_file` is set, `knowledge_base` otherwise.
    pub fn knowledge_base_text(&self) -> Result<String> {
        match &self.knowledge_base_file {
            Some(file) => std::fs::read_to_string(file)
                .with_context(|| format!("reading knowledge base {file}")),
            None => Ok(self.knowledge_base.clone()),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            mode: Some("hiring".into()),
            chat_mode: Some("marketing".into()),
            knowledge_base: String::new(),
            knowledge_base_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Microphone capture and uplink framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of the PCM frames sent to the backend, in Hz.
    pub sample_rate: u32,
    /// Samples per uplink frame.
    pub frame_samples: usize,
    /// Stream encoded microphone frames to the backend while listening.
    pub stream_frames: bool,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_samples: DEFAULT_FRAME_SAMPLES,
            stream_frames: true,
            input_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RecognitionConfig
// ---------------------------------------------------------------------------

/// Speech-to-text settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// GGML model: a file path, or a name resolved as
    /// `<models_dir>/ggml-<name>.bin`.
    pub model: String,
    /// BCP-47 language tag.
    pub language: String,
    /// RMS level above which audio counts as voice.
    pub vad_threshold: f32,
    /// Trailing silence that ends an utterance.
    pub end_silence_ms: u64,
    /// Seconds without voice before a listen ends with no result.
    pub no_speech_timeout_secs: u64,
    pub max_utterance_secs: u64,
    /// Consecutive recognition errors tolerated before the call fails.
    pub max_consecutive_errors: u32,
}

impl RecognitionConfig {
    pub fn limits(&self) -> UtteranceLimits {
        UtteranceLimits {
            end_silence: Duration::from_millis(self.end_silence_ms),
            no_speech_timeout: Duration::from_secs(self.no_speech_timeout_secs),
            max_utterance: Duration::from_secs(self.max_utterance_secs),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            language: "en-US".into(),
            vad_threshold: 0.01,
            end_silence_ms: 800,
            no_speech_timeout_secs: 8,
            max_utterance_secs: 30,
            max_consecutive_errors: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisConfig
// ---------------------------------------------------------------------------

/// Text-to-speech settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// espeak-ng executable.
    pub binary: String,
    pub voice: Option<String>,
    /// 1.0 is normal speed.
    pub rate: f32,
    /// 1.0 is normal pitch.
    pub pitch: f32,
    /// Unpunctuated characters that force a unit to be spoken.
    pub sentence_min_chars: usize,
}

impl SynthesisConfig {
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            rate: self.rate,
            pitch: self.pitch,
            voice: self.voice.clone(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            binary: "espeak-ng".into(),
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            sentence_min_chars: DEFAULT_MIN_UNIT_CHARS,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_dialogue::config::AppConfig;
///
/// let mut config = AppConfig::load().unwrap();
/// config.transport.url = "ws://10.0.0.5:8080".into();
/// config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub conversation: ConversationConfig,
    pub audio: AudioConfig,
    pub recognition: RecognitionConfig,
    pub synthesis: SynthesisConfig,
}

impl AppConfig {
    /// Load from the platform `settings.toml`; defaults when it is missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save to the platform `settings.toml`, creating parent directories.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `true` when no `settings.toml` exists yet.
    pub fn is_first_run() -> bool {
        !AppPaths::new().settings_file.exists()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let mut saved = AppConfig::default();
        saved.transport.url = "ws://example.test:9000".into();
        saved.conversation.knowledge_base = "We repair boilers.\nOpen 9-5.".into();
        saved.synthesis.voice = Some("en-us".into());
        saved.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(saved, loaded);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let config = AppConfig::load_from(&dir.path().join("nonexistent.toml")).expect("load");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("a").join("b").join("settings.toml");
        AppConfig::default().save_to(&path).expect("save");
        assert!(path.exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[transport]\nurl = \"ws://backend:1234\"\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.transport.url, "ws://backend:1234");
        assert_eq!(config.transport.connect_timeout_secs, 10);
        assert_eq!(config.audio.frame_samples, 4096);
        assert_eq!(config.synthesis.sentence_min_chars, 30);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "transport = 5").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = AppConfig::default();
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.recognition.language, "en-US");
        assert_eq!(config.synthesis.rate, 1.0);
        assert_eq!(config.synthesis.pitch, 1.0);
        assert_eq!(config.conversation.mode.as_deref(), Some("hiring"));
        assert_eq!(config.conversation.chat_mode.as_deref(), Some("marketing"));
    }

    #[test]
    fn knowledge_base_file_overrides_inline_text() {
        let dir = tempdir().expect("temp dir");
        let kb = dir.path().join("kb.txt");
        std::fs::write(&kb, "From file.").unwrap();

        let mut conv = ConversationConfig {
            knowledge_base: "Inline.".into(),
            ..Default::default()
        };
        assert_eq!(conv.knowledge_base_text().unwrap(), "Inline.");
        conv.knowledge_base_file = Some(kb.display().to_string());
        assert_eq!(conv.knowledge_base_text().unwrap(), "From file.");
    }

    #[test]
    fn missing_knowledge_base_file_is_an_error() {
        let conv = ConversationConfig {
            knowledge_base_file: Some("/nonexistent/kb.txt".into()),
            ..Default::default()
        };
        assert!(conv.knowledge_base_text().is_err());
    }

    #[test]
    fn recognition_limits_convert_units() {
        let limits = RecognitionConfig::default().limits();
        assert_eq!(limits.end_silence, Duration::from_millis(800));
        assert_eq!(limits.no_speech_timeout, Duration::from_secs(8));
        assert_eq!(limits.max_utterance, Duration::from_secs(30));
    }

    #[test]
    fn zero_connect_timeout_is_raised() {
        let t = TransportConfig {
            connect_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(t.connect_timeout(), Duration::from_secs(1));
    }
}
