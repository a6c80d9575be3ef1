//! Platform directories via the `dirs` crate.
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-dialogue\
//!   macOS:   ~/Library/Application Support/voice-dialogue/
//!   Linux:   ~/.config/voice-dialogue/
//!
//! Data dir (Whisper models):
//!   Windows: %LOCALAPPDATA%\voice-dialogue\
//!   macOS:   ~/Library/Application Support/voice-dialogue/
//!   Linux:   ~/.local/share/voice-dialogue/

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    /// `<config_dir>/settings.toml`.
    pub settings_file: PathBuf,
    /// Directory searched for GGML model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-dialogue";

    /// Resolve paths, falling back to the current directory when the
    /// platform has no standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir: data_dir.join("models"),
        }
    }

    /// Resolve a model setting to a file.
    ///
    /// Values that look like paths (contain a separator or end in `.bin`)
    /// are used as-is; bare names map to `<models_dir>/ggml-<name>.bin`.
    pub fn model_file(&self, model: &str) -> PathBuf {
        let looks_like_path = model.ends_with(".bin") || model.contains(std::path::MAIN_SEPARATOR) || model.contains('/');
        if looks_like_path {
            Path::new(model).to_path_buf()
        } else {
            self.models_dir.join(format!("ggml-{model}.bin"))
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
