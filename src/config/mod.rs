//! Configuration: `AppConfig` with one section per subsystem, `AppPaths`
//! for platform directories, and TOML persistence via `AppConfig::load` /
//! `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, ConversationConfig, RecognitionConfig, SynthesisConfig,
    TransportConfig,
};
