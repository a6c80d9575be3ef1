//! Half-duplex voice dialogue client.
//!
//! Captures microphone audio, recognises the caller's speech, sends each
//! utterance to a remote dialogue backend over a WebSocket, and speaks the
//! streamed reply sentence by sentence while keeping the recognizer deaf to
//! its own voice.

pub mod audio;
pub mod config;
pub mod events;
pub mod session;
pub mod speech;
pub mod stt;
pub mod transport;
pub mod tts;
