//! Command-line entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (defaults on first run).
//! 3. Create the tokio runtime (multi-thread, 2 workers).
//! 4. `call`: start microphone capture, load the Whisper model, build the
//!    recognizer / synthesizer / connector, spawn the [`TurnCoordinator`],
//!    the frame uplink and the status printer, then read commands from
//!    stdin until `/quit` or Ctrl-C.
//! 5. `chat`: open a [`ChatSession`] and relay stdin lines.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use voice_dialogue::{
    audio::{run_uplink, AudioChunk, AudioFrameEncoder},
    config::{AppConfig, AppPaths},
    session::{
        new_shared_state, CallHandle, CallState, ChatSession, CoordinatorSettings, Role,
        SharedCallState, TurnCoordinator, TurnState,
    },
    speech::{RecognitionSink, SpeechError, SpeechRecognizer},
    transport::{InboundMessage, TransportEvent, WsConnector},
    tts::EspeakSynthesizer,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "voice-dialogue", version, about = "Half-duplex voice client for a dialogue backend")]
struct Cli {
    /// Path to settings.toml (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend WebSocket URL, overriding the config file.
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a voice call (default).
    Call,
    /// Text chat with the backend.
    Chat,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    log::info!("voice-dialogue starting up");

    let path = cli.config.clone().unwrap_or_else(|| AppPaths::new().settings_file);
    let mut config = AppConfig::load_from(&path).unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });
    if let Some(url) = cli.url {
        config.transport.url = url;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match cli.command.unwrap_or(Command::Call) {
        Command::Call => rt.block_on(run_call(config)),
        Command::Chat => rt.block_on(run_chat(config)),
    }
}

// ---------------------------------------------------------------------------
// call
// ---------------------------------------------------------------------------

async fn run_call(config: AppConfig) -> Result<()> {
    let knowledge_base = config.conversation.knowledge_base_text()?;
    let (audio_tx, _) = broadcast::channel::<AudioChunk>(64);

    #[cfg(feature = "native")]
    let _capture = start_capture(&config, audio_tx.clone());
    #[cfg(feature = "native")]
    let capturing = _capture.is_some();
    #[cfg(not(feature = "native"))]
    let capturing = false;

    let recognizer = build_recognizer(&config, &audio_tx, capturing);
    let synthesizer = Box::new(EspeakSynthesizer::new(&config.synthesis.binary));
    let connector = Arc::new(WsConnector::new(
        config.transport.url.clone(),
        config.transport.connect_timeout(),
    ));
    let settings = CoordinatorSettings {
        config_text: knowledge_base,
        mode: config.conversation.mode.clone(),
        voice: config.synthesis.voice_settings(),
        sentence_min_chars: config.synthesis.sentence_min_chars,
        max_consecutive_errors: config.recognition.max_consecutive_errors,
    };

    let shared = new_shared_state();
    let coordinator =
        TurnCoordinator::new(Arc::clone(&shared), connector, recognizer, synthesizer, settings);
    let (handle, coordinator_task) = coordinator.spawn();

    let uplink = (capturing && config.audio.stream_frames).then(|| {
        let encoder = AudioFrameEncoder::new(config.audio.frame_samples.max(1), config.audio.sample_rate);
        tokio::spawn(run_uplink(audio_tx.subscribe(), encoder, handle.clone()))
    });
    let printer = tokio::spawn(print_updates(shared));

    println!("Commands: /start  /stop  /config <text>  /quit   (other lines are sent as text)");
    handle.start();
    read_commands(&handle).await;

    handle.stop();
    if let Some(uplink) = uplink {
        uplink.abort();
    }
    drop(handle);
    if tokio::time::timeout(Duration::from_secs(2), coordinator_task).await.is_err() {
        log::warn!("coordinator did not shut down in time");
    }
    printer.abort();
    Ok(())
}

async fn read_commands(handle: &CallHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("stdin: {e}");
                        break;
                    }
                };
                let line = line.trim();
                match line {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/start" => { handle.start(); }
                    "/stop" => { handle.stop(); }
                    _ if line.starts_with("/config ") => {
                        handle.update_config(line.trim_start_matches("/config ").to_string());
                    }
                    text => { handle.submit_text(text); }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

/// Print status changes and finished transcript lines.
async fn print_updates(shared: SharedCallState) {
    let mut interval = tokio::time::interval(Duration::from_millis(150));
    let mut last_status = String::new();
    let mut last_session = None;
    let mut printed = 0usize;
    loop {
        interval.tick().await;
        let (status, lines) = {
            let s = shared.lock().unwrap();
            if s.session_id != last_session {
                last_session = s.session_id;
                printed = 0;
            }
            (s.status.clone(), settled_lines(&s, printed))
        };

        for (role, text) in lines {
            let who = match role {
                Role::User => "you",
                Role::Ai => "ai",
                Role::System => "system",
            };
            println!("{who}: {}", text.trim());
            printed += 1;
        }
        if status != last_status {
            println!("[{status}]");
            last_status = status;
        }
    }
}

/// Log entries from `from` on that will not change any more.  A streamed
/// reply is held back while it is still open and the call is live.
fn settled_lines(state: &CallState, from: usize) -> Vec<(Role, String)> {
    let done = if state.turn.is_active() {
        state.log.settled_len()
    } else {
        state.log.len()
    };
    state
        .log
        .messages()
        .get(from..done.max(from))
        .unwrap_or_default()
        .iter()
        .map(|m| (m.role, m.text.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

#[cfg(feature = "native")]
fn start_capture(
    config: &AppConfig,
    tx: broadcast::Sender<AudioChunk>,
) -> Option<voice_dialogue::audio::StreamHandle> {
    use voice_dialogue::audio::AudioCapture;

    let capture = match AudioCapture::open(config.audio.input_device.as_deref()) {
        Ok(capture) => capture,
        Err(e) => {
            log::warn!("Audio capture unavailable: {e}");
            return None;
        }
    };
    match capture.start(tx) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Failed to start audio stream: {e}");
            None
        }
    }
}

#[cfg(feature = "native")]
fn build_recognizer(
    config: &AppConfig,
    audio: &broadcast::Sender<AudioChunk>,
    capturing: bool,
) -> Box<dyn SpeechRecognizer> {
    use voice_dialogue::stt::{DictationRecognizer, DictationSettings, TranscribeParams, WhisperEngine};

    if !capturing {
        return Box::new(NoRecognizer {
            reason: "no microphone".into(),
        });
    }
    let model = AppPaths::new().model_file(&config.recognition.model);
    let params = TranscribeParams::for_language(&config.recognition.language);
    match WhisperEngine::load(&model, params) {
        Ok(engine) => Box::new(DictationRecognizer::new(
            Arc::new(engine),
            audio.clone(),
            DictationSettings {
                vad_threshold: config.recognition.vad_threshold,
                limits: config.recognition.limits(),
            },
        )),
        Err(e) => {
            log::warn!("Could not load Whisper model ({}): {e}", model.display());
            Box::new(NoRecognizer {
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(not(feature = "native"))]
fn build_recognizer(
    _config: &AppConfig,
    _audio: &broadcast::Sender<AudioChunk>,
    _capturing: bool,
) -> Box<dyn SpeechRecognizer> {
    Box::new(NoRecognizer {
        reason: "built without the `native` feature".into(),
    })
}

/// Stand-in recognizer when no engine could be set up; starting a call
/// reports why instead of crashing at launch.
struct NoRecognizer {
    reason: String,
}

impl SpeechRecognizer for NoRecognizer {
    fn start(&mut self, _sink: RecognitionSink) -> Result<(), SpeechError> {
        Err(SpeechError::CapabilityUnavailable(self.reason.clone()))
    }

    fn abort(&mut self) {}
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

async fn run_chat(config: AppConfig) -> Result<()> {
    let knowledge_base = config.conversation.knowledge_base_text()?;
    let connector = Arc::new(WsConnector::new(
        config.transport.url.clone(),
        config.transport.connect_timeout(),
    ));
    let mut chat = ChatSession::new(connector, knowledge_base, config.conversation.chat_mode.clone());

    println!("Connecting...");
    chat.connect().await?;
    if let Some(greeting) = chat.messages().last() {
        println!("ai: {}", greeting.text);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match line.trim() {
                    "/quit" | "/exit" => break,
                    text => {
                        if let Err(e) = chat.send(text) {
                            log::warn!("chat: {e}");
                            break;
                        }
                    }
                }
            }
            event = chat.next_event() => match event {
                Some(TransportEvent::Message(InboundMessage::CompleteResponse(text))) => {
                    println!("ai: {text}");
                }
                Some(TransportEvent::Message(InboundMessage::Fragment(text))) => {
                    use std::io::Write;
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                Some(TransportEvent::Message(InboundMessage::EndOfStream)) => println!(),
                Some(TransportEvent::Closed) | Some(TransportEvent::Error(_)) | None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    chat.close();
    if let Some(notice) = chat.messages().last() {
        println!("{}", notice.text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listening_with(build: impl FnOnce(&mut CallState)) -> CallState {
        let mut state = CallState {
            turn: TurnState::Listening,
            ..Default::default()
        };
        build(&mut state);
        state
    }

    #[test]
    fn user_turn_prints_before_the_reply_starts() {
        let state = listening_with(|s| s.log.push(Role::User, "book a repair"));
        assert_eq!(settled_lines(&state, 0), vec![(Role::User, "book a repair".to_string())]);
    }

    #[test]
    fn finished_reply_prints_once_back_to_listening() {
        let state = listening_with(|s| {
            s.log.push(Role::User, "hours?");
            s.log.extend_reply("Nine");
            s.log.extend_reply(" to five.");
            s.log.close_reply();
        });
        assert_eq!(settled_lines(&state, 1), vec![(Role::Ai, "Nine to five.".to_string())]);
    }

    #[test]
    fn open_reply_is_held_back() {
        let mut state = listening_with(|s| {
            s.log.push(Role::User, "hours?");
            s.log.extend_reply("Nine");
        });
        state.turn = TurnState::Speaking;
        assert!(settled_lines(&state, 1).is_empty());

        state.turn = TurnState::Ended;
        assert_eq!(settled_lines(&state, 1), vec![(Role::Ai, "Nine".to_string())]);
    }

    #[test]
    fn printed_lines_are_skipped() {
        let state = listening_with(|s| {
            s.log.push(Role::User, "a");
            s.log.push(Role::User, "b");
        });
        assert!(settled_lines(&state, 2).is_empty());
        assert!(settled_lines(&state, 5).is_empty());
    }
}
