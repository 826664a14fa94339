//! # Parley Voice - conversational voice client
//!
//! Coordinates microphone capture, speech-to-text, chat and text-to-speech playback for
//! a voice chat interface. At most one reply is audible at a time and every user action
//! silences the bot before anything else happens.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Capture    │→ │ Transcription│→ │     Chat     │            │
//! │  │ (AudioInput) │  │  (/transcribe│  │   (/chat +   │            │
//! │  └──────────────┘  └──────────────┘  │   history)   │            │
//! │                                      └──────┬───────┘            │
//! │  ┌──────────────┐  ┌──────────────┐         ↓                    │
//! │  │   Playback   │← │    Speech    │←────────┘                    │
//! │  │ (AudioOutput)│  │ (/synthesize)│                              │
//! │  └──────────────┘  └──────────────┘                              │
//! │          ↑ interrupt() on every new user action                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Devices are traits so the state machine runs against fakes in tests; the `device`
//! feature provides CPAL/Rodio implementations.

pub mod capture;
pub mod chat;
pub mod config;
pub mod conversation;
#[cfg(feature = "device")]
pub mod device;
pub mod error;
mod gateway;
pub mod orchestrator;
pub mod playback;
pub mod stt;
pub mod tts;

pub use capture::{
    AudioInput, CaptureController, CaptureOutcome, CaptureState, ChunkSender, Clip, ClipFormat,
    InputHandle, OnCaptureStateChanged,
};
pub use chat::{ChatBackend, ChatClient, EchoChat, GatewayChat};
pub use config::VoiceConfig;
pub use conversation::{
    ConversationHistory, EventLog, EventLogEntry, Role, Sender, Severity, Turn, TurnId,
};
#[cfg(feature = "device")]
pub use device::{CpalInput, RodioOutput};
pub use error::{ErrorKind, VoiceError, VoiceResult};
pub use orchestrator::{CycleOutcome, Devices, Orchestrator, Services, SpeechOutcome, UiEvent};
pub use playback::{
    AudioOutput, OnPlaybackStateChanged, PlayOutcome, PlaybackController, PlaybackEvent,
    PlaybackEventKind, PlaybackHandle, PlaybackNotifier, PlaybackState,
};
pub use stt::{GatewayStt, PlaceholderStt, SttBackend, TranscriptionClient};
pub use tts::{AudioReference, GatewayTts, PlaceholderTts, SpeechClient, TtsBackend};
