//! **PlaybackController**: the single speaker slot and the interruption kill-switch.
//!
//! Every `play()` gets a fresh generation. Terminal events (`Ended`/`Failed`) arrive
//! asynchronously tagged with that generation; events from a session that has since been
//! interrupted or replaced are discarded.

use crate::error::VoiceResult;
use crate::tts::AudioReference;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Optional callback fired on every playback state transition.
pub type OnPlaybackStateChanged = Option<Arc<dyn Fn(PlaybackState) + Send + Sync>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Interrupted,
    Ended,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    /// Natural completion.
    Ended,
    /// Error while playing.
    Failed(String),
}

/// Terminal event reported by the output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub generation: u64,
    pub kind: PlaybackEventKind,
}

/// Handed to the output device for one session; reports how that session finished.
#[derive(Debug, Clone)]
pub struct PlaybackNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackNotifier {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ended(&self) {
        self.send(PlaybackEventKind::Ended);
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.send(PlaybackEventKind::Failed(message.into()));
    }

    fn send(&self, kind: PlaybackEventKind) {
        let event = PlaybackEvent {
            generation: self.generation,
            kind,
        };
        if self.tx.send(event).is_err() {
            debug!("Playback: event for generation {} dropped (receiver closed)", self.generation);
        }
    }
}

/// The speaker primitive.
pub trait AudioOutput: Send + Sync {
    /// Begin playing `reference`. An `Err` means playback never began (autoplay
    /// restriction, undecodable source); the controller reports it as blocked.
    fn start(
        &self,
        reference: &AudioReference,
        notifier: PlaybackNotifier,
    ) -> VoiceResult<Box<dyn PlaybackHandle>>;
}

/// Control over one started session.
pub trait PlaybackHandle: Send + Sync {
    /// Silence output immediately and discard the source.
    fn halt(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started { generation: u64 },
    /// Playback could not begin; the reference is returned for a manual retry.
    Blocked {
        reference: AudioReference,
        reason: String,
    },
}

struct ActivePlayback {
    generation: u64,
    reference: AudioReference,
    handle: Box<dyn PlaybackHandle>,
}

pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    state: PlaybackState,
    generation: u64,
    active: Option<ActivePlayback>,
    event_tx: mpsc::UnboundedSender<PlaybackEvent>,
    on_change: OnPlaybackStateChanged,
}

impl PlaybackController {
    /// Create a controller and the receiver its sessions report terminal events on.
    pub fn new(output: Arc<dyn AudioOutput>) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let controller = Self {
            output,
            state: PlaybackState::Idle,
            generation: 0,
            active: None,
            event_tx,
            on_change: None,
        };
        (controller, event_rx)
    }

    pub fn with_observer(mut self, on_change: OnPlaybackStateChanged) -> Self {
        self.on_change = on_change;
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Generation of the most recent `play()` call (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_source(&self) -> Option<&AudioReference> {
        self.active.as_ref().map(|a| &a.reference)
    }

    /// Halt the playing session, if any. Returns whether something was stopped.
    pub fn interrupt(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        if let Some(mut active) = self.active.take() {
            active.handle.halt();
            info!("⏹️ Playback: generation {} interrupted", active.generation);
        }
        self.transition(PlaybackState::Interrupted);
        true
    }

    /// Play `reference`, superseding whatever was playing.
    pub fn play(&mut self, reference: AudioReference) -> PlayOutcome {
        self.interrupt();

        self.generation += 1;
        let generation = self.generation;
        let notifier = PlaybackNotifier {
            generation,
            tx: self.event_tx.clone(),
        };

        match self.output.start(&reference, notifier) {
            Ok(handle) => {
                info!("🔊 Playback: generation {} playing {}", generation, reference.describe());
                self.active = Some(ActivePlayback {
                    generation,
                    reference,
                    handle,
                });
                self.transition(PlaybackState::Playing);
                PlayOutcome::Started { generation }
            }
            Err(e) => {
                warn!("Playback: generation {} blocked: {}", generation, e);
                if self.state != PlaybackState::Idle {
                    self.transition(PlaybackState::Idle);
                }
                PlayOutcome::Blocked {
                    reference,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Apply a terminal event. Returns the new state, or `None` if the event belongs to
    /// a superseded session and was discarded.
    pub fn handle_event(&mut self, event: PlaybackEvent) -> Option<PlaybackState> {
        let current = self.state == PlaybackState::Playing
            && matches!(&self.active, Some(a) if a.generation == event.generation);
        if !current {
            debug!(
                "Playback: discarding stale {:?} for generation {} (current {})",
                event.kind, event.generation, self.generation
            );
            return None;
        }

        self.active = None;
        let next = match event.kind {
            PlaybackEventKind::Ended => {
                info!("Playback: generation {} ended", event.generation);
                PlaybackState::Ended
            }
            PlaybackEventKind::Failed(message) => {
                warn!("Playback: generation {} failed: {}", event.generation, message);
                PlaybackState::Failed
            }
        };
        self.transition(next);
        Some(next)
    }

    fn transition(&mut self, next: PlaybackState) {
        self.state = next;
        if let Some(ref cb) = self.on_change {
            cb(next);
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.handle.halt();
        }
    }
}
