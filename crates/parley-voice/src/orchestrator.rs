//! Orchestrator - the conversation state machine
//!
//! Ties capture, transcription, chat, speech and playback into user-visible cycles.
//! Every user-initiated action (typed message, recording, replay) opens a new cycle and
//! interrupts playback before anything else happens. Status updates and speech belong to
//! the cycle that produced them; results from an abandoned cycle still reach the history
//! and transcript but never touch the status line or the speaker.

use crate::capture::{AudioInput, CaptureController, CaptureOutcome, CaptureState};
use crate::chat::{ChatBackend, ChatClient, EchoChat, GatewayChat};
use crate::config::VoiceConfig;
use crate::conversation::{ConversationHistory, EventLog, EventLogEntry, Turn};
use crate::error::{ErrorKind, VoiceError, VoiceResult};
use crate::playback::{
    AudioOutput, PlayOutcome, PlaybackController, PlaybackEvent, PlaybackEventKind, PlaybackState,
};
use crate::stt::{GatewayStt, PlaceholderStt, SttBackend, TranscriptionClient};
use crate::tts::{AudioReference, GatewayTts, PlaceholderTts, SpeechClient, TtsBackend};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

pub const STATUS_READY: &str = "Ready";
pub const STATUS_REQUESTING_MIC: &str = "Requesting microphone...";
pub const STATUS_RECORDING: &str = "Recording... stop when you are done";
pub const STATUS_TRANSCRIBING: &str = "Transcribing...";
pub const STATUS_THINKING: &str = "Bot is thinking...";
pub const STATUS_SYNTHESIZING: &str = "Generating speech...";
pub const STATUS_SPEAKING: &str = "Speaking...";
pub const STATUS_NO_AUDIO: &str = "No audio recorded";
pub const STATUS_PLAYBACK_BLOCKED: &str = "Playback blocked, replay to hear the reply";
pub const STATUS_PLAYBACK_FAILED: &str = "Playback failed";

/// Status line shown after a failure of the given kind.
pub fn failure_status(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::DeviceAccessDenied => "Microphone access denied",
        ErrorKind::NetworkUnavailable => "Network unavailable, please try again",
        ErrorKind::CollaboratorRejected => "Request failed, please try again",
        ErrorKind::PlaybackBlocked => STATUS_PLAYBACK_BLOCKED,
        ErrorKind::Internal => "Something went wrong",
    }
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// The status line was overwritten.
    Status(String),
    /// A transcript line was appended.
    Log(EventLogEntry),
    CaptureStateChanged(CaptureState),
    PlaybackStateChanged(PlaybackState),
    /// Playback was blocked; offer a manual replay of this reference.
    ReplayAvailable(AudioReference),
}

/// How the speech stage of a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    Playing { generation: u64 },
    Blocked(AudioReference),
    /// Nothing to say.
    Silent,
    /// A newer cycle started before playback could begin.
    Superseded,
    Failed(ErrorKind),
}

/// Result of one user-initiated action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to do: blank input, empty recording, or no recording in progress.
    Skipped,
    Replied { reply: String, speech: SpeechOutcome },
    Failed(ErrorKind),
}

/// The three remote collaborators.
#[derive(Clone)]
pub struct Services {
    pub stt: Arc<dyn SttBackend>,
    pub chat: Arc<dyn ChatBackend>,
    pub tts: Arc<dyn TtsBackend>,
}

impl Services {
    /// HTTP clients for the gateway at `config.gateway_url`.
    pub fn gateway(config: &VoiceConfig) -> VoiceResult<Self> {
        Ok(Self {
            stt: Arc::new(GatewayStt::new(config)?),
            chat: Arc::new(GatewayChat::new(config)?),
            tts: Arc::new(GatewayTts::new(config)?),
        })
    }

    /// Offline stand-ins: fixed transcription, echoed replies, silent speech.
    pub fn placeholder() -> Self {
        Self {
            stt: Arc::new(PlaceholderStt::new()),
            chat: Arc::new(EchoChat),
            tts: Arc::new(PlaceholderTts),
        }
    }
}

/// The microphone and speaker.
#[derive(Clone)]
pub struct Devices {
    pub input: Arc<dyn AudioInput>,
    pub output: Arc<dyn AudioOutput>,
}

#[derive(Clone)]
struct UiSink(mpsc::UnboundedSender<UiEvent>);

impl UiSink {
    fn emit(&self, event: UiEvent) {
        if self.0.send(event).is_err() {
            debug!("Orchestrator: UI receiver closed, event dropped");
        }
    }
}

struct SessionState {
    history: ConversationHistory,
    transcript: EventLog,
    status: String,
    cycle: u64,
}

struct Inner {
    transcription: TranscriptionClient,
    chat: ChatClient,
    speech: SpeechClient,
    // Lock order: capture, then playback, then session.
    capture: Mutex<CaptureController>,
    playback: Mutex<PlaybackController>,
    session: Mutex<SessionState>,
    playback_events: Mutex<Option<mpsc::UnboundedReceiver<PlaybackEvent>>>,
    ui: UiSink,
}

/// Cheap to clone; every clone drives the same conversation.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build the orchestrator and the receiver its UI events arrive on.
    pub fn new(
        config: &VoiceConfig,
        services: Services,
        devices: Devices,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let ui = UiSink(ui_tx);

        let capture_ui = ui.clone();
        let capture = CaptureController::new(devices.input)
            .with_flush_timeout(config.capture_flush_timeout())
            .with_observer(Some(Arc::new(move |state: CaptureState| {
                capture_ui.emit(UiEvent::CaptureStateChanged(state))
            })));

        let playback_ui = ui.clone();
        let (playback, playback_rx) = PlaybackController::new(devices.output);
        let playback = playback.with_observer(Some(Arc::new(move |state: PlaybackState| {
            playback_ui.emit(UiEvent::PlaybackStateChanged(state))
        })));

        info!(
            "🎭 Orchestrator ready (history window {}, gateway {})",
            config.history_limit, config.gateway_url
        );

        let inner = Inner {
            transcription: TranscriptionClient::new(services.stt),
            chat: ChatClient::new(services.chat),
            speech: SpeechClient::new(services.tts),
            capture: Mutex::new(capture),
            playback: Mutex::new(playback),
            session: Mutex::new(SessionState {
                history: ConversationHistory::new(config.history_limit),
                transcript: EventLog::new(),
                status: STATUS_READY.to_string(),
                cycle: 0,
            }),
            playback_events: Mutex::new(Some(playback_rx)),
            ui,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            ui_rx,
        )
    }

    /// Send a typed message: chat, then speak the reply. Blank text is ignored.
    pub async fn send_chat_message(&self, text: &str) -> CycleOutcome {
        let text = text.trim();
        if text.is_empty() {
            debug!("Orchestrator: blank message ignored");
            return CycleOutcome::Skipped;
        }
        let cycle = self.inner.begin_cycle().await;
        self.inner.converse(cycle, text).await
    }

    /// Open the microphone. Fails with `CaptureBusy` while a recording is live, and with
    /// `DeviceAccessDenied` when the device is refused (already reported to the UI).
    pub async fn start_recording(&self) -> VoiceResult<()> {
        let inner = &self.inner;
        let mut capture = inner.capture.lock().await;
        if capture.is_live() {
            warn!("Orchestrator: recording already in progress");
            return Err(VoiceError::CaptureBusy(format!("{:?}", capture.state())));
        }

        let cycle = inner.begin_cycle().await;
        inner.set_status(cycle, STATUS_REQUESTING_MIC).await;

        match capture.start().await {
            Ok(()) => {
                inner.set_status(cycle, STATUS_RECORDING).await;
                Ok(())
            }
            Err(e) => {
                inner.log(EventLogEntry::system_error(e.to_string())).await;
                inner.set_status(cycle, failure_status(e.kind())).await;
                Err(e)
            }
        }
    }

    /// Stop recording and run the clip through transcription, chat and speech.
    ///
    /// Stopping is a user action: the finished recording opens its own cycle, so it owns
    /// the status line and the speaker even if a message was sent while recording.
    pub async fn stop_recording(&self) -> CycleOutcome {
        let inner = &self.inner;
        let Some(outcome) = inner.capture.lock().await.stop().await else {
            return CycleOutcome::Skipped;
        };
        let cycle = inner.begin_cycle().await;

        let clip = match outcome {
            CaptureOutcome::Empty => {
                inner.set_status(cycle, STATUS_NO_AUDIO).await;
                return CycleOutcome::Skipped;
            }
            CaptureOutcome::Clip(clip) => clip,
        };

        inner.set_status(cycle, STATUS_TRANSCRIBING).await;
        match inner.transcription.transcribe(&clip).await {
            Ok(text) => inner.converse(cycle, &text).await,
            Err(e) => {
                let kind = e.kind();
                inner
                    .log(EventLogEntry::system_error(format!(
                        "Transcription failed: {}",
                        e
                    )))
                    .await;
                inner.set_status(cycle, failure_status(kind)).await;
                CycleOutcome::Failed(kind)
            }
        }
    }

    /// Manually replay a reference, typically one offered by `UiEvent::ReplayAvailable`.
    pub async fn replay(&self, reference: AudioReference) -> SpeechOutcome {
        let cycle = self.inner.begin_cycle().await;
        self.inner.play(cycle, reference).await
    }

    /// Silence the speaker without starting anything new.
    pub async fn interrupt(&self) -> bool {
        self.inner.playback.lock().await.interrupt()
    }

    /// Apply a terminal playback event. Returns false for events of superseded sessions.
    pub async fn handle_playback_event(&self, event: PlaybackEvent) -> bool {
        let inner = &self.inner;
        let mut playback = inner.playback.lock().await;
        if playback.handle_event(event.clone()).is_none() {
            return false;
        }

        let mut session = inner.session.lock().await;
        match event.kind {
            PlaybackEventKind::Ended => inner.write_status(&mut session, STATUS_READY),
            PlaybackEventKind::Failed(message) => {
                inner.write_log(
                    &mut session,
                    EventLogEntry::system_error(format!("Playback failed: {}", message)),
                );
                inner.write_status(&mut session, STATUS_PLAYBACK_FAILED);
            }
        }
        true
    }

    /// Pump playback events until the output side goes away. Run this once, in its own task.
    pub async fn run_playback_events(&self) {
        let Some(mut events) = self.inner.playback_events.lock().await.take() else {
            warn!("Orchestrator: playback events are already being handled");
            return;
        };
        while let Some(event) = events.recv().await {
            self.handle_playback_event(event).await;
        }
        debug!("Orchestrator: playback event channel closed");
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.inner.session.lock().await.history.snapshot()
    }

    pub async fn transcript(&self) -> Vec<EventLogEntry> {
        self.inner.session.lock().await.transcript.entries().to_vec()
    }

    pub async fn status(&self) -> String {
        self.inner.session.lock().await.status.clone()
    }

    pub async fn capture_state(&self) -> CaptureState {
        self.inner.capture.lock().await.state()
    }

    pub async fn playback_state(&self) -> PlaybackState {
        self.inner.playback.lock().await.state()
    }

    /// Forget the conversation. The transcript is kept.
    pub async fn clear_history(&self) {
        self.inner.session.lock().await.history.clear();
    }
}

impl Inner {
    /// Open a new cycle and silence the previous one.
    async fn begin_cycle(&self) -> u64 {
        let cycle = {
            let mut session = self.session.lock().await;
            session.cycle += 1;
            session.cycle
        };
        if self.playback.lock().await.interrupt() {
            info!("Orchestrator: cycle {} interrupted playback", cycle);
        }
        cycle
    }

    async fn converse(&self, cycle: u64, text: &str) -> CycleOutcome {
        let (anchor, history) = {
            let mut session = self.session.lock().await;
            let history = session.history.snapshot();
            let anchor = session.history.push_user(text);
            self.write_log(&mut session, EventLogEntry::user(text));
            if session.cycle == cycle {
                self.write_status(&mut session, STATUS_THINKING);
            }
            (anchor, history)
        };

        let reply = match self.chat.converse(text, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                let kind = e.kind();
                self.log(EventLogEntry::bot_error(format!("Error: {}", e)))
                    .await;
                self.set_status(cycle, failure_status(kind)).await;
                return CycleOutcome::Failed(kind);
            }
        };

        let current = {
            let mut session = self.session.lock().await;
            if !session.history.push_reply(anchor, reply.as_str()) {
                debug!("Orchestrator: history was cleared, reply not recorded");
            }
            self.write_log(&mut session, EventLogEntry::bot(reply.as_str()));
            session.cycle == cycle
        };
        if !current {
            info!("Orchestrator: reply for abandoned cycle {} recorded, not spoken", cycle);
            return CycleOutcome::Replied {
                reply,
                speech: SpeechOutcome::Superseded,
            };
        }

        let speech = self.speak(cycle, &reply).await;
        CycleOutcome::Replied { reply, speech }
    }

    async fn speak(&self, cycle: u64, reply: &str) -> SpeechOutcome {
        if !self.set_status(cycle, STATUS_SYNTHESIZING).await {
            return SpeechOutcome::Superseded;
        }
        match self.speech.synthesize(reply).await {
            Ok(Some(reference)) => self.play(cycle, reference).await,
            Ok(None) => {
                self.set_status(cycle, STATUS_READY).await;
                SpeechOutcome::Silent
            }
            Err(e) => {
                let kind = e.kind();
                self.log(EventLogEntry::system_error(format!(
                    "Speech synthesis failed: {}",
                    e
                )))
                .await;
                self.set_status(cycle, failure_status(kind)).await;
                SpeechOutcome::Failed(kind)
            }
        }
    }

    /// Start playback for `cycle` unless a newer cycle has begun.
    async fn play(&self, cycle: u64, reference: AudioReference) -> SpeechOutcome {
        let mut playback = self.playback.lock().await;
        let mut session = self.session.lock().await;
        if session.cycle != cycle {
            debug!("Orchestrator: speech for cycle {} superseded", cycle);
            return SpeechOutcome::Superseded;
        }

        match playback.play(reference) {
            PlayOutcome::Started { generation } => {
                self.write_status(&mut session, STATUS_SPEAKING);
                SpeechOutcome::Playing { generation }
            }
            PlayOutcome::Blocked { reference, reason } => {
                self.write_log(
                    &mut session,
                    EventLogEntry::system(format!("Audio could not play ({}). Replay is available.", reason)),
                );
                self.ui.emit(UiEvent::ReplayAvailable(reference.clone()));
                self.write_status(&mut session, STATUS_PLAYBACK_BLOCKED);
                SpeechOutcome::Blocked(reference)
            }
        }
    }

    async fn log(&self, entry: EventLogEntry) {
        let mut session = self.session.lock().await;
        self.write_log(&mut session, entry);
    }

    /// Overwrite the status if `cycle` is still current. Returns whether it was.
    async fn set_status(&self, cycle: u64, status: &str) -> bool {
        let mut session = self.session.lock().await;
        if session.cycle != cycle {
            debug!("Orchestrator: stale status {:?} from cycle {} dropped", status, cycle);
            return false;
        }
        self.write_status(&mut session, status);
        true
    }

    fn write_log(&self, session: &mut SessionState, entry: EventLogEntry) {
        session.transcript.append(entry.clone());
        self.ui.emit(UiEvent::Log(entry));
    }

    fn write_status(&self, session: &mut SessionState, status: &str) {
        session.status = status.to_string();
        self.ui.emit(UiEvent::Status(status.to_string()));
    }
}
