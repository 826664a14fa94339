//! In-memory collaborators and devices shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parley_voice::{
    AudioInput, AudioOutput, AudioReference, ChatBackend, ChunkSender, Clip, ClipFormat, Devices,
    InputHandle, Orchestrator, PlaybackHandle, PlaybackNotifier, Services, SttBackend,
    TtsBackend, Turn, UiEvent, VoiceConfig, VoiceError, VoiceResult,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Scripted answer of a fake service.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    Network,
    Reject(String),
}

impl Script {
    fn into_result(self) -> VoiceResult<String> {
        match self {
            Script::Reply(text) => Ok(text),
            Script::Network => Err(VoiceError::NetworkUnavailable("connection refused".into())),
            Script::Reject(message) => Err(VoiceError::CollaboratorRejected(message)),
        }
    }
}

#[derive(Default)]
pub struct FakeStt {
    pub script: Mutex<Option<Script>>,
    pub clips: Mutex<Vec<Clip>>,
}

impl FakeStt {
    pub fn respond(&self, script: Script) {
        *self.script.lock().unwrap() = Some(script);
    }

    pub fn calls(&self) -> usize {
        self.clips.lock().unwrap().len()
    }
}

#[async_trait]
impl SttBackend for FakeStt {
    async fn transcribe(&self, clip: &Clip) -> VoiceResult<String> {
        self.clips.lock().unwrap().push(clip.clone());
        let script = self
            .script
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Script::Reply("transcribed speech".into()));
        script.into_result()
    }
}

/// One observed chat request.
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub utterance: String,
    pub history: Vec<Turn>,
    /// Sessions audible when the request was issued.
    pub playing: usize,
}

pub struct FakeChat {
    pub scripts: Mutex<VecDeque<Script>>,
    pub calls: Mutex<Vec<ChatCall>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    playing: Arc<AtomicUsize>,
}

impl FakeChat {
    fn new(playing: Arc<AtomicUsize>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            playing,
        }
    }

    /// Queue the answer for the next request. Without a script the reply is
    /// `reply to <utterance>`.
    pub fn respond(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Hold requests for `utterance` until the returned `Notify` is signalled.
    pub fn gate(&self, utterance: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(utterance.to_string(), Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn converse(&self, utterance: &str, history: &[Turn]) -> VoiceResult<String> {
        self.calls.lock().unwrap().push(ChatCall {
            utterance: utterance.to_string(),
            history: history.to_vec(),
            playing: self.playing.load(Ordering::SeqCst),
        });
        let script = self.scripts.lock().unwrap().pop_front();
        let gate = self.gates.lock().unwrap().get(utterance).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        script
            .unwrap_or_else(|| Script::Reply(format!("reply to {}", utterance)))
            .into_result()
    }
}

#[derive(Default)]
pub struct FakeTts {
    pub fail: Mutex<Option<Script>>,
    pub texts: Mutex<Vec<String>>,
}

impl FakeTts {
    pub fn calls(&self) -> usize {
        self.texts.lock().unwrap().len()
    }
}

#[async_trait]
impl TtsBackend for FakeTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<AudioReference> {
        let n = {
            let mut texts = self.texts.lock().unwrap();
            texts.push(text.to_string());
            texts.len()
        };
        if let Some(script) = self.fail.lock().unwrap().clone() {
            script.into_result()?;
        }
        Ok(AudioReference::Url(format!("https://audio.test/{}.mp3", n)))
    }
}

/// Microphone that delivers scripted chunks as soon as it is acquired.
pub struct FakeInput {
    pub chunks: Mutex<Vec<Vec<u8>>>,
    pub deny: AtomicBool,
    /// Open handles; must be zero whenever capture is idle.
    pub held: Arc<AtomicUsize>,
    /// Sessions audible at each acquire.
    pub playing_at_acquire: Mutex<Vec<usize>>,
    playing: Arc<AtomicUsize>,
}

impl FakeInput {
    fn new(playing: Arc<AtomicUsize>) -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            deny: AtomicBool::new(false),
            held: Arc::new(AtomicUsize::new(0)),
            playing_at_acquire: Mutex::new(Vec::new()),
            playing,
        }
    }

    pub fn script(&self, chunks: Vec<Vec<u8>>) {
        *self.chunks.lock().unwrap() = chunks;
    }
}

struct FakeInputHandle {
    held: Arc<AtomicUsize>,
}

impl InputHandle for FakeInputHandle {
    fn format(&self) -> ClipFormat {
        ClipFormat::Encoded {
            mime_type: "audio/webm".into(),
        }
    }
}

impl Drop for FakeInputHandle {
    fn drop(&mut self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioInput for FakeInput {
    async fn acquire(&self, chunks: ChunkSender) -> VoiceResult<Box<dyn InputHandle>> {
        self.playing_at_acquire
            .lock()
            .unwrap()
            .push(self.playing.load(Ordering::SeqCst));
        if self.deny.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceAccessDenied("Permission denied by user".into()));
        }
        for chunk in self.chunks.lock().unwrap().iter() {
            let _ = chunks.send(chunk.clone());
        }
        self.held.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeInputHandle {
            held: Arc::clone(&self.held),
        }))
    }
}

/// Speaker that tracks how many sessions are audible.
pub struct FakeOutput {
    pub block: AtomicBool,
    pub playing: Arc<AtomicUsize>,
    pub max_playing: Arc<AtomicUsize>,
    pub notifiers: Mutex<Vec<PlaybackNotifier>>,
    pub started: Mutex<Vec<AudioReference>>,
}

impl FakeOutput {
    fn new(playing: Arc<AtomicUsize>) -> Self {
        Self {
            block: AtomicBool::new(false),
            playing,
            max_playing: Arc::new(AtomicUsize::new(0)),
            notifiers: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn notifier(&self, index: usize) -> PlaybackNotifier {
        self.notifiers.lock().unwrap()[index].clone()
    }

    pub fn audible(&self) -> usize {
        self.playing.load(Ordering::SeqCst)
    }
}

struct FakePlaybackHandle {
    playing: Arc<AtomicUsize>,
    halted: bool,
}

impl PlaybackHandle for FakePlaybackHandle {
    fn halt(&mut self) {
        if !self.halted {
            self.halted = true;
            self.playing.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakePlaybackHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

impl AudioOutput for FakeOutput {
    fn start(
        &self,
        reference: &AudioReference,
        notifier: PlaybackNotifier,
    ) -> VoiceResult<Box<dyn PlaybackHandle>> {
        if self.block.load(Ordering::SeqCst) {
            return Err(VoiceError::PlaybackBlocked("autoplay is not allowed".into()));
        }
        let now = self.playing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_playing.fetch_max(now, Ordering::SeqCst);
        self.notifiers.lock().unwrap().push(notifier);
        self.started.lock().unwrap().push(reference.clone());
        Ok(Box::new(FakePlaybackHandle {
            playing: Arc::clone(&self.playing),
            halted: false,
        }))
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
    pub stt: Arc<FakeStt>,
    pub chat: Arc<FakeChat>,
    pub tts: Arc<FakeTts>,
    pub input: Arc<FakeInput>,
    pub output: Arc<FakeOutput>,
}

impl Harness {
    /// Every UI event emitted so far.
    pub fn drain_ui(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn harness() -> Harness {
    harness_with(VoiceConfig {
        capture_flush_ms: 200,
        ..VoiceConfig::default()
    })
}

pub fn harness_with(config: VoiceConfig) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let playing = Arc::new(AtomicUsize::new(0));
    let stt = Arc::new(FakeStt::default());
    let chat = Arc::new(FakeChat::new(Arc::clone(&playing)));
    let tts = Arc::new(FakeTts::default());
    let input = Arc::new(FakeInput::new(Arc::clone(&playing)));
    let output = Arc::new(FakeOutput::new(Arc::clone(&playing)));

    let services = Services {
        stt: stt.clone(),
        chat: chat.clone(),
        tts: tts.clone(),
    };
    let devices = Devices {
        input: input.clone(),
        output: output.clone(),
    };
    let (orchestrator, ui) = Orchestrator::new(&config, services, devices);

    Harness {
        orchestrator,
        ui,
        stt,
        chat,
        tts,
        input,
        output,
    }
}
