//! **CaptureController**: owns the single microphone slot.
//!
//! Lifecycle: `Idle → AwaitingPermission → Recording → Finalizing → Idle`. The device is
//! held from a granted permission until `Finalizing`; dropping the [`InputHandle`] releases
//! it on every exit path (clip, empty recording, or error).

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sender half handed to the device; each message is one captured chunk.
pub type ChunkSender = mpsc::UnboundedSender<Vec<u8>>;

/// Optional callback fired on every capture state transition.
pub type OnCaptureStateChanged = Option<Arc<dyn Fn(CaptureState) + Send + Sync>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureState {
    Idle,
    AwaitingPermission,
    Recording,
    Finalizing,
}

/// How captured chunks become a clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipFormat {
    /// Chunks are already container-encoded (e.g. webm/ogg); concatenate as-is.
    Encoded { mime_type: String },
    /// Chunks are little-endian 16-bit PCM; wrap them in a WAV container.
    Pcm16 { sample_rate: u32, channels: u16 },
}

impl ClipFormat {
    pub fn mime_type(&self) -> &str {
        match self {
            ClipFormat::Encoded { mime_type } => mime_type,
            ClipFormat::Pcm16 { .. } => "audio/wav",
        }
    }

    fn assemble(&self, chunks: Vec<Vec<u8>>) -> Vec<u8> {
        let payload = chunks.concat();
        match self {
            ClipFormat::Encoded { .. } => payload,
            ClipFormat::Pcm16 {
                sample_rate,
                channels,
            } => wav_container(&payload, *sample_rate, *channels),
        }
    }
}

/// A finished, non-empty recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    bytes: Vec<u8>,
    mime_type: String,
}

impl Clip {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension matching the mime type, used when uploading.
    pub fn extension(&self) -> &'static str {
        let base = self.mime_type.split(';').next().unwrap_or("").trim();
        match base {
            "audio/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/mpeg" => "mp3",
            "audio/mp4" => "m4a",
            _ => "wav",
        }
    }
}

/// Terminal result of a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Clip(Clip),
    /// Stopped before any audio arrived. Not an error.
    Empty,
}

/// The microphone primitive.
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Ask for the device and start streaming chunks into `chunks`.
    ///
    /// Dropping the returned handle must stop the device and drop every clone of
    /// `chunks`, which is how the controller knows the last chunk has been flushed.
    async fn acquire(&self, chunks: ChunkSender) -> VoiceResult<Box<dyn InputHandle>>;
}

/// Keeps the device open while alive.
pub trait InputHandle: Send + Sync {
    fn format(&self) -> ClipFormat;
}

struct CaptureSession {
    handle: Box<dyn InputHandle>,
    chunk_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    format: ClipFormat,
    started: Instant,
}

pub struct CaptureController {
    input: Arc<dyn AudioInput>,
    state: CaptureState,
    session: Option<CaptureSession>,
    flush_timeout: Duration,
    on_change: OnCaptureStateChanged,
}

impl CaptureController {
    pub fn new(input: Arc<dyn AudioInput>) -> Self {
        Self {
            input,
            state: CaptureState::Idle,
            session: None,
            flush_timeout: Duration::from_secs(2),
            on_change: None,
        }
    }

    /// Upper bound on waiting for the device to close its chunk channel after `stop()`.
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    pub fn with_observer(mut self, on_change: OnCaptureStateChanged) -> Self {
        self.on_change = on_change;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// True while a session holds (or is requesting) the device.
    pub fn is_live(&self) -> bool {
        self.state != CaptureState::Idle
    }

    /// Request the microphone and begin recording.
    ///
    /// Fails with `CaptureBusy` when a session is already live, and with
    /// `DeviceAccessDenied` (carrying the device message) when access is refused.
    /// Dropping the future before it completes returns the controller to `Idle`.
    pub async fn start(&mut self) -> VoiceResult<()> {
        if self.state != CaptureState::Idle {
            warn!("Capture: start() ignored while {:?}", self.state);
            return Err(VoiceError::CaptureBusy(format!("{:?}", self.state)));
        }

        let input = Arc::clone(&self.input);
        let mut state = IdleOnDrop::new(&mut self.state, &self.on_change);
        state.set(CaptureState::AwaitingPermission);
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();

        match input.acquire(chunk_tx).await {
            Ok(handle) => {
                let format = handle.format();
                info!("🎤 Capture: recording ({})", format.mime_type());
                self.session = Some(CaptureSession {
                    handle,
                    chunk_rx,
                    format,
                    started: Instant::now(),
                });
                state.set(CaptureState::Recording);
                state.disarm();
                Ok(())
            }
            Err(e) => {
                let message = match e {
                    VoiceError::DeviceAccessDenied(message) => message,
                    other => other.to_string(),
                };
                warn!("Capture: microphone unavailable: {}", message);
                state.set(CaptureState::Idle);
                Err(VoiceError::DeviceAccessDenied(message))
            }
        }
    }

    /// Stop recording and produce the outcome. Returns `None` when no recording is
    /// in progress (a duplicate stop). The device is released even if the future is
    /// dropped while flushing.
    pub async fn stop(&mut self) -> Option<CaptureOutcome> {
        if self.state != CaptureState::Recording {
            debug!("Capture: stop() ignored while {:?}", self.state);
            return None;
        }
        let flush_timeout = self.flush_timeout;
        let session = self.session.take();
        let mut state = IdleOnDrop::new(&mut self.state, &self.on_change);
        let Some(session) = session else {
            state.set(CaptureState::Idle);
            return None;
        };

        state.set(CaptureState::Finalizing);
        let CaptureSession {
            handle,
            mut chunk_rx,
            format,
            started,
        } = session;

        // Release the microphone before flushing.
        drop(handle);

        let mut chunks = Vec::new();
        let flushed = tokio::time::timeout(flush_timeout, async {
            while let Some(chunk) = chunk_rx.recv().await {
                if !chunk.is_empty() {
                    chunks.push(chunk);
                }
            }
        })
        .await;
        if flushed.is_err() {
            warn!(
                "Capture: device did not close within {:?}, finalizing with buffered audio",
                flush_timeout
            );
            while let Ok(chunk) = chunk_rx.try_recv() {
                if !chunk.is_empty() {
                    chunks.push(chunk);
                }
            }
        }

        let outcome = if chunks.is_empty() {
            info!("Capture: stopped with no audio");
            CaptureOutcome::Empty
        } else {
            let clip = Clip::new(format.assemble(chunks), format.mime_type());
            info!(
                "Capture: clip ready ({} bytes, {:.1}s)",
                clip.len(),
                started.elapsed().as_secs_f32()
            );
            CaptureOutcome::Clip(clip)
        };

        state.set(CaptureState::Idle);
        Some(outcome)
    }
}

fn notify(on_change: &OnCaptureStateChanged, next: CaptureState) {
    if let Some(ref cb) = on_change {
        cb(next);
    }
}

/// Tracks the state across an await. If the owning future is dropped before the
/// guard is disarmed, the controller falls back to `Idle`.
struct IdleOnDrop<'a> {
    state: &'a mut CaptureState,
    on_change: &'a OnCaptureStateChanged,
    armed: bool,
}

impl<'a> IdleOnDrop<'a> {
    fn new(state: &'a mut CaptureState, on_change: &'a OnCaptureStateChanged) -> Self {
        Self {
            state,
            on_change,
            armed: true,
        }
    }

    fn set(&mut self, next: CaptureState) {
        *self.state = next;
        notify(self.on_change, next);
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed && *self.state != CaptureState::Idle {
            warn!("Capture: cancelled while {:?}, returning to Idle", self.state);
            self.set(CaptureState::Idle);
        }
    }
}

/// Convert f32 samples (-1.0..1.0) to little-endian 16-bit PCM.
pub fn pcm16_from_f32(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let i = (clamped * 32767.0).round() as i16;
        out.extend_from_slice(&i.to_le_bytes());
    }
    out
}

/// Wrap 16-bit PCM in a RIFF/WAV container.
pub fn wav_container(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = pcm.len() as u32;
    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;

    let mut buf = Vec::with_capacity(44 + pcm.len());
    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    buf.extend_from_slice(pcm);
    buf
}
