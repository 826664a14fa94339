//! Hardware devices: the microphone through CPAL and the speaker through Rodio.
//!
//! Both keep their platform stream on a dedicated thread (cpal and rodio streams are
//! `!Send` on some platforms) and talk to it over channels.

use crate::capture::{pcm16_from_f32, AudioInput, ChunkSender, ClipFormat, InputHandle};
use crate::error::{VoiceError, VoiceResult};
use crate::playback::{AudioOutput, PlaybackHandle, PlaybackNotifier};
use crate::tts::AudioReference;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Default input device, mono 16-bit PCM.
#[derive(Debug, Clone)]
pub struct CpalInput {
    sample_rate: u32,
}

impl CpalInput {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoiceError::DeviceAccessDenied(e.to_string()))?;

        let mut device_names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                device_names.push(name);
            }
        }
        Ok(device_names)
    }
}

/// Open the default input and stream PCM chunks until `stop_rx` disconnects.
fn run_input_stream(
    sample_rate: u32,
    chunks: ChunkSender,
    ready: oneshot::Sender<VoiceResult<()>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let opened = (|| -> VoiceResult<cpal::Stream> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::DeviceAccessDenied("No input device available".to_string()))?;
        info!(
            "📱 Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if chunks.send(pcm16_from_f32(data)).is_err() {
                        debug!("Capture: chunk receiver closed");
                    }
                },
                move |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| VoiceError::DeviceAccessDenied(e.to_string()))?;
        stream
            .play()
            .map_err(|e| VoiceError::DeviceAccessDenied(e.to_string()))?;
        Ok(stream)
    })();

    match opened {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            // Blocks until the handle drops its sender.
            let _ = stop_rx.recv();
            drop(stream);
            info!("🎤 Capture: input stream closed");
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
}

struct CpalHandle {
    _stop: std_mpsc::Sender<()>,
    format: ClipFormat,
}

impl InputHandle for CpalHandle {
    fn format(&self) -> ClipFormat {
        self.format.clone()
    }
}

#[async_trait]
impl AudioInput for CpalInput {
    async fn acquire(&self, chunks: ChunkSender) -> VoiceResult<Box<dyn InputHandle>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let sample_rate = self.sample_rate;

        thread::Builder::new()
            .name("parley-capture".to_string())
            .spawn(move || run_input_stream(sample_rate, chunks, ready_tx, stop_rx))?;

        ready_rx.await.map_err(|_| {
            VoiceError::DeviceAccessDenied("capture thread exited before opening the device".to_string())
        })??;

        Ok(Box::new(CpalHandle {
            _stop: stop_tx,
            format: ClipFormat::Pcm16 {
                sample_rate,
                channels: 1,
            },
        }))
    }
}

/// Default output device. Each session gets its own `Sink`; `halt()` stops it.
pub struct RodioOutput {
    stream_handle: OutputStreamHandle,
    _keepalive: std_mpsc::Sender<()>,
}

impl RodioOutput {
    /// Open the default output device.
    pub fn new() -> VoiceResult<Self> {
        info!("🔊 Initializing audio playback");
        let (handle_tx, handle_rx) = std_mpsc::channel();
        let (keepalive_tx, keepalive_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("parley-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, stream_handle)) => {
                    if handle_tx.send(Ok(stream_handle)).is_ok() {
                        let _ = keepalive_rx.recv();
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(VoiceError::Playback(e.to_string())));
                }
            })?;

        let stream_handle = handle_rx
            .recv()
            .map_err(|_| VoiceError::Playback("output thread exited".to_string()))??;
        info!("✅ Audio playback initialized");
        Ok(Self {
            stream_handle,
            _keepalive: keepalive_tx,
        })
    }
}

fn decode(bytes: Vec<u8>) -> VoiceResult<Decoder<Cursor<Vec<u8>>>> {
    Decoder::new(Cursor::new(bytes))
        .map_err(|e| VoiceError::PlaybackBlocked(format!("Decode failed: {}", e)))
}

fn fetch(url: &str) -> Result<Vec<u8>, String> {
    let res = reqwest::blocking::get(url).map_err(|e| e.to_string())?;
    if !res.status().is_success() {
        return Err(format!("audio fetch returned {}", res.status()));
    }
    res.bytes().map(|b| b.to_vec()).map_err(|e| e.to_string())
}

struct RodioHandle {
    sink: Arc<Sink>,
    halted: Arc<AtomicBool>,
}

impl PlaybackHandle for RodioHandle {
    fn halt(&mut self) {
        self.halted.store(true, Ordering::SeqCst);
        self.sink.stop();
    }
}

impl AudioOutput for RodioOutput {
    fn start(
        &self,
        reference: &AudioReference,
        notifier: PlaybackNotifier,
    ) -> VoiceResult<Box<dyn PlaybackHandle>> {
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| VoiceError::PlaybackBlocked(e.to_string()))?;
        let sink = Arc::new(sink);
        let halted = Arc::new(AtomicBool::new(false));

        // Inline audio is decoded up front so an unplayable source is reported as blocked.
        let pending_url = match reference {
            AudioReference::Inline { bytes, .. } => {
                sink.append(decode(bytes.clone())?.convert_samples::<f32>());
                None
            }
            AudioReference::Url(url) => Some(url.clone()),
        };

        let watch_sink = Arc::clone(&sink);
        let watch_halted = Arc::clone(&halted);
        thread::Builder::new()
            .name(format!("parley-playback-{}", notifier.generation()))
            .spawn(move || {
                if let Some(url) = pending_url {
                    let source = fetch(&url).map_err(VoiceError::Playback).and_then(decode);
                    if watch_halted.load(Ordering::SeqCst) {
                        return;
                    }
                    match source {
                        Ok(source) => watch_sink.append(source.convert_samples::<f32>()),
                        Err(e) => {
                            notifier.failed(e.to_string());
                            return;
                        }
                    }
                }
                watch_sink.sleep_until_end();
                if !watch_halted.load(Ordering::SeqCst) {
                    notifier.ended();
                }
            })?;

        Ok(Box::new(RodioHandle { sink, halted }))
    }
}
