//! **Text-to-Speech**: turn a bot reply into something the speaker can play.
//!
//! Implement `TtsBackend` for the HTTP gateway or a local engine. `SpeechClient` wraps a
//! backend, rejects blank text locally and classifies failures.

use crate::capture::wav_container;
use crate::config::VoiceConfig;
use crate::error::VoiceResult;
use crate::gateway;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Playable audio produced by synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioReference {
    /// Remote audio (e.g. an MP3 link returned by the gateway).
    Url(String),
    /// Audio bytes held in memory.
    Inline { bytes: Vec<u8>, mime_type: String },
}

impl AudioReference {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            AudioReference::Url(url) => url.clone(),
            AudioReference::Inline { bytes, mime_type } => {
                format!("<{} bytes of {}>", bytes.len(), mime_type)
            }
        }
    }
}

/// Backend that turns text into playable audio.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> VoiceResult<AudioReference>;
}

/// Placeholder TTS: 100ms of silence as an inline WAV. Keeps the pipeline exercised
/// without a synthesis service.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait]
impl TtsBackend for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<AudioReference> {
        let sample_rate = 16000;
        let silence = vec![0u8; (sample_rate as usize / 10) * 2];
        Ok(AudioReference::Inline {
            bytes: wav_container(&silence, sample_rate, 1),
            mime_type: "audio/wav".to_string(),
        })
    }
}

/// Gateway TTS: `POST /synthesize {"text"}` → `{"audio_url"}`.
#[derive(Debug, Clone)]
pub struct GatewayTts {
    url: String,
    client: reqwest::Client,
}

impl GatewayTts {
    pub fn new(config: &VoiceConfig) -> VoiceResult<Self> {
        Ok(Self {
            url: config.endpoint("synthesize"),
            client: gateway::http_client(config)?,
        })
    }

    pub fn from_env() -> VoiceResult<Self> {
        Self::new(&VoiceConfig::from_env())
    }
}

#[async_trait]
impl TtsBackend for GatewayTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<AudioReference> {
        let body = serde_json::json!({ "text": text });
        let res = self.client.post(&self.url).json(&body).send().await?;
        let audio_url = gateway::read_field(res, "audio_url").await?;
        Ok(AudioReference::Url(audio_url))
    }
}

/// Wraps a `TtsBackend`: blank text is a local no-op, failures are classified.
#[derive(Clone)]
pub struct SpeechClient {
    backend: Arc<dyn TtsBackend>,
}

impl SpeechClient {
    pub fn new(backend: Arc<dyn TtsBackend>) -> Self {
        Self { backend }
    }

    /// Synthesize `text`. `Ok(None)` means there was nothing to say.
    pub async fn synthesize(&self, text: &str) -> VoiceResult<Option<AudioReference>> {
        let text = text.trim();
        if text.is_empty() {
            debug!("TTS: blank text, nothing to synthesize");
            return Ok(None);
        }

        match self.backend.synthesize(text).await {
            Ok(reference) => {
                info!("TTS: synthesized {}", reference.describe());
                Ok(Some(reference))
            }
            Err(e) => {
                let e = e.into_service_failure();
                warn!("TTS failed: {}", e);
                Err(e)
            }
        }
    }
}
