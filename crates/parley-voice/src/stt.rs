//! **Speech-to-Text (STT)**: convert a finished `Clip` into text for the chat stage.
//!
//! Implement `SttBackend` for the HTTP gateway or a local engine. `TranscriptionClient`
//! wraps any backend and classifies its failures.

use crate::capture::Clip;
use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::gateway;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Backend for converting a recorded clip to text.
#[async_trait]
pub trait SttBackend: Send + Sync {
    async fn transcribe(&self, clip: &Clip) -> VoiceResult<String>;
}

/// Placeholder STT: returns a fixed string. Use for testing the voice loop without a service.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: String) -> Self {
        Self { response: Some(s) }
    }
}

#[async_trait]
impl SttBackend for PlaceholderStt {
    async fn transcribe(&self, clip: &Clip) -> VoiceResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[STT placeholder: {} bytes of {}]",
            clip.len(),
            clip.mime_type()
        ))
    }
}

/// Gateway STT: multipart upload of the clip as `audio_data` to `POST /transcribe`.
#[derive(Debug, Clone)]
pub struct GatewayStt {
    url: String,
    client: reqwest::Client,
}

impl GatewayStt {
    pub fn new(config: &VoiceConfig) -> VoiceResult<Self> {
        Ok(Self {
            url: config.endpoint("transcribe"),
            client: gateway::http_client(config)?,
        })
    }

    pub fn from_env() -> VoiceResult<Self> {
        Self::new(&VoiceConfig::from_env())
    }
}

#[async_trait]
impl SttBackend for GatewayStt {
    async fn transcribe(&self, clip: &Clip) -> VoiceResult<String> {
        let part = reqwest::multipart::Part::bytes(clip.bytes().to_vec())
            .file_name(format!("recording.{}", clip.extension()))
            .mime_str(clip.mime_type())
            .map_err(|e| VoiceError::CollaboratorRejected(format!("invalid clip type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("audio_data", part);

        let res = self.client.post(&self.url).multipart(form).send().await?;
        gateway::read_field(res, "text").await
    }
}

/// Wraps an `SttBackend`: an empty transcript counts as a rejected clip.
#[derive(Clone)]
pub struct TranscriptionClient {
    backend: Arc<dyn SttBackend>,
}

impl TranscriptionClient {
    pub fn new(backend: Arc<dyn SttBackend>) -> Self {
        Self { backend }
    }

    pub async fn transcribe(&self, clip: &Clip) -> VoiceResult<String> {
        info!("STT: transcribing {} bytes of {}", clip.len(), clip.mime_type());
        let text = match self.backend.transcribe(clip).await {
            Ok(text) => text,
            Err(e) => {
                let e = e.into_service_failure();
                warn!("STT failed: {}", e);
                return Err(e);
            }
        };

        let text = text.trim();
        if text.is_empty() {
            warn!("STT returned no text");
            return Err(VoiceError::CollaboratorRejected(
                "transcription returned no text".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn clip() -> Clip {
        Clip::new(vec![0u8; 480], "audio/wav")
    }

    #[tokio::test]
    async fn placeholder_returns_message() {
        let stt = PlaceholderStt::new();
        let s = stt.transcribe(&clip()).await.unwrap();
        assert!(s.contains("STT placeholder"));
        assert!(s.contains("480"));
    }

    #[tokio::test]
    async fn placeholder_with_response() {
        let client = TranscriptionClient::new(Arc::new(PlaceholderStt::with_response(
            "  hello world \n".to_string(),
        )));
        assert_eq!(client.transcribe(&clip()).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn blank_transcript_is_rejected() {
        let client =
            TranscriptionClient::new(Arc::new(PlaceholderStt::with_response("   ".to_string())));
        let err = client.transcribe(&clip()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorRejected);
    }
}
