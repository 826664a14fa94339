//! **Chat**: one exchange with the reasoning service. An utterance plus bounded history
//! goes in, the bot reply comes out.

use crate::config::VoiceConfig;
use crate::conversation::Turn;
use crate::error::{VoiceError, VoiceResult};
use crate::gateway;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Backend that answers an utterance given the preceding turns.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn converse(&self, utterance: &str, history: &[Turn]) -> VoiceResult<String>;
}

/// Offline backend that repeats the utterance back.
#[derive(Debug, Default)]
pub struct EchoChat;

#[async_trait]
impl ChatBackend for EchoChat {
    async fn converse(&self, utterance: &str, _history: &[Turn]) -> VoiceResult<String> {
        Ok(format!("You said: {}.", utterance.trim()))
    }
}

// Gateway request: {"text", "history": [{"role", "parts": [{"text"}]}]}
#[derive(Serialize)]
struct ChatRequest<'a> {
    text: &'a str,
    history: Vec<WireTurn<'a>>,
}

#[derive(Serialize)]
struct WireTurn<'a> {
    role: &'static str,
    parts: [WirePart<'a>; 1],
}

#[derive(Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

impl<'a> From<&'a Turn> for WireTurn<'a> {
    fn from(turn: &'a Turn) -> Self {
        Self {
            role: turn.role().as_str(),
            parts: [WirePart { text: turn.text() }],
        }
    }
}

/// Gateway chat: `POST /chat` → `{"response"}`.
#[derive(Debug, Clone)]
pub struct GatewayChat {
    url: String,
    client: reqwest::Client,
}

impl GatewayChat {
    pub fn new(config: &VoiceConfig) -> VoiceResult<Self> {
        Ok(Self {
            url: config.endpoint("chat"),
            client: gateway::http_client(config)?,
        })
    }

    pub fn from_env() -> VoiceResult<Self> {
        Self::new(&VoiceConfig::from_env())
    }
}

#[async_trait]
impl ChatBackend for GatewayChat {
    async fn converse(&self, utterance: &str, history: &[Turn]) -> VoiceResult<String> {
        let body = ChatRequest {
            text: utterance,
            history: history.iter().map(WireTurn::from).collect(),
        };
        let res = self.client.post(&self.url).json(&body).send().await?;
        gateway::read_field(res, "response").await
    }
}

/// Wraps a `ChatBackend`: blank utterances never reach it and blank replies are rejected.
#[derive(Clone)]
pub struct ChatClient {
    backend: Arc<dyn ChatBackend>,
}

impl ChatClient {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub async fn converse(&self, utterance: &str, history: &[Turn]) -> VoiceResult<String> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(VoiceError::CollaboratorRejected("empty utterance".to_string()));
        }

        info!("Chat: sending utterance with {} turns of history", history.len());
        let reply = match self.backend.converse(utterance, history).await {
            Ok(reply) => reply,
            Err(e) => {
                let e = e.into_service_failure();
                warn!("Chat failed: {}", e);
                return Err(e);
            }
        };

        let reply = reply.trim();
        if reply.is_empty() {
            warn!("Chat returned an empty reply");
            return Err(VoiceError::CollaboratorRejected(
                "chat service returned an empty reply".to_string(),
            ));
        }
        Ok(reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn history_uses_role_parts_shape() {
        let history = vec![Turn::user("Hello"), Turn::model("Hi there")];
        let body = ChatRequest {
            text: "How are you?",
            history: history.iter().map(WireTurn::from).collect(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "text": "How are you?",
                "history": [
                    {"role": "user", "parts": [{"text": "Hello"}]},
                    {"role": "model", "parts": [{"text": "Hi there"}]},
                ]
            })
        );
    }

    #[tokio::test]
    async fn echo_backend_replies() {
        let client = ChatClient::new(Arc::new(EchoChat));
        assert_eq!(
            client.converse(" hi ", &[]).await.unwrap(),
            "You said: hi."
        );
    }

    #[tokio::test]
    async fn blank_utterance_is_rejected_locally() {
        let client = ChatClient::new(Arc::new(EchoChat));
        let err = client.converse("  ", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorRejected);
    }
}
