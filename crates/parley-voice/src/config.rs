//! Runtime configuration loaded from the environment (`.env` via dotenvy in binaries).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway used when `PARLEY_GATEWAY_URL` is unset.
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:5000";

/// Sliding-window capacity of the conversation history.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_capture_flush_ms() -> u64 {
    2000
}

fn default_sample_rate() -> u32 {
    16000
}

/// Voice client configuration.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | PARLEY_GATEWAY_URL | http://127.0.0.1:5000 | Base URL serving `/transcribe`, `/chat`, `/synthesize`. |
/// | PARLEY_HISTORY_LIMIT | 20 | Turns kept in the sliding window sent with each chat request. |
/// | PARLEY_REQUEST_TIMEOUT_SECS | unset | Per-request timeout. Unset means requests never time out. |
/// | PARLEY_CAPTURE_FLUSH_MS | 2000 | How long `stop()` waits for the device to flush buffered chunks. |
/// | PARLEY_SAMPLE_RATE | 16000 | Microphone sample rate for the cpal input. |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_capture_flush_ms")]
    pub capture_flush_ms: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            history_limit: default_history_limit(),
            request_timeout_secs: None,
            capture_flush_ms: default_capture_flush_ms(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl VoiceConfig {
    /// Load from process environment. Unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |name: &str| -> Option<u64> {
            lookup(name).and_then(|v| v.trim().parse::<u64>().ok())
        };

        let gateway_url = lookup("PARLEY_GATEWAY_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.gateway_url);
        let history_limit = number("PARLEY_HISTORY_LIMIT")
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(defaults.history_limit);
        let request_timeout_secs = number("PARLEY_REQUEST_TIMEOUT_SECS").filter(|n| *n > 0);
        let capture_flush_ms = number("PARLEY_CAPTURE_FLUSH_MS").unwrap_or(defaults.capture_flush_ms);
        let sample_rate = number("PARLEY_SAMPLE_RATE")
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.sample_rate);

        Self {
            gateway_url,
            history_limit,
            request_timeout_secs,
            capture_flush_ms,
            sample_rate,
        }
    }

    /// Full URL of a gateway endpoint, e.g. `endpoint("chat")`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.gateway_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn capture_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_flush_ms)
    }
}
