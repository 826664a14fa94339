//! Shared plumbing for the HTTP gateway fronting transcription, chat and synthesis.
//!
//! Every endpoint answers `{"<field>": ...}` on success and `{"error": "..."}` on failure
//! (usually with a 4xx/5xx status).

use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use reqwest::StatusCode;

/// Build the async client used by the gateway backends.
pub(crate) fn http_client(config: &VoiceConfig) -> VoiceResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| VoiceError::Config(format!("HTTP client: {}", e)))
}

/// Read a gateway response and pull out the string payload stored under `field`.
pub(crate) async fn read_field(res: reqwest::Response, field: &str) -> VoiceResult<String> {
    let status = res.status();
    let body = res.text().await?;
    extract_field(status, &body, field)
}

pub(crate) fn extract_field(status: StatusCode, body: &str, field: &str) -> VoiceResult<String> {
    let json: serde_json::Value = serde_json::from_str(body).unwrap_or(serde_json::Value::Null);

    if let Some(error) = json.get("error").and_then(|e| e.as_str()) {
        return Err(VoiceError::CollaboratorRejected(error.trim().to_string()));
    }
    if !status.is_success() {
        let snippet: String = body.chars().take(200).collect();
        return Err(VoiceError::CollaboratorRejected(format!(
            "gateway error {}: {}",
            status, snippet
        )));
    }

    json.get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            VoiceError::CollaboratorRejected(format!("gateway response has no `{}`", field))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn extracts_payload() {
        let text = extract_field(StatusCode::OK, r#"{"text": "  hello  "}"#, "text").unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn error_field_wins_over_status() {
        let err = extract_field(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error": "STT model is not loaded"}"#,
            "text",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorRejected);
        assert!(err.to_string().contains("STT model is not loaded"));
    }

    #[test]
    fn non_json_failure_is_rejected() {
        let err = extract_field(StatusCode::BAD_GATEWAY, "<html>oops</html>", "response")
            .unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn missing_or_blank_payload_is_rejected() {
        assert!(extract_field(StatusCode::OK, "{}", "audio_url").is_err());
        assert!(extract_field(StatusCode::OK, r#"{"text": "   "}"#, "text").is_err());
    }
}
