//! Error types for the Parley voice system

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Coarse failure classes reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Microphone permission denied or no input device.
    DeviceAccessDenied,
    /// A collaborator could not be reached.
    NetworkUnavailable,
    /// A collaborator answered but rejected the input or returned nothing usable.
    CollaboratorRejected,
    /// Audio output refused to start (autoplay restriction, undecodable source).
    PlaybackBlocked,
    /// Anything else: contract violations, configuration, local IO.
    Internal,
}

/// Errors that can occur in the voice orchestration system
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone access denied: {0}")]
    DeviceAccessDenied(String),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Request rejected: {0}")]
    CollaboratorRejected(String),

    #[error("Playback blocked: {0}")]
    PlaybackBlocked(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Capture already active ({0})")]
    CaptureBusy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Classify this error for status reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::DeviceAccessDenied(_) => ErrorKind::DeviceAccessDenied,
            VoiceError::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            VoiceError::CollaboratorRejected(_) => ErrorKind::CollaboratorRejected,
            VoiceError::PlaybackBlocked(_) => ErrorKind::PlaybackBlocked,
            VoiceError::Playback(_)
            | VoiceError::CaptureBusy(_)
            | VoiceError::Config(_)
            | VoiceError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Collapse any failure from a collaborator call into the two service classes:
    /// unreachable (`NetworkUnavailable`) or everything else (`CollaboratorRejected`).
    pub fn into_service_failure(self) -> VoiceError {
        match self {
            VoiceError::NetworkUnavailable(_) | VoiceError::CollaboratorRejected(_) => self,
            other => VoiceError::CollaboratorRejected(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            VoiceError::NetworkUnavailable(err.to_string())
        } else {
            VoiceError::CollaboratorRejected(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(
            VoiceError::DeviceAccessDenied("nope".into()).kind(),
            ErrorKind::DeviceAccessDenied
        );
        assert_eq!(
            VoiceError::NetworkUnavailable("down".into()).kind(),
            ErrorKind::NetworkUnavailable
        );
        assert_eq!(
            VoiceError::CaptureBusy("Recording".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn service_failures_keep_network_class() {
        let net = VoiceError::NetworkUnavailable("refused".into()).into_service_failure();
        assert_eq!(net.kind(), ErrorKind::NetworkUnavailable);

        let other = VoiceError::Config("bad url".into()).into_service_failure();
        assert_eq!(other.kind(), ErrorKind::CollaboratorRejected);
        assert!(other.to_string().contains("bad url"));
    }
}
