//! Error types for the Careline voice engine

use thiserror::Error;

/// Result type alias for voice-session operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur in the voice session engine
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("microphone access denied: {0}")]
    Permission(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio playback error: {0}")]
    Playback(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("audio decode error: {0}")]
    Decode(String),

    #[error("tool execution error: {0}")]
    ToolExecution(String),

    #[error("session timed out: {0}")]
    Timeout(String),

    #[error("channel send error: {0}")]
    ChannelSend(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("summary generation error: {0}")]
    Summary(String),

    #[error("a session is already active")]
    AlreadyActive,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device-access failures worded as permission problems are promoted to
/// `Permission` so `start()` can fail before any other resource is touched.
fn classify_device_error(text: String) -> VoiceError {
    let lower = text.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        VoiceError::Permission(text)
    } else {
        VoiceError::AudioDevice(text)
    }
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        classify_device_error(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        classify_device_error(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        classify_device_error(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_wording_is_classified() {
        let err = classify_device_error("Access denied by the OS".to_string());
        assert!(matches!(err, VoiceError::Permission(_)));

        let err = classify_device_error("no default input device".to_string());
        assert!(matches!(err, VoiceError::AudioDevice(_)));
    }
}
