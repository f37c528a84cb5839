use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("stream has no audio track")]
    NoAudioTrack,
    #[error("no supported audio encoding among {candidates:?}")]
    UnsupportedEncoding { candidates: Vec<String> },
    #[error("recording captured no audio")]
    EmptyRecording,
    #[error("recorder already started")]
    AlreadyStarted,
    #[error("audio encoder failed: {0}")]
    EncoderFailed(String),
}

impl RecorderError {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderError::NoAudioTrack => "no_audio_track",
            RecorderError::UnsupportedEncoding { .. } => "unsupported_encoding",
            RecorderError::EmptyRecording => "empty_recording",
            RecorderError::AlreadyStarted => "already_started",
            RecorderError::EncoderFailed(_) => "encoder_failed",
        }
    }
}
