use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("signaling relay unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("signaling channel already closed")]
    Closed,
    #[error("invalid room identifier: {0}")]
    InvalidRoom(String),
    #[error("failed to encode signaling message: {0}")]
    Encode(String),
}

impl SignalingError {
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}
