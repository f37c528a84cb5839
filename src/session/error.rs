use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::media::MediaError;
use crate::negotiation::NegotiationError;
use crate::recorder::RecorderError;
use crate::signaling::SignalingError;

/// 通话层统一错误。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("call already started")]
    AlreadyStarted,
    #[error("call not started")]
    NotStarted,
}
