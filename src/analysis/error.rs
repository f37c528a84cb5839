use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis did not finish within {after:?}")]
    Timeout { after: Duration },
    #[error("analysis service unreachable: {reason}")]
    Unreachable { reason: String },
    #[error("analysis rejected with status {status}: {details}")]
    Rejected { status: u16, details: String },
    #[error("analysis response malformed: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisError::Timeout { .. } => "timeout",
            AnalysisError::Unreachable { .. } => "unreachable",
            AnalysisError::Rejected { .. } => "rejected",
            AnalysisError::MalformedResponse(_) => "malformed_response",
        }
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
        }
    }
}
