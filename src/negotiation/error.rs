use thiserror::Error;

use crate::negotiation::traits::PeerConnectionState;
use crate::signaling::SignalingError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("peer connection operation failed: {0}")]
    Peer(String),
    #[error("signaling failed during negotiation: {0}")]
    Signaling(#[from] SignalingError),
    #[error("peer connection lost: {}", .0.as_str())]
    ConnectionLost(PeerConnectionState),
}

impl NegotiationError {
    pub fn peer(err: anyhow::Error) -> Self {
        Self::Peer(format!("{err:#}"))
    }
}
