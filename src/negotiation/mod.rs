//! 对端协商状态机。

mod error;
mod machine;
mod state;
mod traits;

pub use error::NegotiationError;
pub use machine::{PeerNegotiator, MAX_PENDING_CANDIDATES};
pub use state::{NegotiationState, Role, Trigger};
pub use traits::{
    PeerConfig, PeerConnection, PeerConnectionFactory, PeerConnectionState, PeerEvent,
    DEFAULT_STUN_SERVER,
};

#[cfg(test)]
pub(crate) mod tests;
