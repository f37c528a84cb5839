//! 信令通道适配层。

mod channel;
mod error;
mod relay;
mod room;
mod types;

pub use channel::{RelayInbox, RelayTransport, SignalSender, SignalingChannel};
pub use error::SignalingError;
pub use relay::{LocalRelay, LocalRelayHub};
pub use room::RoomId;
pub use types::{
    ChannelEvent, IceCandidate, RoutedPayload, SdpType, SessionDescription, SignalEnvelope,
    SignalingMessage,
};

#[cfg(test)]
mod tests;
