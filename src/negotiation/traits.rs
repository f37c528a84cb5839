use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::events::EventSink;
use crate::media::{LocalTrack, RemoteStream};
use crate::signaling::{IceCandidate, SessionDescription};

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// 创建对端连接时使用的配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub ice_servers: Vec<String>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PeerConnectionState::Failed | PeerConnectionState::Closed
        )
    }
}

/// 对端连接产生的回调事件。
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// 本端收集到的 ICE 候选，需要经信令发送给对端。
    LocalCandidate(IceCandidate),
    NegotiationNeeded,
    /// 收到对端的媒体轨道。
    Track(RemoteStream),
    ConnectionState(PeerConnectionState),
}

/// 对端连接的抽象，对应浏览器中的 `RTCPeerConnection`。
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn add_track(&self, track: &LocalTrack) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    fn local_description(&self) -> Option<SessionDescription>;

    fn close(&self);
}

pub trait PeerConnectionFactory: Send + Sync {
    /// 创建连接；连接的回调通过 `events` 投递到会话队列。
    fn create(
        &self,
        config: &PeerConfig,
        events: EventSink<PeerEvent>,
    ) -> Result<Box<dyn PeerConnection>>;
}
