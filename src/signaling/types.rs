use serde::{Deserialize, Serialize};

use crate::signaling::error::SignalingError;

/// 会话描述的类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        }
    }
}

/// 协商双方交换的会话描述（SDP）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// ICE 候选地址。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mline_index: None,
            sdp_mid: None,
        }
    }

    pub fn with_mid(mut self, mid: impl Into<String>, index: u16) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_mline_index = Some(index);
        self
    }
}

/// 信令消息：`{"sdp": {...}}` 或 `{"candidate": {...}}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalingMessage {
    Sdp(SessionDescription),
    Candidate(IceCandidate),
}

impl SignalingMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Sdp(description) => description.sdp_type.as_str(),
            SignalingMessage::Candidate(_) => "candidate",
        }
    }
}

/// 中继上实际发布的负载，附带房间路由信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedPayload {
    pub room: String,
    pub message: SignalingMessage,
}

/// 已解码、带来源标记的入站信令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEnvelope {
    pub room: String,
    pub origin: String,
    pub message: SignalingMessage,
}

/// 信令适配器向会话队列投递的事件。
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// 房间成员变化，携带完整的当前成员列表。
    Members(Vec<String>),
    Message(SignalEnvelope),
    /// 通道失败，本次会话内不可恢复。
    Failed(SignalingError),
}
