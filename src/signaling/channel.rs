use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::EventSink;
use crate::signaling::error::SignalingError;
use crate::signaling::types::{ChannelEvent, RoutedPayload, SignalEnvelope, SignalingMessage};

const TARGET: &str = "signaling";

/// 不透明的发布/订阅中继传输。
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// 打开到中继服务的连接，返回本端在中继上的身份。
    async fn open(&self) -> Result<String>;

    /// 订阅房间，之后的成员变化与消息都投递给 `inbox`。
    async fn subscribe(&self, room: &str, inbox: RelayInbox) -> Result<()>;

    fn publish(&self, room: &str, payload: Value) -> Result<()>;

    fn close(&self);
}

/// 协商层发送信令所需的最小接口。
pub trait SignalSender: Send + Sync {
    fn send(&self, message: &SignalingMessage) -> Result<(), SignalingError>;
}

/// 中继回调的接收端：负责解码、过滤本端消息，并把结果投递到会话队列。
#[derive(Clone)]
pub struct RelayInbox {
    room: Arc<str>,
    local_id: Arc<str>,
    sink: EventSink<ChannelEvent>,
    failed: Arc<AtomicBool>,
}

impl std::fmt::Debug for RelayInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayInbox")
            .field("room", &self.room)
            .field("local_id", &self.local_id)
            .finish_non_exhaustive()
    }
}

impl RelayInbox {
    pub fn new(room: &str, local_id: &str, sink: EventSink<ChannelEvent>) -> Self {
        Self {
            room: Arc::from(room),
            local_id: Arc::from(local_id),
            sink,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn deliver_members(&self, members: Vec<String>) {
        debug!(target: TARGET, room = %self.room, count = members.len(), "member list changed");
        self.sink.emit(ChannelEvent::Members(members));
    }

    pub fn deliver_data(&self, payload: Value, sender: &str) {
        if sender == &*self.local_id {
            debug!(target: TARGET, room = %self.room, "dropping self-authored message");
            return;
        }

        let routed: RoutedPayload = match serde_json::from_value(payload) {
            Ok(routed) => routed,
            Err(err) => {
                warn!(target: TARGET, room = %self.room, %err, "discarding undecodable relay payload");
                return;
            }
        };

        if routed.room != *self.room {
            debug!(
                target: TARGET,
                room = %self.room,
                routed_room = %routed.room,
                "discarding message routed to another room"
            );
            return;
        }

        self.sink.emit(ChannelEvent::Message(SignalEnvelope {
            room: routed.room,
            origin: sender.to_string(),
            message: routed.message,
        }));
    }

    /// 通道错误只上报一次。
    pub fn deliver_error(&self, reason: &str) {
        if self.failed.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(target: TARGET, room = %self.room, reason, "signaling channel failed");
        self.sink
            .emit(ChannelEvent::Failed(SignalingError::unavailable(reason)));
    }
}

/// 信令通道适配器：封装中继的加入、发送与关闭。
pub struct SignalingChannel {
    transport: Arc<dyn RelayTransport>,
    room: String,
    client_id: String,
    closed: AtomicBool,
}

impl std::fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("room", &self.room)
            .field("client_id", &self.client_id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SignalingChannel {
    /// 打开中继并加入房间。打开失败对本次会话是终止性的，不会自动重连。
    pub async fn join(
        transport: Arc<dyn RelayTransport>,
        room: &str,
        sink: EventSink<ChannelEvent>,
    ) -> Result<Self, SignalingError> {
        let client_id = transport.open().await.map_err(|err| {
            warn!(target: TARGET, room, %err, "failed to open relay connection");
            SignalingError::unavailable(err.to_string())
        })?;

        let inbox = RelayInbox::new(room, &client_id, sink);
        if let Err(err) = transport.subscribe(room, inbox).await {
            warn!(target: TARGET, room, %err, "failed to subscribe to room");
            transport.close();
            return Err(SignalingError::unavailable(err.to_string()));
        }

        info!(target: TARGET, room, client_id = %client_id, "joined signaling room");

        Ok(Self {
            transport,
            room: room.to_string(),
            client_id,
            closed: AtomicBool::new(false),
        })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transport.close();
        info!(target: TARGET, room = %self.room, "signaling channel closed");
    }
}

impl SignalSender for SignalingChannel {
    fn send(&self, message: &SignalingMessage) -> Result<(), SignalingError> {
        if self.is_closed() {
            return Err(SignalingError::Closed);
        }

        let payload = serde_json::to_value(RoutedPayload {
            room: self.room.clone(),
            message: message.clone(),
        })
        .map_err(|err| SignalingError::Encode(err.to_string()))?;

        self.transport
            .publish(&self.room, payload)
            .map_err(|err| SignalingError::unavailable(err.to_string()))?;

        debug!(target: TARGET, room = %self.room, kind = message.kind(), "published signaling message");
        Ok(())
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}
