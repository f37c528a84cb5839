//! 通话会话的单一入站事件队列。
//!
//! 信令、对端连接与用户操作都通过 [`EventSink`] 投递到同一个队列，
//! 由 `CallSession` 按到达顺序串行消费。

use std::fmt;

use tokio::sync::mpsc;

use crate::negotiation::PeerEvent;
use crate::session::CallCommand;
use crate::signaling::ChannelEvent;

/// 会话队列中的事件，按来源打标签。
#[derive(Debug, Clone)]
pub enum CallEvent {
    Channel(ChannelEvent),
    Peer(PeerEvent),
    Command(CallCommand),
}

impl CallEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CallEvent::Channel(_) => "channel",
            CallEvent::Peer(_) => "peer",
            CallEvent::Command(_) => "command",
        }
    }
}

impl From<ChannelEvent> for CallEvent {
    fn from(event: ChannelEvent) -> Self {
        CallEvent::Channel(event)
    }
}

impl From<PeerEvent> for CallEvent {
    fn from(event: PeerEvent) -> Self {
        CallEvent::Peer(event)
    }
}

impl From<CallCommand> for CallEvent {
    fn from(command: CallCommand) -> Self {
        CallEvent::Command(command)
    }
}

/// 面向单一事件来源的发送端，投递时自动包装为 [`CallEvent`]。
pub struct EventSink<T> {
    tx: mpsc::UnboundedSender<CallEvent>,
    wrap: fn(T) -> CallEvent,
}

impl<T> EventSink<T>
where
    T: Into<CallEvent>,
{
    pub fn new(tx: mpsc::UnboundedSender<CallEvent>) -> Self {
        Self {
            tx,
            wrap: Into::into,
        }
    }
}

impl<T> EventSink<T> {
    /// 投递事件；队列已关闭时返回 `false`。
    pub fn emit(&self, event: T) -> bool {
        self.tx.send((self.wrap)(event)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            wrap: self.wrap,
        }
    }
}

impl<T> fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

/// 创建会话事件队列。
pub fn event_queue() -> (
    mpsc::UnboundedSender<CallEvent>,
    mpsc::UnboundedReceiver<CallEvent>,
) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::PeerConnectionState;

    #[tokio::test]
    async fn sink_wraps_events_with_their_source() {
        let (tx, mut rx) = event_queue();
        let peer: EventSink<PeerEvent> = EventSink::new(tx.clone());
        let channel: EventSink<ChannelEvent> = EventSink::new(tx);

        assert!(peer.emit(PeerEvent::NegotiationNeeded));
        assert!(channel.emit(ChannelEvent::Members(vec!["a".into()])));
        assert!(peer.emit(PeerEvent::ConnectionState(PeerConnectionState::Connected)));

        let kinds: Vec<&str> = [
            rx.recv().await.expect("first event"),
            rx.recv().await.expect("second event"),
            rx.recv().await.expect("third event"),
        ]
        .iter()
        .map(CallEvent::kind)
        .collect();
        assert_eq!(kinds, vec!["peer", "channel", "peer"]);
    }

    #[test]
    fn emit_reports_closed_queue() {
        let (tx, rx) = event_queue();
        let sink: EventSink<PeerEvent> = EventSink::new(tx);
        drop(rx);

        assert!(sink.is_closed());
        assert!(!sink.emit(PeerEvent::NegotiationNeeded));
    }
}
