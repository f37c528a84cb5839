use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::events::EventSink;
use crate::media::LocalTrack;
use crate::negotiation::{PeerConfig, PeerConnection, PeerConnectionFactory, PeerEvent};
use crate::signaling::{
    IceCandidate, SdpType, SessionDescription, SignalSender, SignalingError, SignalingMessage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PeerCall {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
    AddCandidate(String),
    Close,
}

#[derive(Default)]
struct MockPeerInner {
    calls: Mutex<Vec<PeerCall>>,
    local: Mutex<Option<SessionDescription>>,
    fail_remote: AtomicBool,
    events: Mutex<Option<EventSink<PeerEvent>>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockPeer {
    inner: Arc<MockPeerInner>,
}

impl MockPeer {
    fn record(&self, call: PeerCall) {
        self.inner
            .calls
            .lock()
            .expect("peer calls lock poisoned")
            .push(call);
    }

    pub(crate) fn calls(&self) -> Vec<PeerCall> {
        self.inner
            .calls
            .lock()
            .expect("peer calls lock poisoned")
            .clone()
    }

    pub(crate) fn count(&self, call: &PeerCall) -> usize {
        self.calls().iter().filter(|made| *made == call).count()
    }

    pub(crate) fn fail_remote_description(&self) {
        self.inner.fail_remote.store(true, Ordering::SeqCst);
    }

    /// 模拟连接回调。
    pub(crate) fn emit(&self, event: PeerEvent) -> bool {
        self.inner
            .events
            .lock()
            .expect("peer events lock poisoned")
            .as_ref()
            .map(|sink| sink.emit(event))
            .unwrap_or(false)
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    fn add_track(&self, track: &LocalTrack) -> Result<()> {
        self.record(PeerCall::AddTrack(track.id().to_string()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(PeerCall::CreateOffer);
        Ok(SessionDescription::offer("v=0 offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(PeerCall::CreateAnswer);
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.record(PeerCall::SetLocal(description.sdp_type));
        *self.inner.local.lock().expect("local lock poisoned") = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        if self.inner.fail_remote.load(Ordering::SeqCst) {
            return Err(anyhow!("remote description rejected"));
        }
        self.record(PeerCall::SetRemote(description.sdp_type));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(PeerCall::AddCandidate(candidate.candidate));
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.inner.local.lock().expect("local lock poisoned").clone()
    }

    fn close(&self) {
        self.record(PeerCall::Close);
    }
}

#[derive(Default)]
pub(crate) struct MockPeerFactory {
    peers: Mutex<Vec<MockPeer>>,
    fail: AtomicBool,
}

impl MockPeerFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        let factory = Self::default();
        factory.fail.store(true, Ordering::SeqCst);
        Arc::new(factory)
    }

    pub(crate) fn created(&self) -> usize {
        self.peers.lock().expect("peers lock poisoned").len()
    }

    pub(crate) fn last_peer(&self) -> Option<MockPeer> {
        self.peers.lock().expect("peers lock poisoned").last().cloned()
    }
}

impl PeerConnectionFactory for MockPeerFactory {
    fn create(
        &self,
        _config: &PeerConfig,
        events: EventSink<PeerEvent>,
    ) -> Result<Box<dyn PeerConnection>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("peer connection unsupported"));
        }
        let peer = MockPeer::default();
        *peer.inner.events.lock().expect("peer events lock poisoned") = Some(events);
        self.peers
            .lock()
            .expect("peers lock poisoned")
            .push(peer.clone());
        Ok(Box::new(peer))
    }
}

#[derive(Default)]
pub(crate) struct RecordingSignal {
    sent: Mutex<Vec<SignalingMessage>>,
}

impl RecordingSignal {
    pub(crate) fn sent(&self) -> Vec<SignalingMessage> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }

    pub(crate) fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(SignalingMessage::kind).collect()
    }
}

impl SignalSender for RecordingSignal {
    fn send(&self, message: &SignalingMessage) -> Result<(), SignalingError> {
        self.sent
            .lock()
            .expect("sent lock poisoned")
            .push(message.clone());
        Ok(())
    }
}
