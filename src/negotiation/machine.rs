use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::events::EventSink;
use crate::media::{LocalTrack, RemoteStream};
use crate::negotiation::error::NegotiationError;
use crate::negotiation::state::{NegotiationState, Role, Trigger};
use crate::negotiation::traits::{PeerConfig, PeerConnection, PeerConnectionFactory, PeerEvent};
use crate::signaling::{
    IceCandidate, SdpType, SessionDescription, SignalEnvelope, SignalSender, SignalingMessage,
};
use crate::telemetry::events::record_negotiation_transition;

const TARGET: &str = "negotiation";

/// 远端描述到达前最多缓存的 ICE 候选数，超出的候选直接丢弃。
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// 驱动 offer/answer/ICE 交换、建立唯一一条对端连接的状态机。
///
/// 所有方法都在会话任务内按事件到达顺序调用，连接对象只由这里持有。
pub struct PeerNegotiator {
    local_id: String,
    config: PeerConfig,
    factory: Arc<dyn PeerConnectionFactory>,
    events: EventSink<PeerEvent>,
    state: NegotiationState,
    role: Option<Role>,
    observed_alone: bool,
    connection: Option<Box<dyn PeerConnection>>,
    remote_applied: bool,
    pending_candidates: VecDeque<IceCandidate>,
    pending_offer: Option<SessionDescription>,
    remote_stream: Option<RemoteStream>,
}

impl std::fmt::Debug for PeerNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerNegotiator")
            .field("local_id", &self.local_id)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("pending_candidates", &self.pending_candidates.len())
            .finish_non_exhaustive()
    }
}

impl PeerNegotiator {
    pub fn new(
        local_id: impl Into<String>,
        config: PeerConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        events: EventSink<PeerEvent>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            config,
            factory,
            events,
            state: NegotiationState::Idle,
            role: None,
            observed_alone: false,
            connection: None,
            remote_applied: false,
            pending_candidates: VecDeque::new(),
            pending_offer: None,
            remote_stream: None,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    /// 处理成员列表变化。
    ///
    /// 成员数恰好为 2 时分配角色：本端曾独自在房间里则为 answerer，
    /// 加入时房间已有对端则为 offerer。其它成员数不发起连接。
    pub async fn handle_members(
        &mut self,
        members: &[String],
        tracks: &[LocalTrack],
        signal: &dyn SignalSender,
    ) -> Result<(), NegotiationError> {
        if self.state != NegotiationState::Idle {
            if members.len() < 2 && self.state.has_connection() {
                info!(
                    target: TARGET,
                    members = members.len(),
                    state = self.state.as_str(),
                    "remote peer left the room"
                );
            }
            return Ok(());
        }

        match members.len() {
            2 => {
                let role = if self.observed_alone {
                    Role::Answerer
                } else {
                    Role::Offerer
                };
                self.role = Some(role);
                self.transition(Trigger::MembersReady);
                self.begin(tracks, signal).await
            }
            1 => {
                self.observed_alone = true;
                debug!(target: TARGET, "waiting for remote peer");
                Ok(())
            }
            0 => Ok(()),
            count => {
                warn!(target: TARGET, count, "more than two members, ignoring");
                Ok(())
            }
        }
    }

    async fn begin(
        &mut self,
        tracks: &[LocalTrack],
        signal: &dyn SignalSender,
    ) -> Result<(), NegotiationError> {
        let connection = match self.factory.create(&self.config, self.events.clone()) {
            Ok(connection) => connection,
            Err(err) => return Err(self.fail(NegotiationError::peer(err))),
        };

        for track in tracks {
            if let Err(err) = connection.add_track(track) {
                connection.close();
                return Err(self.fail(NegotiationError::peer(err)));
            }
        }

        self.connection = Some(connection);
        self.transition(Trigger::ConnectionCreated);

        if self.role == Some(Role::Offerer) {
            self.offer_if_needed(signal).await?;
        }

        if let Some(offer) = self.pending_offer.take() {
            self.apply_remote_description(offer, signal).await?;
        }

        Ok(())
    }

    /// 处理入站信令。本端发出的消息一律丢弃。
    pub async fn handle_signal(
        &mut self,
        envelope: SignalEnvelope,
        signal: &dyn SignalSender,
    ) -> Result<(), NegotiationError> {
        if envelope.origin == self.local_id {
            debug!(target: TARGET, kind = envelope.message.kind(), "ignoring loopback message");
            return Ok(());
        }

        if self.state == NegotiationState::Closed {
            debug!(target: TARGET, kind = envelope.message.kind(), "negotiation closed, dropping message");
            return Ok(());
        }

        match envelope.message {
            SignalingMessage::Sdp(description) => {
                self.apply_remote_description(description, signal).await
            }
            SignalingMessage::Candidate(candidate) => {
                self.apply_remote_candidate(candidate).await;
                Ok(())
            }
        }
    }

    /// 处理对端连接回调。首次收到远端轨道时返回远端流。
    pub async fn handle_peer_event(
        &mut self,
        event: PeerEvent,
        signal: &dyn SignalSender,
    ) -> Result<Option<RemoteStream>, NegotiationError> {
        if self.state == NegotiationState::Closed {
            return Ok(None);
        }

        match event {
            PeerEvent::LocalCandidate(candidate) => {
                if let Err(err) = signal.send(&SignalingMessage::Candidate(candidate)) {
                    warn!(target: TARGET, %err, "failed to send local ice candidate");
                }
                Ok(None)
            }
            PeerEvent::NegotiationNeeded => {
                if self.role == Some(Role::Offerer) && self.state == NegotiationState::Negotiating {
                    self.offer_if_needed(signal).await?;
                }
                Ok(None)
            }
            PeerEvent::Track(stream) => {
                if self.state != NegotiationState::Negotiating {
                    debug!(target: TARGET, stream = %stream.id, "additional remote track");
                    return Ok(None);
                }
                self.transition(Trigger::RemoteTrack);
                info!(target: TARGET, stream = %stream.id, "remote stream attached");
                self.remote_stream = Some(stream.clone());
                Ok(Some(stream))
            }
            PeerEvent::ConnectionState(connection_state) => {
                debug!(target: TARGET, state = connection_state.as_str(), "peer connection state");
                if connection_state.is_terminal() && self.state.has_connection() {
                    return Err(self.fail(NegotiationError::ConnectionLost(connection_state)));
                }
                Ok(None)
            }
        }
    }

    /// 关闭连接并释放缓冲的候选。重复调用为空操作。
    pub fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }

        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        let dropped = self.pending_candidates.len();
        self.pending_candidates.clear();
        self.pending_offer = None;
        self.remote_applied = false;
        self.transition(Trigger::Close);
        info!(target: TARGET, dropped_candidates = dropped, "negotiation closed");
    }

    async fn offer_if_needed(&mut self, signal: &dyn SignalSender) -> Result<(), NegotiationError> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        if connection.local_description().is_some() {
            return Ok(());
        }

        let result = async {
            let offer = connection
                .create_offer()
                .await
                .map_err(NegotiationError::peer)?;
            connection
                .set_local_description(offer.clone())
                .await
                .map_err(NegotiationError::peer)?;
            signal.send(&SignalingMessage::Sdp(offer))?;
            Ok::<(), NegotiationError>(())
        }
        .await;

        match result {
            Ok(()) => {
                info!(target: TARGET, "offer sent");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn apply_remote_description(
        &mut self,
        description: SessionDescription,
        signal: &dyn SignalSender,
    ) -> Result<(), NegotiationError> {
        if !self.state.has_connection() {
            if description.is_offer() {
                debug!(target: TARGET, state = self.state.as_str(), "holding early offer");
                self.pending_offer = Some(description);
            } else {
                warn!(
                    target: TARGET,
                    kind = description.sdp_type.as_str(),
                    state = self.state.as_str(),
                    "ignoring description before negotiation"
                );
            }
            return Ok(());
        }

        match description.sdp_type {
            SdpType::Offer => {
                if self.role != Some(Role::Answerer) {
                    warn!(target: TARGET, "offerer received a remote offer, ignoring");
                    return Ok(());
                }

                let result = async {
                    self.set_remote(description).await?;
                    let connection = self.connection_ref()?;
                    let answer = connection
                        .create_answer()
                        .await
                        .map_err(NegotiationError::peer)?;
                    connection
                        .set_local_description(answer.clone())
                        .await
                        .map_err(NegotiationError::peer)?;
                    signal.send(&SignalingMessage::Sdp(answer))?;
                    Ok::<(), NegotiationError>(())
                }
                .await;

                match result {
                    Ok(()) => {
                        info!(target: TARGET, "answer sent");
                        Ok(())
                    }
                    Err(err) => Err(self.fail(err)),
                }
            }
            SdpType::Answer => {
                let has_local_offer = self
                    .connection
                    .as_ref()
                    .and_then(|connection| connection.local_description())
                    .map(|local| local.is_offer())
                    .unwrap_or(false);
                if !has_local_offer || self.remote_applied {
                    warn!(target: TARGET, "unexpected answer, ignoring");
                    return Ok(());
                }

                match self.set_remote(description).await {
                    Ok(()) => {
                        info!(target: TARGET, "answer applied");
                        Ok(())
                    }
                    Err(err) => Err(self.fail(err)),
                }
            }
            other => {
                warn!(target: TARGET, kind = other.as_str(), "unsupported description type");
                Ok(())
            }
        }
    }

    /// 设置远端描述，随后按到达顺序应用缓冲的候选。
    async fn set_remote(&mut self, description: SessionDescription) -> Result<(), NegotiationError> {
        self.connection_ref()?
            .set_remote_description(description)
            .await
            .map_err(NegotiationError::peer)?;
        self.remote_applied = true;

        let buffered: Vec<IceCandidate> = self.pending_candidates.drain(..).collect();
        if !buffered.is_empty() {
            debug!(target: TARGET, count = buffered.len(), "flushing buffered ice candidates");
        }
        for candidate in buffered {
            self.add_candidate(candidate).await;
        }
        Ok(())
    }

    async fn apply_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.connection.is_some() && self.remote_applied {
            self.add_candidate(candidate).await;
        } else if self.pending_candidates.len() >= MAX_PENDING_CANDIDATES {
            warn!(
                target: TARGET,
                limit = MAX_PENDING_CANDIDATES,
                state = self.state.as_str(),
                "pending ice candidate limit reached, dropping candidate"
            );
        } else {
            self.pending_candidates.push_back(candidate);
            debug!(
                target: TARGET,
                buffered = self.pending_candidates.len(),
                "buffering early ice candidate"
            );
        }
    }

    async fn add_candidate(&self, candidate: IceCandidate) {
        if let Some(connection) = self.connection.as_ref() {
            if let Err(err) = connection.add_ice_candidate(candidate).await {
                warn!(target: TARGET, %err, "failed to apply remote ice candidate");
            }
        }
    }

    fn connection_ref(&self) -> Result<&dyn PeerConnection, NegotiationError> {
        self.connection
            .as_deref()
            .ok_or_else(|| NegotiationError::Peer("peer connection missing".to_string()))
    }

    fn fail(&mut self, err: NegotiationError) -> NegotiationError {
        warn!(target: TARGET, %err, state = self.state.as_str(), "negotiation failed");
        self.close();
        err
    }

    fn transition(&mut self, trigger: Trigger) -> bool {
        match self.state.next(trigger) {
            Some(next) => {
                record_negotiation_transition(
                    &self.local_id,
                    self.state.as_str(),
                    next.as_str(),
                    trigger.as_str(),
                    self.role.map(|role| role.as_str()),
                );
                self.state = next;
                true
            }
            None => {
                debug!(
                    target: TARGET,
                    state = self.state.as_str(),
                    trigger = trigger.as_str(),
                    "transition not allowed"
                );
                false
            }
        }
    }
}
