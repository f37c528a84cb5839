//! 通话会话：独占持有信令通道、协商状态机、本地采集与录音，
//! 在单个任务内按到达顺序消费事件。

mod config;
mod error;
mod history;
mod lifecycle;

pub use config::{
    CallConfig, DEFAULT_ROOM_PREFIX, DEFAULT_UPDATE_CAPACITY, ENV_ANALYSIS_TIMEOUT_SECS,
    ENV_ANALYSIS_URL, ENV_ICE_SERVERS, ENV_ROOM_PREFIX,
};
pub use error::CallError;
pub use history::{HistoryEntry, HistoryQuery, RecordingHistory, HISTORY_PREVIEW_LIMIT};
pub use lifecycle::{
    AnalysisFailurePayload, CallPayload, CallPhase, CallUpdate, NoticeLevel, NoticePayload,
    RecordingPayload, ReportPayload,
};

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::analysis::{reconcile, AnalysisError, AnalysisService, HttpAnalysisClient};
use crate::events::{event_queue, CallEvent, EventSink};
use crate::media::{LocalTrack, MediaController, MediaDevices, RemoteStream, TrackKind};
use crate::negotiation::{
    NegotiationError, NegotiationState, PeerConnectionFactory, PeerNegotiator,
};
use crate::recorder::{AudioEncoder, RecorderError, RecorderState, RecordingArtifact, SessionRecorder};
use crate::signaling::{ChannelEvent, RelayTransport, RoomId, SignalingChannel, SignalingError};
use crate::telemetry::events::{record_analysis_outcome, record_call_teardown, TeardownStepLog};

const TARGET: &str = "call_session";

pub const STEP_STOP_RECORDER: &str = "stop_recorder";
pub const STEP_CLOSE_PEER: &str = "close_peer";
pub const STEP_CLOSE_CHANNEL: &str = "close_channel";
pub const STEP_RELEASE_MEDIA: &str = "release_media";

/// 用户可触发的通话操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCommand {
    ToggleMic,
    ToggleCamera,
    EndCall,
}

impl CallCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallCommand::ToggleMic => "toggle_mic",
            CallCommand::ToggleCamera => "toggle_camera",
            CallCommand::EndCall => "end_call",
        }
    }
}

/// 会话依赖的外部能力。
#[derive(Clone)]
pub struct CallServices {
    pub relay: Arc<dyn RelayTransport>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub devices: Arc<dyn MediaDevices>,
    pub encoder: Arc<dyn AudioEncoder>,
    pub analysis: Arc<dyn AnalysisService>,
}

impl CallServices {
    /// 按 `config.analysis` 构建 HTTP 分析客户端，环境变量覆盖随之生效。
    pub fn with_http_analysis(
        config: &CallConfig,
        relay: Arc<dyn RelayTransport>,
        peers: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
        encoder: Arc<dyn AudioEncoder>,
    ) -> Self {
        Self {
            relay,
            peers,
            devices,
            encoder,
            analysis: Arc::new(HttpAnalysisClient::new(config.analysis.clone())),
        }
    }
}

/// 可克隆的控制句柄，供展示层发送操作和订阅生命周期。
#[derive(Debug, Clone)]
pub struct CallHandle {
    commands: EventSink<CallCommand>,
    updates: broadcast::Sender<CallUpdate>,
}

impl CallHandle {
    pub fn toggle_mic(&self) -> bool {
        self.send(CallCommand::ToggleMic)
    }

    pub fn toggle_camera(&self) -> bool {
        self.send(CallCommand::ToggleCamera)
    }

    pub fn end_call(&self) -> bool {
        self.send(CallCommand::EndCall)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallUpdate> {
        self.updates.subscribe()
    }

    fn send(&self, command: CallCommand) -> bool {
        let sent = self.commands.emit(command);
        if !sent {
            warn!(target: TARGET, command = command.as_str(), "call session already finished");
        }
        sent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Requested,
    SignalingLost(SignalingError),
    NegotiationFailed(NegotiationError),
}

/// 录音在通话结束后的去向。
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingOutcome {
    NotRecorded,
    Failed(RecorderError),
    Analyzed(HistoryEntry),
    /// 产物仍可回放，是否重新提交由调用方决定。
    AnalysisFailed {
        artifact: RecordingArtifact,
        error: AnalysisError,
    },
}

#[derive(Debug, Clone)]
pub struct CallSummary {
    pub room: String,
    pub reason: EndReason,
    pub teardown: Vec<TeardownStepLog>,
    pub recording: RecordingOutcome,
}

/// 一次通话的聚合根。
pub struct CallSession {
    config: CallConfig,
    room: String,
    services: CallServices,
    events_tx: mpsc::UnboundedSender<CallEvent>,
    events_rx: mpsc::UnboundedReceiver<CallEvent>,
    updates: broadcast::Sender<CallUpdate>,
    history: RecordingHistory,
    channel: Option<SignalingChannel>,
    negotiator: Option<PeerNegotiator>,
    media: MediaController,
    recorder: SessionRecorder,
    tracks: Vec<LocalTrack>,
    phase: CallPhase,
    torn_down: bool,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("room", &self.room)
            .field("phase", &self.phase)
            .field("negotiator", &self.negotiator)
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

impl CallSession {
    pub fn new(
        config: CallConfig,
        room_id: &RoomId,
        services: CallServices,
        history: RecordingHistory,
    ) -> Self {
        let (events_tx, events_rx) = event_queue();
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));
        let room = room_id.room_name(&config.room_prefix);
        let media = MediaController::new(services.devices.clone());
        let recorder = SessionRecorder::new(config.recorder.clone(), services.encoder.clone());

        Self {
            config,
            room,
            services,
            events_tx,
            events_rx,
            updates,
            history,
            channel: None,
            negotiator: None,
            media,
            recorder,
            tracks: Vec::new(),
            phase: CallPhase::Joining,
            torn_down: false,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn history(&self) -> &RecordingHistory {
        &self.history
    }

    pub fn local_id(&self) -> Option<&str> {
        self.channel.as_ref().map(SignalingChannel::client_id)
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiator
            .as_ref()
            .map(PeerNegotiator::state)
            .unwrap_or(NegotiationState::Idle)
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder.state()
    }

    pub fn handle(&self) -> CallHandle {
        CallHandle {
            commands: EventSink::new(self.events_tx.clone()),
            updates: self.updates.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallUpdate> {
        self.updates.subscribe()
    }

    /// 加入房间、采集本地媒体并开始录音。
    ///
    /// 只有信令不可用会让启动失败；采集或录音失败只降级并提示。
    pub async fn start(&mut self) -> Result<(), CallError> {
        if self.channel.is_some() || self.torn_down {
            return Err(CallError::AlreadyStarted);
        }

        info!(target: TARGET, room = %self.room, "starting call");
        let channel = match SignalingChannel::join(
            self.services.relay.clone(),
            &self.room,
            EventSink::new(self.events_tx.clone()),
        )
        .await
        {
            Ok(channel) => channel,
            Err(err) => {
                self.phase = CallPhase::Failed;
                self.publish(CallUpdate::notice(
                    self.room.clone(),
                    CallPhase::Failed,
                    NoticeLevel::Error,
                    err.to_string(),
                ));
                return Err(err.into());
            }
        };

        self.negotiator = Some(PeerNegotiator::new(
            channel.client_id(),
            self.config.peer.clone(),
            self.services.peers.clone(),
            EventSink::new(self.events_tx.clone()),
        ));
        self.channel = Some(channel);

        match self.media.acquire(self.config.media).await {
            Ok(stream) => {
                self.tracks = stream.tracks().to_vec();
                if let Err(err) = self.recorder.start(&stream) {
                    warn!(target: TARGET, %err, "call continues without recording");
                    self.notice(NoticeLevel::Warning, format!("recording unavailable: {err}"));
                }
            }
            Err(err) => {
                warn!(target: TARGET, %err, "call continues without local media");
                self.notice(NoticeLevel::Warning, format!("local media unavailable: {err}"));
            }
        }

        self.set_phase(CallPhase::WaitingForPeer);
        Ok(())
    }

    /// 消费事件直到通话结束，然后拆除资源并提交录音分析。
    pub async fn run(mut self) -> Result<CallSummary, CallError> {
        if self.channel.is_none() {
            if let Err(err) = self.start().await {
                self.teardown();
                return Err(err);
            }
        }

        let reason = loop {
            let Some(event) = self.events_rx.recv().await else {
                break EndReason::Requested;
            };
            if let ControlFlow::Break(reason) = self.dispatch(event).await {
                break reason;
            }
            self.recorder.poll_chunks();
        };

        info!(target: TARGET, room = %self.room, ?reason, "call ending");
        let (teardown, recording) = self.teardown();
        let recording = self.finish_recording(recording).await;

        Ok(CallSummary {
            room: self.room.clone(),
            reason,
            teardown,
            recording,
        })
    }

    async fn dispatch(&mut self, event: CallEvent) -> ControlFlow<EndReason> {
        debug!(target: TARGET, kind = event.kind(), "call event");
        match event {
            CallEvent::Command(command) => self.handle_command(command),
            CallEvent::Channel(ChannelEvent::Failed(err)) => {
                self.notice(NoticeLevel::Error, err.to_string());
                ControlFlow::Break(EndReason::SignalingLost(err))
            }
            CallEvent::Channel(ChannelEvent::Members(members)) => {
                let (Some(negotiator), Some(channel)) =
                    (self.negotiator.as_mut(), self.channel.as_ref())
                else {
                    return ControlFlow::Continue(());
                };
                let result = negotiator
                    .handle_members(&members, &self.tracks, channel)
                    .await;
                if members.len() < 2
                    && matches!(self.phase, CallPhase::Negotiating | CallPhase::Connected)
                {
                    self.notice(NoticeLevel::Info, "remote participant left the room");
                }
                self.after_negotiation(result.map(|()| None))
            }
            CallEvent::Channel(ChannelEvent::Message(envelope)) => {
                let (Some(negotiator), Some(channel)) =
                    (self.negotiator.as_mut(), self.channel.as_ref())
                else {
                    return ControlFlow::Continue(());
                };
                let result = negotiator.handle_signal(envelope, channel).await;
                self.after_negotiation(result.map(|()| None))
            }
            CallEvent::Peer(event) => {
                let (Some(negotiator), Some(channel)) =
                    (self.negotiator.as_mut(), self.channel.as_ref())
                else {
                    return ControlFlow::Continue(());
                };
                let result = negotiator.handle_peer_event(event, channel).await;
                self.after_negotiation(result)
            }
        }
    }

    fn handle_command(&mut self, command: CallCommand) -> ControlFlow<EndReason> {
        let kind = match command {
            CallCommand::EndCall => return ControlFlow::Break(EndReason::Requested),
            CallCommand::ToggleMic => TrackKind::Audio,
            CallCommand::ToggleCamera => TrackKind::Video,
        };

        match self.media.toggle(kind) {
            Some(enabled) => {
                info!(target: TARGET, kind = kind.as_str(), enabled, "local track toggled")
            }
            None => debug!(target: TARGET, kind = kind.as_str(), "no local track to toggle"),
        }
        ControlFlow::Continue(())
    }

    fn after_negotiation(
        &mut self,
        result: Result<Option<RemoteStream>, NegotiationError>,
    ) -> ControlFlow<EndReason> {
        match result {
            Ok(Some(stream)) => {
                self.phase = CallPhase::Connected;
                self.publish(CallUpdate::remote_stream(self.room.clone(), stream));
                ControlFlow::Continue(())
            }
            Ok(None) => {
                if self.negotiation_state() == NegotiationState::Negotiating {
                    self.set_phase(CallPhase::Negotiating);
                }
                ControlFlow::Continue(())
            }
            Err(err) => {
                warn!(target: TARGET, %err, "negotiation failed, ending call");
                self.notice(NoticeLevel::Error, err.to_string());
                ControlFlow::Break(EndReason::NegotiationFailed(err))
            }
        }
    }

    /// 依次停止录音、关闭对端连接、关闭信令、释放本地媒体。
    /// 每一步独立执行，未初始化的资源跳过。
    fn teardown(
        &mut self,
    ) -> (
        Vec<TeardownStepLog>,
        Result<Option<RecordingArtifact>, RecorderError>,
    ) {
        let recording_active = self.recorder.is_recording();
        let recording = self.recorder.stop();

        let peer_open = self
            .negotiator
            .as_ref()
            .map(PeerNegotiator::has_connection)
            .unwrap_or(false);
        if let Some(negotiator) = self.negotiator.as_mut() {
            negotiator.close();
        }

        let channel_open = self
            .channel
            .as_ref()
            .map(|channel| !channel.is_closed())
            .unwrap_or(false);
        if let Some(channel) = self.channel.as_ref() {
            channel.close();
        }

        let media_active = self.media.stream().is_some();
        self.media.release();
        self.tracks.clear();

        let steps = vec![
            TeardownStepLog {
                step: STEP_STOP_RECORDER,
                performed: recording_active,
            },
            TeardownStepLog {
                step: STEP_CLOSE_PEER,
                performed: peer_open,
            },
            TeardownStepLog {
                step: STEP_CLOSE_CHANNEL,
                performed: channel_open,
            },
            TeardownStepLog {
                step: STEP_RELEASE_MEDIA,
                performed: media_active,
            },
        ];
        if !self.torn_down {
            record_call_teardown(&self.room, &steps);
            self.torn_down = true;
            if self.phase != CallPhase::Failed {
                self.set_phase(CallPhase::Ended);
            }
        }
        (steps, recording)
    }

    async fn finish_recording(
        &mut self,
        recording: Result<Option<RecordingArtifact>, RecorderError>,
    ) -> RecordingOutcome {
        let artifact = match recording {
            Ok(Some(artifact)) => artifact,
            Ok(None) => return RecordingOutcome::NotRecorded,
            Err(err) => {
                self.notice(NoticeLevel::Warning, format!("recording discarded: {err}"));
                return RecordingOutcome::Failed(err);
            }
        };

        self.phase = CallPhase::Analyzing;
        self.publish(CallUpdate::recording_sealed(
            self.room.clone(),
            artifact.file_name.clone(),
            artifact.mime_type.clone(),
            artifact.size(),
        ));

        let started = Instant::now();
        match self.services.analysis.submit(&artifact).await {
            Ok(result) => {
                let mut report = reconcile(&result);
                report.timestamp.get_or_insert(artifact.sealed_at);
                record_analysis_outcome(
                    &artifact.file_name,
                    "ok",
                    started.elapsed(),
                    report.is_graded(),
                    report.items.len(),
                );
                let entry = self.history.push(artifact, report.clone());
                self.phase = CallPhase::Completed;
                self.publish(CallUpdate::report_ready(self.room.clone(), entry.id, report));
                RecordingOutcome::Analyzed(entry)
            }
            Err(error) => {
                record_analysis_outcome(
                    &artifact.file_name,
                    error.as_str(),
                    started.elapsed(),
                    false,
                    0,
                );
                self.phase = CallPhase::Failed;
                self.publish(CallUpdate::analysis_failed(
                    self.room.clone(),
                    artifact.file_name.clone(),
                    error.clone(),
                ));
                RecordingOutcome::AnalysisFailed { artifact, error }
            }
        }
    }

    fn set_phase(&mut self, phase: CallPhase) {
        if self.phase == phase {
            return;
        }
        debug!(target: TARGET, from = self.phase.as_str(), to = phase.as_str(), "call phase changed");
        self.phase = phase;
        self.publish(CallUpdate::new(self.room.clone(), phase));
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.publish(CallUpdate::notice(self.room.clone(), self.phase, level, message));
    }

    fn publish(&self, update: CallUpdate) {
        if self.updates.send(update).is_err() {
            debug!(target: TARGET, "no lifecycle subscribers");
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if !self.torn_down {
            self.teardown();
        }
    }
}
