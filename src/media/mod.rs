//! 本地音视频采集控制。
//!
//! 采集 API 本身由 [`MediaDevices`] 的实现提供；这里只负责持有轨道、
//! 切换启用状态以及在通话结束时释放。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const TARGET: &str = "media";

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("media permission denied")]
    PermissionDenied,
    #[error("capture device unavailable: {reason}")]
    DeviceUnavailable { reason: String },
    #[error("a capture is already active for this call")]
    CaptureActive,
}

impl MediaError {
    pub fn device_unavailable<S: Into<String>>(reason: S) -> Self {
        Self::DeviceUnavailable {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// 本地采集轨道。克隆共享同一份启用/停止状态。
#[derive(Debug, Clone)]
pub struct LocalTrack {
    id: Arc<str>,
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind) -> Self {
        let index = NEXT_TRACK_ID.fetch_add(1, Ordering::SeqCst);
        Self::with_id(format!("{}-{index}", kind.as_str()), kind)
    }

    pub fn with_id(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: Arc::from(id.into()),
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// 仅翻转启用标记，轨道保持挂载，不触发重新协商。
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct LocalStream {
    id: Arc<str>,
    tracks: Vec<LocalTrack>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, tracks: Vec<LocalTrack>) -> Self {
        Self {
            id: Arc::from(id.into()),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(move |track| track.kind() == kind)
    }

    pub fn audio_tracks(&self) -> Vec<LocalTrack> {
        self.tracks_of(TrackKind::Audio).cloned().collect()
    }

    pub fn video_tracks(&self) -> Vec<LocalTrack> {
        self.tracks_of(TrackKind::Video).cloned().collect()
    }
}

/// 远端媒体流，交给展示层渲染。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
    pub track_ids: Vec<String>,
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: MediaConstraints)
        -> Result<LocalStream, MediaError>;
}

/// 每个通话唯一的采集控制器。
pub struct MediaController {
    devices: Arc<dyn MediaDevices>,
    stream: Option<LocalStream>,
}

impl std::fmt::Debug for MediaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaController")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl MediaController {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            stream: None,
        }
    }

    pub async fn acquire(&mut self, constraints: MediaConstraints) -> Result<LocalStream, MediaError> {
        if self.stream.is_some() {
            return Err(MediaError::CaptureActive);
        }

        let stream = self.devices.get_user_media(constraints).await?;
        info!(
            target: TARGET,
            stream = stream.id(),
            audio = stream.tracks_of(TrackKind::Audio).count(),
            video = stream.tracks_of(TrackKind::Video).count(),
            "local media acquired"
        );
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    pub fn stream(&self) -> Option<&LocalStream> {
        self.stream.as_ref()
    }

    /// 设置某类轨道的启用状态。没有采集流时静默忽略并返回 `false`。
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            debug!(target: TARGET, kind = kind.as_str(), "toggle ignored without local stream");
            return false;
        };

        let mut touched = false;
        for track in stream.tracks_of(kind) {
            track.set_enabled(enabled);
            touched = true;
        }
        debug!(target: TARGET, kind = kind.as_str(), enabled, touched, "track enablement updated");
        touched
    }

    /// 翻转某类轨道的启用状态，返回新的状态。
    pub fn toggle(&self, kind: TrackKind) -> Option<bool> {
        let current = self
            .stream
            .as_ref()?
            .tracks_of(kind)
            .next()
            .map(LocalTrack::is_enabled)?;
        let next = !current;
        self.set_enabled(kind, next);
        Some(next)
    }

    pub fn is_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.stream
            .as_ref()?
            .tracks_of(kind)
            .next()
            .map(LocalTrack::is_enabled)
    }

    /// 停止全部轨道。未采集时为空操作。
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            for track in stream.tracks() {
                track.stop();
            }
            info!(target: TARGET, stream = stream.id(), "local media released");
        }
    }
}
