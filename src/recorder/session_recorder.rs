use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::media::LocalStream;
use crate::recorder::error::RecorderError;
use crate::recorder::types::{
    artifact_file_name, AudioEncoder, EncoderSettings, RecorderConfig, RecorderState,
    RecordingArtifact,
};
use crate::telemetry::events::{record_recording_failed, record_recording_sealed};

const TARGET: &str = "recorder";

/// 通话期间的音频录制器，一次通话只录一段。
pub struct SessionRecorder {
    config: RecorderConfig,
    encoder: Arc<dyn AudioEncoder>,
    state: RecorderState,
    mime_type: Option<String>,
    started_at: Option<DateTime<Utc>>,
    chunks: Vec<Bytes>,
    receiver: Option<UnboundedReceiver<Bytes>>,
    artifact: Option<RecordingArtifact>,
}

impl std::fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecorder")
            .field("state", &self.state)
            .field("mime_type", &self.mime_type)
            .field("chunks", &self.chunks.len())
            .finish_non_exhaustive()
    }
}

impl SessionRecorder {
    pub fn new(config: RecorderConfig, encoder: Arc<dyn AudioEncoder>) -> Self {
        Self {
            config,
            encoder,
            state: RecorderState::Idle,
            mime_type: None,
            started_at: None,
            chunks: Vec::new(),
            receiver: None,
            artifact: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn artifact(&self) -> Option<&RecordingArtifact> {
        self.artifact.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// 按偏好顺序返回编码器支持的第一个编码。
    pub fn select_mime_type(&self) -> Option<&str> {
        self.config
            .mime_preferences
            .iter()
            .map(String::as_str)
            .find(|mime| self.encoder.is_type_supported(mime))
    }

    /// 开始录制流中的音频轨道。
    pub fn start(&mut self, stream: &LocalStream) -> Result<(), RecorderError> {
        if self.state != RecorderState::Idle {
            return Err(RecorderError::AlreadyStarted);
        }

        let audio = stream.audio_tracks();
        if audio.is_empty() {
            warn!(target: TARGET, stream = stream.id(), "stream has no audio track");
            return Err(RecorderError::NoAudioTrack);
        }

        let Some(mime_type) = self.select_mime_type().map(str::to_string) else {
            warn!(
                target: TARGET,
                candidates = ?self.config.mime_preferences,
                "no supported audio encoding, continuing without recording"
            );
            return Err(RecorderError::UnsupportedEncoding {
                candidates: self.config.mime_preferences.clone(),
            });
        };

        let settings = EncoderSettings {
            mime_type: mime_type.clone(),
            timeslice: self.config.timeslice,
            audio_bits_per_second: self.config.audio_bits_per_second,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(err) = self.encoder.start(&audio, &settings, tx) {
            let error = RecorderError::EncoderFailed(format!("{err:#}"));
            self.state = RecorderState::Failed;
            record_recording_failed(error.to_string());
            return Err(error);
        }

        info!(
            target: TARGET,
            mime_type = %mime_type,
            tracks = audio.len(),
            timeslice = ?self.config.timeslice,
            "recording started"
        );
        self.mime_type = Some(mime_type);
        self.started_at = Some(Utc::now());
        self.receiver = Some(rx);
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// 收取编码器已产出的分片，返回本次新增的非空分片数。
    pub fn poll_chunks(&mut self) -> usize {
        let Some(receiver) = self.receiver.as_mut() else {
            return 0;
        };

        let mut appended = 0;
        loop {
            match receiver.try_recv() {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => {
                    self.chunks.push(chunk);
                    appended += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if appended > 0 {
            debug!(target: TARGET, appended, total = self.chunks.len(), "audio chunks received");
        }
        appended
    }

    /// 停止录制并封存产物。
    ///
    /// 不在录制中时为空操作，返回 `Ok(None)`。
    pub fn stop(&mut self) -> Result<Option<RecordingArtifact>, RecorderError> {
        if self.state != RecorderState::Recording {
            debug!(target: TARGET, state = self.state.as_str(), "stop ignored");
            return Ok(None);
        }

        self.state = RecorderState::Finalizing;
        if let Err(err) = self.encoder.stop() {
            warn!(target: TARGET, err = %format!("{err:#}"), "encoder stop reported an error");
        }
        self.poll_chunks();
        self.receiver = None;

        if self.chunks.is_empty() {
            self.state = RecorderState::Failed;
            record_recording_failed(RecorderError::EmptyRecording.to_string());
            return Err(RecorderError::EmptyRecording);
        }

        let chunk_count = self.chunks.len();
        let mut data = BytesMut::with_capacity(self.chunks.iter().map(Bytes::len).sum());
        for chunk in self.chunks.drain(..) {
            data.extend_from_slice(&chunk);
        }

        let mime_type = self.mime_type.clone().unwrap_or_default();
        let sealed_at = Utc::now();
        let started_at = self.started_at.unwrap_or(sealed_at);
        let artifact = RecordingArtifact {
            data: data.freeze(),
            file_name: artifact_file_name(sealed_at, &mime_type),
            mime_type,
            started_at,
            sealed_at,
            chunk_count,
        };

        record_recording_sealed(
            &artifact.file_name,
            &artifact.mime_type,
            artifact.size(),
            artifact.chunk_count,
            artifact.duration(),
        );
        self.artifact = Some(artifact.clone());
        self.state = RecorderState::Sealed;
        Ok(Some(artifact))
    }
}
