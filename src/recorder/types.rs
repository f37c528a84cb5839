use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::media::LocalTrack;

pub const DEFAULT_MIME_PREFERENCES: [&str; 3] = ["audio/webm", "audio/webm;codecs=opus", "audio/mp4"];
pub const DEFAULT_TIMESLICE: Duration = Duration::from_secs(1);
pub const DEFAULT_AUDIO_BITS_PER_SECOND: u32 = 128_000;
const FILE_PREFIX: &str = "interview";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// 按优先级排列的候选编码。
    pub mime_preferences: Vec<String>,
    #[serde(with = "timeslice_ms")]
    pub timeslice: Duration,
    pub audio_bits_per_second: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            mime_preferences: DEFAULT_MIME_PREFERENCES
                .iter()
                .map(|mime| mime.to_string())
                .collect(),
            timeslice: DEFAULT_TIMESLICE,
            audio_bits_per_second: DEFAULT_AUDIO_BITS_PER_SECOND,
        }
    }
}

mod timeslice_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Recording,
    Finalizing,
    Sealed,
    Failed,
}

impl RecorderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Finalizing => "finalizing",
            RecorderState::Sealed => "sealed",
            RecorderState::Failed => "failed",
        }
    }
}

/// 传给编码器的参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub mime_type: String,
    pub timeslice: Duration,
    pub audio_bits_per_second: u32,
}

/// 音频编码器抽象。
///
/// `start` 之后编码器按 `timeslice` 周期把编码好的分片写入 `chunks`；
/// `stop` 返回前必须把最后一个分片写入，之后不再写入。
pub trait AudioEncoder: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn start(
        &self,
        tracks: &[LocalTrack],
        settings: &EncoderSettings,
        chunks: UnboundedSender<Bytes>,
    ) -> anyhow::Result<()>;

    fn stop(&self) -> anyhow::Result<()>;
}

/// 录音结束后封存的只读产物。`data` 克隆开销很小，可同时用于回放和上传。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingArtifact {
    pub data: Bytes,
    pub file_name: String,
    pub mime_type: String,
    pub started_at: DateTime<Utc>,
    pub sealed_at: DateTime<Utc>,
    pub chunk_count: usize,
}

impl RecordingArtifact {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn duration(&self) -> Duration {
        (self.sealed_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn extension(&self) -> &str {
        extension_for(&self.mime_type)
    }
}

/// `audio/webm;codecs=opus` -> `webm`
pub fn extension_for(mime_type: &str) -> &str {
    let subtype = mime_type.split_once('/').map(|(_, rest)| rest).unwrap_or(mime_type);
    subtype.split(';').next().unwrap_or(subtype).trim()
}

/// `interview-2024-05-01T10-20-30-123Z.webm`
pub fn artifact_file_name(sealed_at: DateTime<Utc>, mime_type: &str) -> String {
    let stamp = sealed_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{FILE_PREFIX}-{stamp}.{}", extension_for(mime_type))
}
