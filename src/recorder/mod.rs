//! 通话录音：选择编码、收集分片、封存产物。

mod error;
mod session_recorder;
mod types;

pub use error::RecorderError;
pub use session_recorder::SessionRecorder;
pub use types::{
    artifact_file_name, extension_for, AudioEncoder, EncoderSettings, RecorderConfig,
    RecorderState, RecordingArtifact, DEFAULT_AUDIO_BITS_PER_SECOND, DEFAULT_MIME_PREFERENCES,
    DEFAULT_TIMESLICE,
};
