//! 通话生命周期广播负载定义。

use std::time::SystemTime;

use crate::analysis::{AnalysisError, InterviewReport};
use crate::media::RemoteStream;

/// 通话的阶段划分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Joining,
    WaitingForPeer,
    Negotiating,
    Connected,
    Ended,
    Analyzing,
    Completed,
    Failed,
}

impl CallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::Joining => "joining",
            CallPhase::WaitingForPeer => "waiting_for_peer",
            CallPhase::Negotiating => "negotiating",
            CallPhase::Connected => "connected",
            CallPhase::Ended => "ended",
            CallPhase::Analyzing => "analyzing",
            CallPhase::Completed => "completed",
            CallPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// 生命周期事件的附加信息。
#[derive(Debug, Clone, Default)]
pub enum CallPayload {
    #[default]
    None,
    RemoteStream(RemoteStream),
    Notice(NoticePayload),
    RecordingSealed(RecordingPayload),
    ReportReady(ReportPayload),
    AnalysisFailed(AnalysisFailurePayload),
}

/// 提示信息，展示层按级别渲染。
#[derive(Debug, Clone)]
pub struct NoticePayload {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RecordingPayload {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: usize,
}

/// 分析完成后的报告。
#[derive(Debug, Clone)]
pub struct ReportPayload {
    pub recording_id: u64,
    pub report: InterviewReport,
}

/// 同一段录音只会收到一次失败通知。
#[derive(Debug, Clone)]
pub struct AnalysisFailurePayload {
    pub file_name: String,
    pub error: AnalysisError,
}

/// 生命周期事件。
#[derive(Debug, Clone)]
pub struct CallUpdate {
    pub room: String,
    pub phase: CallPhase,
    pub issued_at: SystemTime,
    pub payload: CallPayload,
}

impl CallUpdate {
    /// 构造一个空载荷的事件。
    pub fn new<S: Into<String>>(room: S, phase: CallPhase) -> Self {
        Self {
            room: room.into(),
            phase,
            issued_at: SystemTime::now(),
            payload: CallPayload::None,
        }
    }

    fn with_payload<S: Into<String>>(room: S, phase: CallPhase, payload: CallPayload) -> Self {
        Self {
            payload,
            ..Self::new(room, phase)
        }
    }

    pub fn remote_stream<S: Into<String>>(room: S, stream: RemoteStream) -> Self {
        Self::with_payload(room, CallPhase::Connected, CallPayload::RemoteStream(stream))
    }

    pub fn notice<S: Into<String>>(
        room: S,
        phase: CallPhase,
        level: NoticeLevel,
        message: impl Into<String>,
    ) -> Self {
        Self::with_payload(
            room,
            phase,
            CallPayload::Notice(NoticePayload {
                level,
                message: message.into(),
            }),
        )
    }

    pub fn recording_sealed<S: Into<String>>(
        room: S,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: usize,
    ) -> Self {
        Self::with_payload(
            room,
            CallPhase::Analyzing,
            CallPayload::RecordingSealed(RecordingPayload {
                file_name: file_name.into(),
                mime_type: mime_type.into(),
                size_bytes,
            }),
        )
    }

    pub fn report_ready<S: Into<String>>(room: S, recording_id: u64, report: InterviewReport) -> Self {
        Self::with_payload(
            room,
            CallPhase::Completed,
            CallPayload::ReportReady(ReportPayload {
                recording_id,
                report,
            }),
        )
    }

    pub fn analysis_failed<S: Into<String>>(
        room: S,
        file_name: impl Into<String>,
        error: AnalysisError,
    ) -> Self {
        Self::with_payload(
            room,
            CallPhase::Failed,
            CallPayload::AnalysisFailed(AnalysisFailurePayload {
                file_name: file_name.into(),
                error,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_helper_sets_completed_phase() {
        let update = CallUpdate::report_ready("observable-abc", 7, InterviewReport::default());

        assert_eq!(update.phase, CallPhase::Completed);
        match update.payload {
            CallPayload::ReportReady(payload) => assert_eq!(payload.recording_id, 7),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn analysis_failure_is_terminal_phase() {
        let update = CallUpdate::analysis_failed(
            "observable-abc",
            "interview.webm",
            AnalysisError::Timeout {
                after: std::time::Duration::from_secs(120),
            },
        );

        assert_eq!(update.phase, CallPhase::Failed);
        assert!(matches!(update.payload, CallPayload::AnalysisFailed(_)));
    }

    #[test]
    fn notice_carries_level() {
        let update = CallUpdate::notice(
            "observable-abc",
            CallPhase::Connected,
            NoticeLevel::Warning,
            "recording unavailable",
        );

        match update.payload {
            CallPayload::Notice(notice) => {
                assert_eq!(notice.level, NoticeLevel::Warning);
                assert_eq!(notice.message, "recording unavailable");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(update.phase.as_str(), "connected");
    }
}
