//! Interview Call Core Library
//!
//! This crate provides the core of the interview call flow: two-party call
//! negotiation over a relay channel, local audio recording, upload to the
//! analysis backend, and reconciliation of the backend result into a report.

pub mod analysis;
pub mod events;
pub mod media;
pub mod negotiation;
pub mod recorder;
pub mod session;
pub mod signaling;
pub mod telemetry;

pub use analysis::{
    reconcile, AnalysisConfig, AnalysisError, AnalysisService, BackendResult, HttpAnalysisClient,
    InterviewReport, QaItem, ScoreBand,
};
pub use events::{CallEvent, EventSink};
pub use media::{LocalStream, LocalTrack, MediaConstraints, MediaController, MediaDevices, TrackKind};
pub use negotiation::{NegotiationState, PeerConnection, PeerConnectionFactory, PeerNegotiator, Role};
pub use recorder::{AudioEncoder, RecorderConfig, RecorderState, RecordingArtifact, SessionRecorder};
pub use session::{CallConfig, CallHandle, CallPhase, CallSession, CallUpdate, RecordingHistory};
pub use signaling::{RelayTransport, RoomId, SignalingChannel, SignalingMessage};
