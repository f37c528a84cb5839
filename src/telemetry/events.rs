use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::call";
pub(crate) const EVENT_NEGOTIATION: &str = "negotiation_transition";
pub(crate) const EVENT_RECORDING_SEALED: &str = "recording_sealed";
pub(crate) const EVENT_RECORDING_FAILED: &str = "recording_failed";
pub(crate) const EVENT_ANALYSIS: &str = "analysis_outcome";
pub(crate) const EVENT_TEARDOWN: &str = "call_teardown";

#[derive(Debug, Serialize)]
pub struct NegotiationTransitionEvent<'a> {
    pub local_id: &'a str,
    pub from: &'static str,
    pub to: &'static str,
    pub trigger: &'static str,
    pub role: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct RecordingSealedEvent<'a> {
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub size_bytes: usize,
    pub chunk_count: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct AnalysisOutcomeEvent<'a> {
    pub file_name: &'a str,
    pub outcome: &'a str,
    pub latency_ms: u64,
    pub graded: bool,
    pub item_count: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct TeardownStepLog {
    pub step: &'static str,
    pub performed: bool,
}

#[derive(Debug, Serialize)]
pub struct TeardownEvent<'a> {
    pub room: &'a str,
    pub steps: &'a [TeardownStepLog],
}

pub fn record_negotiation_transition(
    local_id: &str,
    from: &'static str,
    to: &'static str,
    trigger: &'static str,
    role: Option<&'static str>,
) {
    let event = NegotiationTransitionEvent {
        local_id,
        from,
        to,
        trigger,
        role,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_NEGOTIATION,
            from,
            to,
            trigger,
            role = role.unwrap_or("unassigned"),
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_NEGOTIATION,
            %err,
            "failed to encode negotiation transition event"
        ),
    }
}

pub fn record_recording_sealed(
    file_name: &str,
    mime_type: &str,
    size_bytes: usize,
    chunk_count: usize,
    duration: Duration,
) {
    let event = RecordingSealedEvent {
        file_name,
        mime_type,
        size_bytes,
        chunk_count,
        duration_ms: duration_to_ms(duration),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_RECORDING_SEALED,
            file_name,
            size_bytes,
            chunk_count,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_RECORDING_SEALED,
            %err,
            "failed to encode recording sealed event"
        ),
    }
}

pub fn record_recording_failed(reason: impl Into<String>) {
    let reason = reason.into();
    warn!(
        target: TARGET,
        event = EVENT_RECORDING_FAILED,
        reason = %reason,
        "recording produced no artifact"
    );
}

pub fn record_analysis_outcome(
    file_name: &str,
    outcome: &str,
    latency: Duration,
    graded: bool,
    item_count: usize,
) {
    let event = AnalysisOutcomeEvent {
        file_name,
        outcome,
        latency_ms: duration_to_ms(latency),
        graded,
        item_count,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_ANALYSIS,
            file_name,
            outcome,
            latency_ms = event.latency_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_ANALYSIS,
            %err,
            "failed to encode analysis outcome event"
        ),
    }
}

pub fn record_call_teardown(room: &str, steps: &[TeardownStepLog]) {
    let performed = steps.iter().filter(|step| step.performed).count();
    let event = TeardownEvent { room, steps };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_TEARDOWN,
            room,
            performed,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_TEARDOWN,
            %err,
            "failed to encode call teardown event"
        ),
    }
}

pub(crate) fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
