//! In-memory history of finished interview recordings.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::InterviewReport;
use crate::recorder::RecordingArtifact;

/// Preview length surfaced in history lists.
pub const HISTORY_PREVIEW_LIMIT: usize = 120;

/// Query used when listing history entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default = "HistoryQuery::default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl HistoryQuery {
    fn default_limit() -> usize {
        20
    }
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            offset: 0,
        }
    }
}

/// A finished recording with its sealed audio and reconciled report.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: u64,
    pub recorded_at: DateTime<Utc>,
    pub artifact: RecordingArtifact,
    pub report: InterviewReport,
}

impl HistoryEntry {
    pub fn file_name(&self) -> &str {
        &self.artifact.file_name
    }

    pub fn preview(&self) -> String {
        let text = self.report.transcript_text.trim();
        if text.chars().count() <= HISTORY_PREVIEW_LIMIT {
            return text.to_string();
        }
        let mut preview: String = text.chars().take(HISTORY_PREVIEW_LIMIT).collect();
        preview.push('…');
        preview
    }
}

#[derive(Debug, Default)]
struct HistoryState {
    entries: Vec<HistoryEntry>,
    last_id: u64,
}

/// Newest-first list shared between the call session and the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct RecordingHistory {
    state: Arc<Mutex<HistoryState>>,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(target: "call_session", "recording history lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Stores a finished recording and returns the new entry. Ids follow the
    /// millisecond timestamp and stay strictly increasing.
    pub fn push(&self, artifact: RecordingArtifact, report: InterviewReport) -> HistoryEntry {
        let recorded_at = Utc::now();
        let mut state = self.lock();
        let candidate = u64::try_from(recorded_at.timestamp_millis()).unwrap_or_default();
        let id = candidate.max(state.last_id + 1);
        state.last_id = id;
        let entry = HistoryEntry {
            id,
            recorded_at,
            artifact,
            report,
        };
        state.entries.insert(0, entry.clone());
        entry
    }

    pub fn latest(&self) -> Option<HistoryEntry> {
        self.lock().entries.first().cloned()
    }

    pub fn get(&self, id: u64) -> Option<HistoryEntry> {
        self.lock().entries.iter().find(|entry| entry.id == id).cloned()
    }

    pub fn page(&self, query: &HistoryQuery) -> Vec<HistoryEntry> {
        self.lock()
            .entries
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
