use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::types::{non_empty, BackendItem, BackendResult};

pub const DEFAULT_TOPIC: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Strong,
    Fair,
    Weak,
    Unscored,
}

impl ScoreBand {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            Some(score) if score >= 80.0 => ScoreBand::Strong,
            Some(score) if score >= 50.0 => ScoreBand::Fair,
            Some(_) => ScoreBand::Weak,
            None => ScoreBand::Unscored,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreBand::Strong => "strong",
            ScoreBand::Fair => "fair",
            ScoreBand::Weak => "weak",
            ScoreBand::Unscored => "unscored",
        }
    }
}

/// 归一化后的问答条目。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QaItem {
    Graded {
        question: String,
        answer_text: String,
        topic: String,
        difficulty: Option<String>,
        score: Option<f64>,
        feedback: Option<String>,
    },
    Ungraded {
        question: String,
        answer_text: String,
    },
}

impl QaItem {
    pub fn question(&self) -> &str {
        match self {
            QaItem::Graded { question, .. } | QaItem::Ungraded { question, .. } => question,
        }
    }

    pub fn answer_text(&self) -> &str {
        match self {
            QaItem::Graded { answer_text, .. } | QaItem::Ungraded { answer_text, .. } => {
                answer_text
            }
        }
    }

    pub fn is_graded(&self) -> bool {
        matches!(self, QaItem::Graded { .. })
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            QaItem::Graded { score, .. } => *score,
            QaItem::Ungraded { .. } => None,
        }
    }

    pub fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.score())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterviewReport {
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub transcript_text: String,
    pub items: Vec<QaItem>,
    /// 只有评估结果完整时才有值。
    pub total_score: Option<f64>,
}

impl InterviewReport {
    pub fn is_graded(&self) -> bool {
        self.total_score.is_some()
    }

    pub fn graded_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_graded()).count()
    }

    pub fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.total_score)
    }
}

/// 把后端结果归一化为报告。纯函数，对任何可解析的结果都不会失败。
pub fn reconcile(result: &BackendResult) -> InterviewReport {
    let graded = result.evaluation_report.as_ref().and_then(|report| {
        match (report.total_score, report.results.is_empty()) {
            (Some(total), false) => Some((total, &report.results)),
            _ => None,
        }
    });

    let (items, total_score) = match graded {
        Some((total, results)) => (results.iter().map(graded_item).collect(), Some(total)),
        None => (result.qa_pairs.iter().map(ungraded_item).collect(), None),
    };

    InterviewReport {
        timestamp: result
            .timestamp
            .as_deref()
            .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
            .map(|stamp| stamp.with_timezone(&Utc)),
        status: result.status.clone(),
        transcript_text: result.transcript().unwrap_or_default().to_string(),
        items,
        total_score,
    }
}

fn graded_item(item: &BackendItem) -> QaItem {
    QaItem::Graded {
        question: item.question.clone(),
        answer_text: first_answer(&[&item.candidate_answer, &item.answer]),
        topic: non_empty(item.topic.as_deref())
            .unwrap_or(DEFAULT_TOPIC)
            .to_string(),
        difficulty: non_empty(item.difficulty.as_deref()).map(str::to_string),
        score: item.score,
        feedback: non_empty(item.feedback.as_deref()).map(str::to_string),
    }
}

fn ungraded_item(item: &BackendItem) -> QaItem {
    QaItem::Ungraded {
        question: item.question.clone(),
        answer_text: first_answer(&[&item.answer, &item.candidate_answer]),
    }
}

fn first_answer(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .find_map(|candidate| non_empty(candidate.as_deref()))
        .unwrap_or_default()
        .to_string()
}
