use serde::{Deserialize, Deserializer, Serialize};

/// 分析服务返回的原始结果。
///
/// 同时接受中转服务（`transcription`、`filename`、`path`、`message`）与
/// 分析服务本身（`full_transcript`）的字段命名。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendResult {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub full_transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub qa_pairs: Vec<BackendItem>,
    #[serde(default)]
    pub evaluation_report: Option<EvaluationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl BackendResult {
    pub fn transcript(&self) -> Option<&str> {
        non_empty(self.full_transcript.as_deref()).or(non_empty(self.transcription.as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<BackendItem>,
}

/// 单个问答条目。评分字段只在评估结果中出现。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendItem {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub candidate_answer: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_db_question: Option<String>,
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_relay_response_with_evaluation() {
        let value = json!({
            "message": "Interview processed successfully",
            "filename": "interview-2024-05-01T10-20-30-123Z.webm",
            "path": "/srv/audio/interview-2024-05-01T10-20-30-123Z.webm",
            "transcription": "Tell me about pods. A pod is a container.",
            "qa_pairs": [{"question": "Tell me about pods", "answer": "A pod is a container"}],
            "evaluation_report": {
                "audio_file": null,
                "total_score": 62.5,
                "results": [{
                    "question": "Tell me about pods",
                    "candidate_answer": "A pod is a container",
                    "difficulty": "Easy",
                    "topic": "Kubernetes",
                    "matched_db_question": "What is a pod?",
                    "score": 62,
                    "feedback": "Partially correct."
                }]
            }
        });

        let result: BackendResult = serde_json::from_value(value).expect("parse relay response");

        assert_eq!(result.transcript(), Some("Tell me about pods. A pod is a container."));
        assert_eq!(result.qa_pairs.len(), 1);
        let report = result.evaluation_report.expect("evaluation present");
        assert_eq!(report.total_score, Some(62.5));
        assert_eq!(report.results[0].score, Some(62.0));
        assert_eq!(report.results[0].topic.as_deref(), Some("Kubernetes"));
        assert_eq!(result.qa_pairs[0].score, None);
    }

    #[test]
    fn null_pairs_are_empty() {
        let result: BackendResult =
            serde_json::from_str(r#"{"status":"failed","full_transcript":"","qa_pairs":null}"#)
                .expect("parse failed response");

        assert_eq!(result.status.as_deref(), Some("failed"));
        assert!(result.qa_pairs.is_empty());
        assert!(result.evaluation_report.is_none());
    }

    #[test]
    fn blank_transcript_falls_back_to_relay_field() {
        let result: BackendResult =
            serde_json::from_str(r#"{"full_transcript":"","transcription":"hello"}"#)
                .expect("parse response");
        assert_eq!(result.transcript(), Some("hello"));

        let blank: BackendResult =
            serde_json::from_str(r#"{"full_transcript":" ","transcription":""}"#)
                .expect("parse response");
        assert_eq!(blank.transcript(), None);
    }
}
