//! 录音上传、分析结果解析与报告归一化。

mod client;
mod error;
mod report;
mod types;

pub use client::{
    AnalysisConfig, AnalysisService, HttpAnalysisClient, DEFAULT_ANALYSIS_TIMEOUT,
    DEFAULT_ANALYSIS_URL, DEFAULT_UPLOAD_FIELD,
};
pub use error::AnalysisError;
pub use report::{reconcile, InterviewReport, QaItem, ScoreBand, DEFAULT_TOPIC};
pub use types::{BackendItem, BackendResult, EvaluationReport};
