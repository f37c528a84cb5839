use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::analysis::error::AnalysisError;
use crate::analysis::types::BackendResult;
use crate::recorder::RecordingArtifact;

const TARGET: &str = "analysis";
pub const DEFAULT_ANALYSIS_URL: &str = "http://localhost:3001/save-audio";
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_UPLOAD_FIELD: &str = "audio";
const MAX_DETAIL_CHARS: usize = 512;
const AGENT_TIMEOUT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub field_name: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ANALYSIS_URL.to_string(),
            timeout: DEFAULT_ANALYSIS_TIMEOUT,
            field_name: DEFAULT_UPLOAD_FIELD.to_string(),
        }
    }
}

/// 上传录音并等待分析结果。每个产物只提交一次，失败不自动重试。
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn submit(&self, artifact: &RecordingArtifact) -> Result<BackendResult, AnalysisError>;
}

/// 基于 `ureq` 的阻塞 HTTP 客户端，请求在 blocking 线程池中执行。
#[derive(Debug, Clone)]
pub struct HttpAnalysisClient {
    config: AnalysisConfig,
    agent: ureq::Agent,
}

impl HttpAnalysisClient {
    pub fn new(config: AnalysisConfig) -> Self {
        // 外层 tokio 超时先触发，agent 超时只兜底回收阻塞线程。
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout + AGENT_TIMEOUT_GRACE)
            .build();
        Self { config, agent }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }
}

impl Default for HttpAnalysisClient {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn submit(&self, artifact: &RecordingArtifact) -> Result<BackendResult, AnalysisError> {
        let boundary = multipart_boundary();
        let body = multipart_body(&boundary, &self.config.field_name, artifact);
        let agent = self.agent.clone();
        let endpoint = self.config.endpoint.clone();
        let timeout = self.config.timeout;

        info!(
            target: TARGET,
            endpoint = %endpoint,
            file_name = %artifact.file_name,
            size_bytes = artifact.size(),
            "uploading recording for analysis"
        );

        let started = Instant::now();
        let request = tokio::task::spawn_blocking(move || {
            let response = agent
                .post(&endpoint)
                .set(
                    "Content-Type",
                    &format!("multipart/form-data; boundary={boundary}"),
                )
                .send_bytes(&body);
            match response {
                Ok(response) => response
                    .into_string()
                    .map_err(|err| AnalysisError::MalformedResponse(err.to_string())),
                Err(err) => Err(map_ureq_error(err, timeout)),
            }
        });

        let body = match tokio::time::timeout(timeout, request).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(AnalysisError::unreachable(format!(
                    "upload task aborted: {join_err}"
                )))
            }
            Err(_) => {
                warn!(target: TARGET, ?timeout, "analysis request timed out");
                return Err(AnalysisError::Timeout { after: timeout });
            }
        };

        let result: BackendResult = serde_json::from_str(&body)
            .map_err(|err| AnalysisError::MalformedResponse(err.to_string()))?;
        info!(
            target: TARGET,
            latency = ?started.elapsed(),
            status = result.status.as_deref().unwrap_or("ok"),
            pairs = result.qa_pairs.len(),
            "analysis response received"
        );
        Ok(result)
    }
}

fn map_ureq_error(err: ureq::Error, timeout: Duration) -> AnalysisError {
    match err {
        ureq::Error::Status(status, response) => {
            let details = response
                .into_string()
                .map(|body| rejection_details(&body))
                .unwrap_or_else(|err| err.to_string());
            warn!(target: TARGET, status, details = %details, "analysis rejected upload");
            AnalysisError::Rejected { status, details }
        }
        ureq::Error::Transport(transport) => {
            if is_timeout(&transport) {
                warn!(target: TARGET, ?timeout, "analysis request timed out");
                AnalysisError::Timeout { after: timeout }
            } else {
                warn!(target: TARGET, err = %transport, "analysis service unreachable");
                AnalysisError::unreachable(transport.to_string())
            }
        }
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .map(|err| matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// 优先取出错误体里的 `message`/`error`，否则截断原文。
fn rejection_details(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<RejectionBody>(body) {
        let parts: Vec<String> = [parsed.message, parsed.error]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(": ");
        }
    }
    body.trim().chars().take(MAX_DETAIL_CHARS).collect()
}

fn multipart_boundary() -> String {
    let token: u64 = rand::thread_rng().gen();
    format!("----interview-boundary-{token:016x}")
}

fn multipart_body(boundary: &str, field_name: &str, artifact: &RecordingArtifact) -> Vec<u8> {
    let header = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field_name}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        artifact.file_name, artifact.mime_type
    );
    let footer = format!("\r\n--{boundary}--\r\n");

    let mut body = Vec::with_capacity(header.len() + artifact.size() + footer.len());
    body.extend_from_slice(header.as_bytes());
    body.extend_from_slice(&artifact.data);
    body.extend_from_slice(footer.as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    fn artifact() -> RecordingArtifact {
        let now = Utc::now();
        RecordingArtifact {
            data: Bytes::from_static(b"opus-bytes"),
            file_name: "interview-2024-05-01T10-20-30-123Z.webm".into(),
            mime_type: "audio/webm".into(),
            started_at: now,
            sealed_at: now,
            chunk_count: 1,
        }
    }

    fn read_request(stream: &mut TcpStream) -> Vec<u8> {
        let mut request = Vec::new();
        let mut buffer = [0_u8; 1024];
        loop {
            let read = stream.read(&mut buffer).unwrap_or(0);
            if read == 0 {
                return request;
            }
            request.extend_from_slice(&buffer[..read]);
            let text = String::from_utf8_lossy(&request);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + length {
                    return request;
                }
            }
        }
    }

    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
        let address = listener.local_addr().expect("local addr available");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("client connects");
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("response written");
            request
        });
        (format!("http://{address}/save-audio"), handle)
    }

    fn client(endpoint: String, timeout: Duration) -> HttpAnalysisClient {
        HttpAnalysisClient::new(AnalysisConfig {
            endpoint,
            timeout,
            ..AnalysisConfig::default()
        })
    }

    #[tokio::test]
    async fn uploads_multipart_and_parses_result() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"transcription":"hello","qa_pairs":[{"question":"Q","answer":"A"}]}"#,
        );

        let result = client(endpoint, Duration::from_secs(5))
            .submit(&artifact())
            .await
            .expect("analysis succeeds");

        assert_eq!(result.transcript(), Some("hello"));
        assert_eq!(result.qa_pairs.len(), 1);

        let request = String::from_utf8_lossy(&server.join().expect("server joined")).to_string();
        assert!(request.starts_with("POST /save-audio"));
        assert!(request.contains("multipart/form-data; boundary=----interview-boundary-"));
        assert!(request.contains(
            "name=\"audio\"; filename=\"interview-2024-05-01T10-20-30-123Z.webm\""
        ));
        assert!(request.contains("Content-Type: audio/webm\r\n\r\nopus-bytes\r\n"));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let (endpoint, server) = serve_once(
            "500 Internal Server Error",
            r#"{"message":"Audio saved, but analysis failed.","error":"connect ECONNREFUSED"}"#,
        );

        let err = client(endpoint, Duration::from_secs(5))
            .submit(&artifact())
            .await
            .expect_err("server error surfaces");
        server.join().expect("server joined");

        assert_eq!(
            err,
            AnalysisError::Rejected {
                status: 500,
                details: "Audio saved, but analysis failed.: connect ECONNREFUSED".into(),
            }
        );
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
        let address = listener.local_addr().expect("local addr available");
        drop(listener);

        let err = client(format!("http://{address}/save-audio"), Duration::from_secs(5))
            .submit(&artifact())
            .await
            .expect_err("nothing listening");

        assert_eq!(err.as_str(), "unreachable");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
        let address = listener.local_addr().expect("local addr available");
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("client connects");
            read_request(&mut stream);
            thread::sleep(Duration::from_millis(800));
        });

        let timeout = Duration::from_millis(200);
        let err = client(format!("http://{address}/save-audio"), timeout)
            .submit(&artifact())
            .await
            .expect_err("no response");
        server.join().expect("server joined");

        assert_eq!(err, AnalysisError::Timeout { after: timeout });
    }

    #[tokio::test]
    async fn invalid_json_is_malformed() {
        let (endpoint, server) = serve_once("200 OK", "<html>oops</html>");

        let err = client(endpoint, Duration::from_secs(5))
            .submit(&artifact())
            .await
            .expect_err("html is not a result");
        server.join().expect("server joined");

        assert_eq!(err.as_str(), "malformed_response");
    }

    #[test]
    fn rejection_details_fall_back_to_body() {
        assert_eq!(rejection_details("  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(rejection_details(r#"{"error":"No audio file received"}"#), "No audio file received");
    }
}
