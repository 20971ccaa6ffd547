/// Judge0 Sandbox Client
///
/// Thin HTTP adapter for a Judge0-compatible execution service:
/// - `POST /submissions?base64_encoded=true&wait=false` -> `{token}`
/// - `GET /submissions/{token}?base64_encoded=true` (polled until terminal)
/// - `DELETE /submissions/{token}` (best-effort cleanup)
///
/// **Retry Rules:**
/// - Connection failures, I/O errors, malformed bodies, HTTP 5xx/429:
///   retried with exponential backoff, up to `transport_attempts`
/// - HTTP 4xx: returned immediately as `Rejected`
/// - Provider statuses (time limit, compile error, ...): never retried, they are data

use crate::sandbox::{
    cap_output, ExecutionLimits, Program, ProviderStatus, RawResult, Sandbox, SandboxError, SandboxToken,
};
use async_trait::async_trait;
use autograde_common::config::GradingConfig;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Judge0 status ids that mean "not finished yet" (In Queue, Processing).
const PENDING_STATUS_IDS: [i64; 2] = [1, 2];

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub transport_attempts: u32,
    pub backoff_base: Duration,
    pub poll_interval: Duration,
    pub max_poll: Duration,
    pub max_output_bytes: usize,
}

impl From<&GradingConfig> for ClientSettings {
    fn from(config: &GradingConfig) -> Self {
        Self {
            transport_attempts: config.transport_attempts.max(1),
            backoff_base: config.backoff_base,
            poll_interval: config.poll_interval,
            max_poll: config.max_poll,
            max_output_bytes: config.max_output_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmissionRequest {
    language_id: u32,
    source_code: String,
    stdin: String,
    cpu_time_limit: f64,
    memory_limit: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SubmissionResponse {
    status: Option<ProviderStatus>,
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
    time: Option<serde_json::Value>,
    memory: Option<serde_json::Value>,
    exit_code: Option<i32>,
}

/// Parsed `http://host[:port][/prefix]` of the sandbox service.
#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    port: u16,
    authority: String,
    prefix: String,
}

impl Endpoint {
    fn parse(url: &str) -> Result<Self, SandboxError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| SandboxError::Config(format!("invalid sandbox url {:?}: {}", url, e)))?;

        match uri.scheme_str() {
            Some("http") => {}
            other => {
                return Err(SandboxError::Config(format!(
                    "unsupported sandbox url scheme {:?}, expected http",
                    other
                )))
            }
        }

        let host = uri
            .host()
            .ok_or_else(|| SandboxError::Config(format!("sandbox url {:?} has no host", url)))?
            .to_string();
        let port = uri.port_u16().unwrap_or(80);
        let authority = uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_else(|| host.clone());

        Ok(Self {
            host,
            port,
            authority,
            prefix: uri.path().trim_end_matches('/').to_string(),
        })
    }

    fn path(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }
}

pub struct Judge0Client {
    endpoint: Endpoint,
    settings: ClientSettings,
    /// Tokens submitted but not yet fetched to completion.
    outstanding: DashMap<SandboxToken, Instant>,
}

impl Judge0Client {
    pub fn new(config: &GradingConfig) -> Result<Self, SandboxError> {
        Self::with_settings(&config.sandbox_url, ClientSettings::from(config))
    }

    pub fn with_settings(base_url: &str, settings: ClientSettings) -> Result<Self, SandboxError> {
        Ok(Self {
            endpoint: Endpoint::parse(base_url)?,
            settings,
            outstanding: DashMap::new(),
        })
    }

    pub fn outstanding_tokens(&self) -> Vec<SandboxToken> {
        self.outstanding.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Best-effort deletion of every outstanding submission.
    /// Returns how many deletions the provider acknowledged.
    pub async fn cleanup(&self) -> usize {
        let tokens = self.outstanding_tokens();
        let mut acknowledged = 0;

        for token in tokens {
            self.outstanding.remove(&token);
            let path = self.endpoint.path(&format!("/submissions/{}", token));
            match self.send_once(Method::DELETE, &path, None).await {
                Ok((status, _)) if status.is_success() => acknowledged += 1,
                Ok((status, _)) => debug!(token = %token, status = %status, "Sandbox refused cleanup"),
                Err(reason) => debug!(token = %token, error = %reason, "Sandbox cleanup failed"),
            }
        }

        acknowledged
    }

    /// One HTTP exchange on a fresh connection.
    async fn send_once(&self, method: Method, path: &str, body: Option<String>) -> Result<(StatusCode, Bytes), String> {
        let stream = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(|e| format!("connect to {}: {}", self.endpoint.authority, e))?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| format!("handshake: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "Sandbox connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, self.endpoint.authority.as_str())
            .header(ACCEPT, "application/json");

        let payload = match body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(json))
            }
            None => Full::new(Bytes::new()),
        };

        let request = builder.body(payload).map_err(|e| format!("build request: {}", e))?;
        let response = sender
            .send_request(request)
            .await
            .map_err(|e| format!("send request: {}", e))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| format!("read body: {}", e))?
            .to_bytes();

        Ok((status, bytes))
    }

    /// JSON request with bounded exponential backoff on transport failures.
    /// Returns the decoded body and its raw text.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<(T, String), SandboxError> {
        let attempts = self.settings.transport_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.send_once(method.clone(), path, body.clone()).await {
                Ok((status, bytes)) if status.is_success() => match serde_json::from_slice::<T>(&bytes) {
                    Ok(value) => return Ok((value, String::from_utf8_lossy(&bytes).into_owned())),
                    Err(e) => last_error = format!("malformed response: {}", e),
                },
                Ok((status, _)) if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                    last_error = format!("HTTP {}", status);
                }
                Ok((status, bytes)) => {
                    return Err(SandboxError::Rejected {
                        status: status.as_u16(),
                        body: String::from_utf8_lossy(&bytes).into_owned(),
                    });
                }
                Err(reason) => last_error = reason,
            }

            if attempt < attempts {
                let delay = self.settings.backoff_base * 2u32.saturating_pow(attempt - 1);
                warn!(
                    method = %method,
                    path = path,
                    attempt = attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Sandbox request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(SandboxError::Transport {
            attempts,
            reason: last_error,
        })
    }

    fn to_raw_result(&self, response: SubmissionResponse, raw_payload: String) -> RawResult {
        let status = response.status.unwrap_or(ProviderStatus {
            id: -1,
            description: "missing status".to_string(),
        });
        let max = self.settings.max_output_bytes;
        let [stdout, stderr, compile_output, message] = decode_text_fields([
            response.stdout,
            response.stderr,
            response.compile_output,
            response.message,
        ]);

        RawResult {
            exit_code: response.exit_code,
            stdout: cap_output(stdout, max),
            stderr: cap_output(stderr, max),
            compile_output: cap_output(compile_output, max),
            message: Some(message).filter(|m| !m.is_empty()),
            time_ms: response.time.as_ref().and_then(seconds_to_ms).unwrap_or(0),
            memory_kb: response.memory.as_ref().and_then(json_u64).unwrap_or(0),
            raw_payload: cap_output(raw_payload, max),
            status,
        }
    }
}

fn decode_base64(text: &str) -> Option<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD.decode(compact.as_bytes()).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Decode the text fields of one response together: either every field is
/// base64 or the provider ignored `base64_encoded` and all are kept verbatim.
fn decode_text_fields(fields: [Option<String>; 4]) -> [String; 4] {
    let texts = fields.map(Option::unwrap_or_default);
    let decoded: Option<Vec<String>> = texts.iter().map(|text| decode_base64(text)).collect();
    match decoded.map(<[String; 4]>::try_from) {
        Some(Ok(decoded)) => decoded,
        _ => texts,
    }
}

fn seconds_to_ms(value: &serde_json::Value) -> Option<u64> {
    let secs = match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Some((secs * 1000.0).round().max(0.0) as u64)
}

fn json_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().map(|v| v as u64),
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|v| v as u64)),
        _ => None,
    }
}

#[async_trait]
impl Sandbox for Judge0Client {
    #[instrument(skip(self, program), fields(language_id = program.language_id, source_size = program.source.len()))]
    async fn submit(&self, program: &Program, limits: &ExecutionLimits) -> Result<SandboxToken, SandboxError> {
        let request = SubmissionRequest {
            language_id: program.language_id,
            source_code: general_purpose::STANDARD.encode(&program.source),
            stdin: general_purpose::STANDARD.encode(&program.stdin),
            cpu_time_limit: limits.cpu_time_secs,
            memory_limit: limits.memory_kb,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| SandboxError::Config(format!("encode submission: {}", e)))?;

        let path = self.endpoint.path("/submissions?base64_encoded=true&wait=false");
        let (response, _) = self.request::<TokenResponse>(Method::POST, &path, Some(body)).await?;

        let token = SandboxToken(response.token);
        self.outstanding.insert(token.clone(), Instant::now());
        debug!(token = %token, "Submitted program to sandbox");
        Ok(token)
    }

    #[instrument(skip(self, token), fields(token = %token))]
    async fn fetch(&self, token: &SandboxToken) -> Result<RawResult, SandboxError> {
        let path = self
            .endpoint
            .path(&format!("/submissions/{}?base64_encoded=true", token));
        let started = Instant::now();

        loop {
            let (response, raw) = self.request::<SubmissionResponse>(Method::GET, &path, None).await?;

            let pending = response
                .status
                .as_ref()
                .is_some_and(|s| PENDING_STATUS_IDS.contains(&s.id));

            if !pending {
                self.outstanding.remove(token);
                let result = self.to_raw_result(response, raw);
                info!(
                    token = %token,
                    status_id = result.status.id,
                    status = %result.status.description,
                    time_ms = result.time_ms,
                    memory_kb = result.memory_kb,
                    "Sandbox result ready"
                );
                return Ok(result);
            }

            let waited = started.elapsed();
            if waited >= self.settings.max_poll {
                return Err(SandboxError::PollExhausted {
                    token: token.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, ClassifierRules, StatusVocabulary};
    use crate::languages::{LanguageConfigManager, SUCCESS_MARKER};
    use autograde_common::types::{Language, Outcome, TestUnit};
    use axum::extract::{Path, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-process stand-in for a Judge0 server.
    #[derive(Default)]
    struct MockJudge0 {
        fail_posts: AtomicU32,
        reject_posts: bool,
        malformed_gets: AtomicU32,
        polls_before_done: AtomicU32,
        post_count: AtomicU32,
        get_count: AtomicU32,
        result: Value,
        received: Mutex<Vec<Value>>,
        deleted: Mutex<Vec<String>>,
    }

    async fn create(State(mock): State<Arc<MockJudge0>>, Json(body): Json<Value>) -> Response {
        let n = mock.post_count.fetch_add(1, Ordering::SeqCst);
        if mock.reject_posts {
            return (AxumStatus::UNPROCESSABLE_ENTITY, "language_id is invalid").into_response();
        }
        if mock
            .fail_posts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
        {
            return (AxumStatus::SERVICE_UNAVAILABLE, "busy").into_response();
        }
        mock.received.lock().unwrap().push(body);
        (AxumStatus::CREATED, Json(json!({ "token": format!("tok-{}", n) }))).into_response()
    }

    async fn show(State(mock): State<Arc<MockJudge0>>, Path(_token): Path<String>) -> Response {
        mock.get_count.fetch_add(1, Ordering::SeqCst);
        if mock
            .malformed_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
        {
            return (AxumStatus::OK, "<html>gateway</html>").into_response();
        }
        if mock
            .polls_before_done
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
        {
            return Json(json!({ "status": { "id": 2, "description": "Processing" } })).into_response();
        }
        Json(mock.result.clone()).into_response()
    }

    async fn remove(State(mock): State<Arc<MockJudge0>>, Path(token): Path<String>) -> Response {
        mock.deleted.lock().unwrap().push(token);
        AxumStatus::NO_CONTENT.into_response()
    }

    async fn serve(mock: Arc<MockJudge0>) -> String {
        let app = Router::new()
            .route("/submissions", post(create))
            .route("/submissions/:token", get(show).delete(remove))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fast_settings() -> ClientSettings {
        ClientSettings {
            transport_attempts: 3,
            backoff_base: Duration::from_millis(5),
            poll_interval: Duration::from_millis(5),
            max_poll: Duration::from_secs(2),
            max_output_bytes: 1024,
        }
    }

    fn program() -> Program {
        Program {
            language_id: 71,
            source: "print('hi')".to_string(),
            stdin: String::new(),
        }
    }

    fn limits() -> ExecutionLimits {
        ExecutionLimits {
            cpu_time_secs: 2.0,
            memory_kb: 128_000,
        }
    }

    fn b64(text: &str) -> String {
        general_purpose::STANDARD.encode(text)
    }

    fn accepted(stdout: &str) -> Value {
        json!({
            "status": { "id": 3, "description": "Accepted" },
            "stdout": b64(stdout),
            "stderr": null,
            "compile_output": null,
            "message": null,
            "time": "0.012",
            "memory": 3400,
            "exit_code": 0
        })
    }

    #[tokio::test]
    async fn test_execute_polls_until_terminal_and_decodes() {
        let mock = Arc::new(MockJudge0 {
            polls_before_done: AtomicU32::new(2),
            result: accepted("hi\n"),
            ..Default::default()
        });
        let url = serve(mock.clone()).await;
        let client = Judge0Client::with_settings(&url, fast_settings()).unwrap();

        let result = client.execute(&program(), &limits()).await.unwrap();

        assert_eq!(result.status.id, 3);
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.time_ms, 12);
        assert_eq!(result.memory_kb, 3400);
        assert_eq!(mock.get_count.load(Ordering::SeqCst), 3);
        assert!(client.outstanding_tokens().is_empty());

        let received = mock.received.lock().unwrap();
        assert_eq!(received[0]["language_id"], 71);
        assert_eq!(received[0]["source_code"], b64("print('hi')"));
        assert_eq!(received[0]["memory_limit"], 128_000);
    }

    #[tokio::test]
    async fn test_verbose_passing_unit_keeps_marker() {
        let stdout = format!("{}\n{}\n", "x".repeat(70_000), SUCCESS_MARKER);
        let mock = Arc::new(MockJudge0 {
            result: accepted(&stdout),
            ..Default::default()
        });
        let url = serve(mock.clone()).await;
        let client = Judge0Client::with_settings(&url, fast_settings()).unwrap();

        let raw = client.execute(&program(), &limits()).await.unwrap();
        assert!(raw.stdout.len() < 2048);
        assert!(raw.stdout.contains("[output truncated]"));

        let manager = LanguageConfigManager::builtin();
        let rules = ClassifierRules::from(manager.get_config(&Language::Python).unwrap());
        let unit = TestUnit {
            id: "test_verbose".to_string(),
            order: 0,
            code: String::new(),
            points: 1,
            visible: true,
            label: "test_verbose".to_string(),
            entry: Some("test_verbose".to_string()),
        };
        let result = classify(&raw, &unit, &rules, &StatusVocabulary::judge0());
        assert_eq!(result.outcome, Outcome::Passed);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mock = Arc::new(MockJudge0 {
            fail_posts: AtomicU32::new(2),
            result: accepted(""),
            ..Default::default()
        });
        let url = serve(mock.clone()).await;
        let client = Judge0Client::with_settings(&url, fast_settings()).unwrap();

        let token = client.submit(&program(), &limits()).await.unwrap();

        assert_eq!(token.0, "tok-2");
        assert_eq!(mock.post_count.load(Ordering::SeqCst), 3);
        assert_eq!(client.outstanding_tokens(), vec![token]);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mock = Arc::new(MockJudge0 {
            fail_posts: AtomicU32::new(10),
            ..Default::default()
        });
        let url = serve(mock.clone()).await;
        let client = Judge0Client::with_settings(&url, fast_settings()).unwrap();

        let err = client.submit(&program(), &limits()).await.unwrap_err();

        assert!(matches!(err, SandboxError::Transport { attempts: 3, .. }));
        assert_eq!(mock.post_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mock = Arc::new(MockJudge0 {
            reject_posts: true,
            ..Default::default()
        });
        let url = serve(mock.clone()).await;
        let client = Judge0Client::with_settings(&url, fast_settings()).unwrap();

        let err = client.submit(&program(), &limits()).await.unwrap_err();

        assert!(matches!(err, SandboxError::Rejected { status: 422, .. }));
        assert_eq!(mock.post_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_is_retried() {
        let mock = Arc::new(MockJudge0 {
            malformed_gets: AtomicU32::new(1),
            result: accepted("ok"),
            ..Default::default()
        });
        let url = serve(mock.clone()).await;
        let client = Judge0Client::with_settings(&url, fast_settings()).unwrap();

        let result = client.execute(&program(), &limits()).await.unwrap();

        assert_eq!(result.stdout, "ok");
        assert_eq!(mock.get_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Judge0Client::with_settings(&format!("http://{}", addr), fast_settings()).unwrap();
        let err = client.submit(&program(), &limits()).await.unwrap_err();

        assert!(matches!(err, SandboxError::Transport { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_terminal_statuses_are_not_retried() {
        let mock = Arc::new(MockJudge0 {
            result: json!({
                "status": { "id": 5, "description": "Time Limit Exceeded" },
                "stdout": null,
                "stderr": null,
                "time": "2.001",
                "memory": 1024
            }),
            ..Default::default()
        });
        let url = serve(mock.clone()).await;
        let client = Judge0Client::with_settings(&url, fast_settings()).unwrap();

        let result = client.execute(&program(), &limits()).await.unwrap();

        assert_eq!(result.status.description, "Time Limit Exceeded");
        assert_eq!(result.exit_code, None);
        assert_eq!(mock.get_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_budget_exhaustion_keeps_token_for_cleanup() {
        let mock = Arc::new(MockJudge0 {
            polls_before_done: AtomicU32::new(u32::MAX),
            ..Default::default()
        });
        let url = serve(mock.clone()).await;
        let mut settings = fast_settings();
        settings.max_poll = Duration::from_millis(50);
        let client = Judge0Client::with_settings(&url, settings).unwrap();

        let err = client.execute(&program(), &limits()).await.unwrap_err();
        assert!(matches!(err, SandboxError::PollExhausted { .. }));
        assert_eq!(client.outstanding_tokens().len(), 1);

        let acknowledged = client.cleanup().await;
        assert_eq!(acknowledged, 1);
        assert!(client.outstanding_tokens().is_empty());
        assert_eq!(*mock.deleted.lock().unwrap(), vec!["tok-0".to_string()]);
    }

    #[test]
    fn test_endpoint_requires_http() {
        assert!(matches!(
            Judge0Client::with_settings("https://judge0.example", fast_settings()),
            Err(SandboxError::Config(_))
        ));
        let client = Judge0Client::with_settings("http://judge0:2358/api/", fast_settings()).unwrap();
        assert_eq!(client.endpoint.port, 2358);
        assert_eq!(client.endpoint.path("/submissions"), "/api/submissions");
    }

    #[test]
    fn test_output_fields_decode_per_response() {
        let encoded = decode_text_fields([Some(b64("line1\nline2")), None, Some(b64("warning")), None]);
        assert_eq!(encoded, ["line1\nline2", "", "warning", ""].map(String::from));

        // "abcd" is valid base64 but arrived next to plain text, so it stays as-is
        let plain = decode_text_fields([Some("plain text!".to_string()), Some("abcd".to_string()), None, None]);
        assert_eq!(plain, ["plain text!", "abcd", "", ""].map(String::from));

        assert_eq!(decode_text_fields([None, None, None, None]), ["", "", "", ""].map(String::from));
        assert_eq!(seconds_to_ms(&json!("0.5")), Some(500));
        assert_eq!(seconds_to_ms(&json!(1.25)), Some(1250));
        assert_eq!(json_u64(&json!(2048)), Some(2048));
    }
}
