use crate::error::AppError;
use axum::http::header::{ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub const MODELS_PATH: &str = "/api/v1/models";
pub const CHAT_COMPLETIONS_PATH: &str = "/api/v1/chat/completions";

/// Connection-scoped headers that must not travel past this hop.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Network,
    Http,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamCallError {
    pub kind: UpstreamErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
}

impl UpstreamCallError {
    pub fn new(kind: UpstreamErrorKind, status: Option<StatusCode>, message: String) -> Self {
        Self {
            kind,
            status,
            message,
        }
    }

    pub fn network(err: reqwest::Error) -> Self {
        Self::new(UpstreamErrorKind::Network, None, err.to_string())
    }
}

impl From<UpstreamCallError> for AppError {
    fn from(err: UpstreamCallError) -> Self {
        let code = match err.kind {
            UpstreamErrorKind::Network => "upstream_unreachable",
            UpstreamErrorKind::Http => "upstream_error",
        };
        AppError::internal(code, err.message)
    }
}

/// The single upstream origin plus the `Host` value presented to it.
#[derive(Debug, Clone)]
pub struct UpstreamEndpoint {
    base_url: reqwest::Url,
    host: HeaderValue,
}

impl UpstreamEndpoint {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let base_url = reqwest::Url::parse(raw.trim())
            .map_err(|err| AppError::internal("upstream_url_invalid", format!("{raw}: {err}")))?;
        let hostname = base_url.host_str().ok_or_else(|| {
            AppError::internal("upstream_url_invalid", format!("{raw}: missing host"))
        })?;
        // `port()` is None when the URL uses its scheme's default port.
        let authority = match base_url.port() {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.to_string(),
        };
        let host = HeaderValue::from_str(&authority)
            .map_err(|err| AppError::internal("upstream_url_invalid", err.to_string()))?;
        Ok(Self { base_url, host })
    }

    pub fn url(&self, path: &str) -> String {
        join_url(self.base_url.as_str(), path)
    }

    pub fn host(&self) -> &HeaderValue {
        &self.host
    }
}

/// Copies the caller's headers for the upstream request.
///
/// `Host` is replaced with the upstream's authority, hop-by-hop headers and
/// `Accept-Encoding` are dropped, and `Content-Length` is dropped when the
/// body will be re-serialized. Credentials pass through untouched.
pub fn forward_headers(
    inbound: &HeaderMap,
    endpoint: &UpstreamEndpoint,
    body_rewritten: bool,
) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if *name == HOST || *name == ACCEPT_ENCODING || HOP_BY_HOP_HEADERS.contains(&name.as_str())
        {
            continue;
        }
        if body_rewritten && *name == CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out.insert(HOST, endpoint.host().clone());
    out
}

pub async fn fetch_models(
    client: &reqwest::Client,
    endpoint: &UpstreamEndpoint,
    headers: HeaderMap,
    timeout_ms: u64,
) -> Result<Value, UpstreamCallError> {
    let url = endpoint.url(MODELS_PATH);
    log_outbound("GET", &url, &headers, None);
    let resp = client
        .get(&url)
        .headers(headers)
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await
        .map_err(UpstreamCallError::network)?;
    let status = resp.status();
    let text = resp.text().await.map_err(|err| {
        UpstreamCallError::new(UpstreamErrorKind::Network, Some(status), err.to_string())
    })?;
    if !status.is_success() {
        let detail = extract_error_message(&text).unwrap_or_else(|| status_message(status));
        return Err(UpstreamCallError::new(
            UpstreamErrorKind::Http,
            Some(status),
            format!("upstream status {status}: {detail}"),
        ));
    }
    serde_json::from_str(&text).map_err(|err| {
        UpstreamCallError::new(
            UpstreamErrorKind::Http,
            Some(status),
            format!("upstream model list is not valid JSON: {err}"),
        )
    })
}

/// Sends a chat completion and returns the raw response whatever its status.
///
/// Buffered requests get a total deadline; streaming ones rely on the
/// client's read timeout so long generations are not cut off.
pub async fn send_chat_completion(
    client: &reqwest::Client,
    endpoint: &UpstreamEndpoint,
    headers: HeaderMap,
    body: &Value,
    stream: bool,
    timeout_ms: u64,
) -> Result<reqwest::Response, UpstreamCallError> {
    let url = endpoint.url(CHAT_COMPLETIONS_PATH);
    log_outbound("POST", &url, &headers, Some(body));
    let mut req = client.post(&url).headers(headers).json(body);
    if !stream {
        req = req.timeout(Duration::from_millis(timeout_ms));
    }
    req.send().await.map_err(UpstreamCallError::network)
}

/// Reads a non-2xx response and reduces it to the message shown to callers.
pub async fn read_error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    extract_error_message(&text).unwrap_or_else(|| status_message(status))
}

pub fn extract_error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .get("error")
        .and_then(|v| v.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn status_message(status: StatusCode) -> String {
    format!("upstream returned HTTP {status}")
}

pub fn content_type(resp: &reqwest::Response) -> Option<HeaderValue> {
    resp.headers().get(CONTENT_TYPE).cloned()
}

fn log_outbound(method: &str, url: &str, headers: &HeaderMap, body: Option<&Value>) {
    let header_names: Vec<&str> = headers.keys().map(|name| name.as_str()).collect();
    match body {
        Some(body) => tracing::debug!(
            method,
            url,
            headers = ?header_names,
            model = body.get("model").and_then(|v| v.as_str()).unwrap_or(""),
            stream = body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false),
            "forwarding request upstream"
        ),
        None => tracing::debug!(method, url, headers = ?header_names, "forwarding request upstream"),
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}
