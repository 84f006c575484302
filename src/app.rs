use crate::error::{AppError, AppResult};
use crate::upstream::UpstreamEndpoint;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://openrouter.ai";
pub const DEFAULT_MODEL_FILTER_FILE: &str = "filter-models.txt";
/// Upper bound on an inbound request body; completion requests may inline images.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub upstream: Arc<UpstreamEndpoint>,
    pub http: reqwest::Client,
}

/// Process configuration, read once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub upstream_base_url: String,
    /// Only ever set by an explicit `DISABLE_SSL_VERIFY=true`.
    pub disable_tls_verify: bool,
    pub model_filter_file: Option<PathBuf>,
    /// Checked when no explicit filter file is configured.
    pub default_model_filter_file: PathBuf,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            disable_tls_verify: false,
            model_filter_file: None,
            default_model_filter_file: PathBuf::from(DEFAULT_MODEL_FILTER_FILE),
            connect_timeout_ms: 10_000,
            read_timeout_ms: 300_000,
            request_timeout_ms: 600_000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: u64| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        let defaults = Self::default();

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT").unwrap_or_else(|| "8080".to_string());
        let listen = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host.trim(), port.trim())
        } else {
            format!("{}:{}", host.trim(), port.trim())
        };

        Self {
            listen,
            upstream_base_url: var("UPSTREAM_BASE_URL").unwrap_or(defaults.upstream_base_url),
            disable_tls_verify: var("DISABLE_SSL_VERIFY").as_deref() == Some("true"),
            model_filter_file: var("MODEL_FILTER_FILE").map(PathBuf::from),
            default_model_filter_file: defaults.default_model_filter_file,
            connect_timeout_ms: millis("UPSTREAM_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            read_timeout_ms: millis("UPSTREAM_READ_TIMEOUT_MS", defaults.read_timeout_ms),
            request_timeout_ms: millis("UPSTREAM_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
        }
    }
}

pub fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env())
}

pub fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    let upstream = UpstreamEndpoint::parse(&runtime.upstream_base_url)?;

    if runtime.disable_tls_verify {
        tracing::warn!("upstream TLS certificate verification is disabled");
    }

    // Streams are bounded by the read timeout only; buffered calls add a
    // per-request deadline in `upstream`.
    let http = reqwest::Client::builder()
        .user_agent(concat!("orproxy/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_millis(runtime.connect_timeout_ms))
        .read_timeout(Duration::from_millis(runtime.read_timeout_ms))
        .danger_accept_invalid_certs(runtime.disable_tls_verify)
        .build()
        .map_err(|err| AppError::internal("http_client_init_failed", err.to_string()))?;

    Ok(AppState {
        runtime: Arc::new(runtime),
        upstream: Arc::new(upstream),
        http,
    })
}

pub fn build_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/v1/models", get(crate::handlers::list_models))
        .route(
            "/v1/chat/completions",
            post(crate::handlers::create_chat_completions),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(TraceLayer::new_for_http())
}
