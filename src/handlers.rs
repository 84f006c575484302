use crate::app::AppState;
use crate::catalog;
use crate::error::{AppError, AppResult};
use crate::model_filter;
use crate::relay;
use crate::sanitize;
use crate::synthetic;
use crate::upstream::{self, UpstreamCallError, UpstreamErrorKind};
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use serde_json::Value;
use std::convert::Infallible;

pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let forwarded = upstream::forward_headers(&headers, &state.upstream, false);
    let raw = upstream::fetch_models(
        &state.http,
        &state.upstream,
        forwarded,
        state.runtime.request_timeout_ms,
    )
    .await?;
    let models = catalog::parse_upstream(raw)?;

    let filter = model_filter::load_active_filter_async(
        state.runtime.model_filter_file.clone(),
        state.runtime.default_model_filter_file.clone(),
    )
    .await;
    let upstream_count = models.data.len();
    let list = catalog::build_model_list(models, filter.as_ref());
    tracing::debug!(
        upstream_count,
        returned = list.data.len(),
        filtered = filter.is_some(),
        "served model list"
    );
    Ok(Json(list).into_response())
}

pub async fn create_chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let body = parse_completion_body(&body)?;
    let stream = body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);
    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let forwarded = upstream::forward_headers(&headers, &state.upstream, true);
    let resp = upstream::send_chat_completion(
        &state.http,
        &state.upstream,
        forwarded,
        &body,
        stream,
        state.runtime.request_timeout_ms,
    )
    .await?;

    let status = resp.status();
    if !status.is_success() {
        let message = upstream::read_error_message(resp).await;
        tracing::warn!(
            status = status.as_u16(),
            model = %model,
            stream,
            "upstream rejected completion, answering with synthesized message: {message}"
        );
        return Ok(unavailable_response(&model, &message, stream));
    }

    if stream {
        return Ok(relay_stream_response(resp));
    }
    reshape_completion_response(resp).await
}

/// Body must be a JSON object; anything else is a local failure (500).
fn parse_completion_body(raw: &[u8]) -> AppResult<Value> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(AppError::internal(
            "invalid_request_body",
            "request body must be a JSON object",
        )),
        Err(err) => Err(AppError::internal(
            "invalid_request_body",
            format!("request body is not valid JSON: {err}"),
        )),
    }
}

fn unavailable_response(model: &str, message: &str, stream: bool) -> Response {
    if stream {
        let events = [
            Event::default().data(synthetic::error_chunk(model, message).to_string()),
            Event::default().data(sanitize::DONE_SENTINEL),
        ];
        let events = futures_util::stream::iter(events.into_iter().map(Ok::<_, Infallible>));
        return Sse::new(events).into_response();
    }
    (
        StatusCode::OK,
        Json(synthetic::error_completion(model, message)),
    )
        .into_response()
}

fn relay_stream_response(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let content_type = upstream::content_type(&resp)
        .unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));
    let body = Body::from_stream(relay::relay_stream(resp.bytes_stream()));
    let mut out = Response::new(body);
    *out.status_mut() = status;
    let headers = out.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    out
}

async fn reshape_completion_response(resp: reqwest::Response) -> AppResult<Response> {
    let status = resp.status();
    let content_type = upstream::content_type(&resp)
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let bytes = resp.bytes().await.map_err(UpstreamCallError::network)?;
    let mut value: Value = serde_json::from_slice(&bytes).map_err(|err| {
        UpstreamCallError::new(
            UpstreamErrorKind::Http,
            Some(status),
            format!("upstream completion is not valid JSON: {err}"),
        )
    })?;
    sanitize::strip_upstream_fields(&mut value);

    let mut out = Json(value).into_response();
    *out.status_mut() = status;
    out.headers_mut().insert(CONTENT_TYPE, content_type);
    Ok(out)
}
