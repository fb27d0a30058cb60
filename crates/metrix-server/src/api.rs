use crate::ingest::IngestError;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrix_common::signing::HASH_HEADER;
use serde::Serialize;
use std::fmt::Write;

/// Error body for every failed request.
#[derive(Serialize)]
pub struct ApiError {
    pub err_msg: String,
    pub trace_id: String,
}

pub fn error_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

fn ingest_error(err: IngestError, trace_id: &str) -> Response {
    let status = err.status();
    tracing::warn!(trace_id = %trace_id, status = status.as_u16(), error = %err, "Ingest refused");
    error_response(status, trace_id, &err.to_string())
}

fn signature(headers: &HeaderMap) -> Option<&str> {
    headers.get(HASH_HEADER).and_then(|v| v.to_str().ok())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/ping", get(ping))
        .route("/update/", post(update_json))
        .route("/updates/", post(update_batch))
        .route("/value/", post(value_json))
        .route("/update/{kind}/{name}/{value}", post(update_text))
        .route("/value/{kind}/{name}", get(value_text))
}

/// HTML list of every stored metric id.
async fn list_metrics(State(state): State<AppState>) -> Html<String> {
    let mut page = String::from("<html><body><ul>\n");
    for id in state.store().list() {
        let _ = writeln!(page, "<li>{}</li>", escape_html(&id));
    }
    page.push_str("</ul></body></html>\n");
    Html(page)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn ping(State(state): State<AppState>, Extension(trace_id): Extension<TraceId>) -> Response {
    let Some(persistence) = state.pipeline.persistence() else {
        return (StatusCode::OK, "pong").into_response();
    };
    match persistence.ping().await {
        Ok(()) => (StatusCode::OK, "pong").into_response(),
        Err(e) => {
            tracing::error!(trace_id = %trace_id.0, error = %e, "Storage ping failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &trace_id, &e.to_string())
        }
    }
}

async fn update_json(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.pipeline.ingest_one(&body, signature(&headers)).await {
        Ok(metric) => (StatusCode::OK, Json(metric)).into_response(),
        Err(e) => ingest_error(e, &trace_id),
    }
}

async fn update_batch(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.pipeline.ingest_batch(&body, signature(&headers)).await {
        Ok(metrics) => (StatusCode::OK, Json(metrics)).into_response(),
        Err(e) => ingest_error(e, &trace_id),
    }
}

async fn value_json(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.pipeline.lookup(&body, signature(&headers)) {
        Ok(found) => (StatusCode::OK, Json(found)).into_response(),
        Err(e) => ingest_error(e, &trace_id),
    }
}

async fn update_text(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    match state.pipeline.ingest_raw(&kind, &name, &value).await {
        Ok(metric) => text(StatusCode::OK, metric.text_value().to_string()),
        Err(e) => ingest_error(e, &trace_id),
    }
}

async fn value_text(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    match state.store().get_typed(&name, &kind) {
        Ok(metric) => text(StatusCode::OK, metric.text_value().to_string()),
        Err(e) => ingest_error(e.into(), &trace_id),
    }
}

fn text(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
