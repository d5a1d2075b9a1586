use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use super::OpsState;

pub async fn health() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .body(Body::from("ok"))
        .expect("health response should be valid")
}

#[derive(Debug, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub kind: &'static str,
    pub last_run_at: Option<String>,
}

/// Per-source polling status.
pub async fn sources(State(state): State<OpsState>) -> Json<Vec<SourceStatus>> {
    let statuses = state
        .sources
        .iter()
        .map(|source| SourceStatus {
            name: source.name().to_string(),
            kind: source.record_kind().as_str(),
            last_run_at: source.last_run_at().map(|t| t.to_rfc3339()),
        })
        .collect();

    Json(statuses)
}

pub async fn metrics(State(state): State<OpsState>) -> Response {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .expect("metrics response should be valid"),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("metrics error"))
                .expect("metrics error response should be valid")
        }
    }
}
