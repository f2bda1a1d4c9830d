//! HTTP request handlers.

use super::AppState;
use crate::assets;
use crate::dashboard::{ControlError, JobRef};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::path::{Component, Path as FsPath};

const INDEX_TEMPLATE: &str = include_str!("templates/index.html");

// ============================================================================
// Pages
// ============================================================================

pub async fn handle_index() -> impl IntoResponse {
    Html(INDEX_TEMPLATE.replace("{{title}}", "Home Server Dashboard"))
}

pub async fn handle_favicon() -> impl IntoResponse {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <rect x="10" y="20" width="80" height="25" rx="4" fill="#4a90d9"/>
        <rect x="10" y="55" width="80" height="25" rx="4" fill="#4a90d9"/>
        <circle cx="78" cy="32" r="4" fill="#7fdc7f"/>
        <circle cx="78" cy="67" r="4" fill="#7fdc7f"/>
    </svg>"##;

    ([(header::CONTENT_TYPE, "image/svg+xml")], svg)
}

// ============================================================================
// API: Services
// ============================================================================

pub async fn handle_services(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.list_services().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct ControlRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Bodies are parsed leniently: anything unparsable is an empty request.
fn control_request(body: &Bytes) -> ControlRequest {
    serde_json::from_slice(body).unwrap_or_default()
}

pub async fn handle_start(State(state): State<AppState>, body: Bytes) -> Response {
    let req = control_request(&body);
    let name = req.name.unwrap_or_default();
    job_response(state.dashboard.start_service(&name).await)
}

pub async fn handle_stop(State(state): State<AppState>, body: Bytes) -> Response {
    let req = control_request(&body);
    let name = req.name.unwrap_or_default();
    job_response(state.dashboard.stop_service(&name).await)
}

pub async fn handle_start_all(State(state): State<AppState>) -> Response {
    jobs_response(state.dashboard.start_all().await)
}

pub async fn handle_stop_all(State(state): State<AppState>) -> Response {
    jobs_response(state.dashboard.stop_all().await)
}

fn job_response(result: Result<String, ControlError>) -> Response {
    match result {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(json!({ "ok": true, "job_id": job_id }))).into_response(),
        Err(e) => control_error(e),
    }
}

fn jobs_response(result: Result<Vec<JobRef>, ControlError>) -> Response {
    match result {
        Ok(jobs) => (StatusCode::ACCEPTED, Json(json!({ "ok": true, "jobs": jobs }))).into_response(),
        Err(e) => control_error(e),
    }
}

fn control_error(e: ControlError) -> Response {
    let status = match &e {
        ControlError::NotFound(_) => StatusCode::NOT_FOUND,
        ControlError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ControlError::Storage(err) => {
            tracing::error!("Failed to submit job: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ControlError::PartialSubmit { submitted, .. } => {
            let body = json!({ "ok": false, "error": e.to_string(), "jobs": submitted });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };
    (status, Json(json!({ "ok": false, "error": e.to_string() }))).into_response()
}

// ============================================================================
// API: Jobs
// ============================================================================

pub async fn handle_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.dashboard.get_job(&id) {
        Ok(Some(job)) => Json(json!({ "ok": true, "job": job })).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "job not found" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to read job {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": "job store unavailable" })),
            )
                .into_response()
        }
    }
}

pub async fn handle_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.in_flight_jobs().await)
}

// ============================================================================
// Images
// ============================================================================

pub async fn handle_image(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let rel = FsPath::new(&path);
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let mime = mime_guess::from_path(rel).first_or_octet_stream();

    if let Some(root) = &state.config.service_root {
        if let Ok(data) = tokio::fs::read(root.join("images").join(rel)).await {
            return ([(header::CONTENT_TYPE, mime.to_string())], data).into_response();
        }
    }

    match assets::image(&path) {
        Some(data) => ([(header::CONTENT_TYPE, mime.to_string())], data.into_owned()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
