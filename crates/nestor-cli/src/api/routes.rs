//! API controllers
//!
//! Every workflow endpoint answers with a structured report: 2xx when the
//! run succeeded, 500 with the same report when it did not.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use nestor_workflow::{TaggedApp, WorkflowAdvanceStatus, WorkflowInitStatus};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::AppState;
use super::jobs::{JobId, JobKind, QueueError};

type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/builds/{app}", post(build_app))
        .route("/jobs/{id}", get(get_job))
        .route("/workflow/init/{organization}/{app}", post(init_workflow))
        .route("/workflow/progress/{current_step}", post(advance_workflow))
        .route("/workflow/progress/{current_step}/apps", post(advance_tagged_apps));

    Router::new()
        .route("/heartbeat", get(heartbeat))
        .nest("/api", api)
        .with_state(state)
}

/// Monitoring probe, no authentication
async fn heartbeat() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn queue_rejection(err: QueueError) -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"message": err.to_string()}))).into_response()
}

fn accepted(job_id: JobId, message: &str) -> Response {
    (StatusCode::ACCEPTED, Json(json!({"job_id": job_id, "message": message}))).into_response()
}

async fn build_app(State(state): State<SharedState>, Path(app): Path<String>) -> Response {
    tracing::info!(app = %app, "building an application image");

    let context = state.context.clone();
    let submitted = state.jobs.submit(JobKind::Build, async move {
        let image = context.build_app(&app).await.map_err(|e| e.to_string())?;
        serde_json::to_value(image).map_err(|e| e.to_string())
    });

    match submitted {
        Ok(id) => accepted(id, "Build processing"),
        Err(err) => queue_rejection(err),
    }
}

async fn get_job(State(state): State<SharedState>, Path(id): Path<JobId>) -> Response {
    match state.jobs.get(id) {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": format!("job {} not found", id)})),
        )
            .into_response(),
    }
}

async fn init_workflow(
    State(state): State<SharedState>,
    Path((organization, app)): Path<(String, String)>,
) -> Response {
    tracing::debug!(organization = %organization, app = %app, "workflow initialization started");

    match state.context.init_workflow(&organization, &app).await {
        Ok((status, report)) => {
            let (code, message) = match status {
                WorkflowInitStatus::Success => (StatusCode::OK, "Workflow initialization succeeded"),
                WorkflowInitStatus::Fail => (StatusCode::INTERNAL_SERVER_ERROR, "Workflow initialization failed"),
            };
            tracing::info!(organization = %organization, app = %app, report = ?report, "{}", message);
            (
                code,
                Json(json!({
                    "organization": organization,
                    "app": app,
                    "report": report,
                    "message": message,
                })),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!(organization = %organization, app = %app, err = %err, "workflow initialization failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "organization": organization,
                    "app": app,
                    "err": err.to_string(),
                    "message": "Workflow initialization failed",
                })),
            )
                .into_response()
        }
    }
}

fn advance_status(status: WorkflowAdvanceStatus) -> (StatusCode, &'static str) {
    match status {
        WorkflowAdvanceStatus::Success => (StatusCode::OK, "Workflow advance succeeded"),
        WorkflowAdvanceStatus::Fail => (StatusCode::INTERNAL_SERVER_ERROR, "Workflow advance failed"),
    }
}

fn advance_error(current_step: &str, err: impl std::fmt::Display) -> Response {
    tracing::error!(current_step = %current_step, err = %err, "workflow advance failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "current_step": current_step,
            "err": err.to_string(),
            "message": "Workflow advance failed",
        })),
    )
        .into_response()
}

async fn advance_workflow(State(state): State<SharedState>, Path(current_step): Path<String>) -> Response {
    tracing::info!(current_step = %current_step, "workflow advance started");
    let _running = state.advance_lock.lock().await;

    match state.context.advance_workflow(&current_step).await {
        Ok((status, report)) => {
            let (code, message) = advance_status(status);
            tracing::info!(current_step = %current_step, advanced = report.len(), "{}", message);
            (
                code,
                Json(json!({
                    "current_step": current_step,
                    "report": report,
                    "message": message,
                })),
            )
                .into_response()
        }
        Err(err) => advance_error(&current_step, err),
    }
}

#[derive(Debug, Deserialize)]
struct AdvanceAppsRequest {
    tags: Vec<TaggedApp>,

    #[serde(default)]
    sync: bool,
}

async fn advance_tagged_apps(
    State(state): State<SharedState>,
    Path(current_step): Path<String>,
    Json(request): Json<AdvanceAppsRequest>,
) -> Response {
    tracing::info!(current_step = %current_step, apps = request.tags.len(), sync = request.sync, "tagged advance started");

    if !request.sync {
        let job_state = state.clone();
        let submitted = state.jobs.submit(JobKind::Advance, async move {
            let _running = job_state.advance_lock.lock().await;
            let (status, outcomes) = job_state
                .context
                .advance_tagged_apps(&current_step, &request.tags)
                .await
                .map_err(|e| e.to_string())?;

            if status == WorkflowAdvanceStatus::Fail {
                let failed: Vec<&str> = outcomes
                    .iter()
                    .filter(|o| o.status == WorkflowAdvanceStatus::Fail)
                    .map(|o| o.app.as_str())
                    .collect();
                return Err(format!("advance failed for: {}", failed.join(", ")));
            }
            serde_json::to_value(outcomes).map_err(|e| e.to_string())
        });

        return match submitted {
            Ok(id) => accepted(id, "Workflow advance processing"),
            Err(err) => queue_rejection(err),
        };
    }

    let _running = state.advance_lock.lock().await;
    match state
        .context
        .advance_tagged_apps(&current_step, &request.tags)
        .await
    {
        Ok((status, outcomes)) => {
            let (code, message) = advance_status(status);
            (
                code,
                Json(json!({
                    "current_step": current_step,
                    "report": outcomes,
                    "message": message,
                })),
            )
                .into_response()
        }
        Err(err) => advance_error(&current_step, err),
    }
}
