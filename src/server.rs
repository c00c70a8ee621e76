#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Read-only HTTP access to generated reports.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::review::{ReportEntry, ReportStore};

/// Errors returned by the report endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Nothing stored under the requested key.
    #[error("{0}")]
    NotFound(String),
    /// The report directory could not be read.
    #[error("{0:#}")]
    Store(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(err) => {
                tracing::error!("Report store error: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Body of `GET /api/feedback/{student_id}`.
#[derive(Debug, Serialize)]
struct FeedbackList {
    /// Requested student.
    student_id: String,
    /// Number of reports.
    count:      usize,
    /// Reports, sorted by assignment.
    feedbacks:  Vec<ReportEntry>,
}

/// Body of `GET /api/feedback/{student_id}/{assignment}`.
#[derive(Debug, Serialize)]
struct FeedbackContent {
    /// Requested student.
    student_id: String,
    /// Requested assignment.
    assignment: String,
    /// Report markdown.
    content:    String,
}

/// Body of `GET /api/students`.
#[derive(Debug, Serialize)]
struct StudentList {
    /// Number of students.
    count:    usize,
    /// Sorted student identifiers.
    students: Vec<String>,
}

/// Builds the report routes over `store`.
pub fn router(store: ReportStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/students", get(students))
        .route("/api/feedback/{student_id}", get(feedback_list))
        .route("/api/feedback/{student_id}/{assignment}", get(feedback_content))
        .with_state(Arc::new(store))
}

/// Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Every student with at least one report.
async fn students(State(store): State<Arc<ReportStore>>) -> Result<Json<StudentList>, ApiError> {
    let students = store.students()?;
    Ok(Json(StudentList {
        count: students.len(),
        students,
    }))
}

/// Reports of one student.
async fn feedback_list(
    State(store): State<Arc<ReportStore>>,
    Path(student_id): Path<String>,
) -> Result<Json<FeedbackList>, ApiError> {
    let feedbacks = store.list_for_student(&student_id)?;
    if feedbacks.is_empty() {
        return Err(ApiError::NotFound(format!("No feedback found for student {student_id}")));
    }

    Ok(Json(FeedbackList {
        student_id,
        count: feedbacks.len(),
        feedbacks,
    }))
}

/// One report's content.
async fn feedback_content(
    State(store): State<Arc<ReportStore>>,
    Path((student_id, assignment)): Path<(String, String)>,
) -> Result<Json<FeedbackContent>, ApiError> {
    let content = store.fetch(&student_id, &assignment)?.ok_or_else(|| {
        ApiError::NotFound(format!("No feedback for student {student_id} on {assignment}"))
    })?;

    Ok(Json(FeedbackContent {
        student_id,
        assignment,
        content,
    }))
}

/// Serves the report routes on an already bound listener until the process
/// stops.
pub async fn serve_listener(listener: TcpListener, store: ReportStore) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    tracing::info!("Serving reports from {} on http://{addr}", store.dir().display());
    axum::serve(listener, router(store))
        .await
        .context("Report server stopped with an error")
}

/// Binds `addr` and serves the report routes.
pub async fn serve(store: ReportStore, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind {addr}"))?;
    serve_listener(listener, store).await
}
