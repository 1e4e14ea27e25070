use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::handlers::{core_error, AppState, ErrorResponse, HandlerError, ListResponse};
use crate::model::RemoteJob;
use crate::store::traits::Store;

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    /// Restrict to jobs scheduled by this user
    pub user: Option<String>,
    /// true → terminal jobs only, false → live jobs only
    pub done: Option<bool>,
}

pub async fn list_jobs<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<JobListQuery>,
) -> Json<ListResponse<RemoteJob>> {
    let items: Vec<RemoteJob> = state
        .scheduler
        .list_jobs()
        .into_iter()
        .filter(|job| {
            query
                .user
                .as_deref()
                .map(|user| job.user == user)
                .unwrap_or(true)
        })
        .filter(|job| query.done.map(|done| job.is_done() == done).unwrap_or(true))
        .collect();
    let total = items.len();
    Json(ListResponse { items, total })
}

pub async fn get_job<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<RemoteJob>, HandlerError> {
    state.scheduler.get_job(&id).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(&format!("Job '{}' not found", id))),
        )
    })
}

/// Requests cooperative cancellation; a job that already reached a terminal
/// state is removed instead
pub async fn cancel_job<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, HandlerError> {
    state.scheduler.request_cancel(&id).map_err(core_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Drops the job record and its stored result
pub async fn delete_job<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, HandlerError> {
    if state.scheduler.remove_job(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(&format!("Job '{}' not found", id))),
        ))
    }
}

pub async fn get_job_result<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, HandlerError> {
    match state.scheduler.get_result(&id) {
        Some(result) => Ok(Json(result)),
        None if state.scheduler.get_job(&id).is_some() => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(&format!(
                "Job '{}' has no stored result",
                id
            ))),
        )),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(&format!("Job '{}' not found", id))),
        )),
    }
}
