use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::jobs::JobScheduler;
use crate::logic::errors::CoreError;
use crate::logic::versioning::VersioningCoordinator;
use crate::model::{
    effective_time_from_date, Resource, UserContext, VersionRecord, VersionRequest,
};
use crate::store::traits::Store;

/// Shared handler state: storage, the job scheduler and the versioning
/// coordinator, all injected at startup
pub struct AppState<S> {
    pub store: Arc<S>,
    pub scheduler: Arc<JobScheduler>,
    pub coordinator: Arc<VersioningCoordinator<S>>,
}

// Manual impl: `S` itself is behind an Arc and need not be Clone
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            scheduler: Arc::clone(&self.scheduler),
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

pub type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Maps the core failure taxonomy onto HTTP statuses
pub fn core_error(error: CoreError) -> HandlerError {
    let status = match &error {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Locked(_) => StatusCode::LOCKED,
        CoreError::Canceled => StatusCode::CONFLICT,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(&error.to_string())))
}

fn internal_error(error: anyhow::Error) -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(&error.to_string())),
    )
}

// ---------- Resources ----------

pub async fn list_resources<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<ListResponse<Resource>>, HandlerError> {
    let items = state.store.list_resources().await.map_err(internal_error)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

pub async fn get_resource<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Resource>, HandlerError> {
    state
        .store
        .get_resource(&id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(&format!("Resource '{}' not found", id))),
            )
        })
}

pub async fn upsert_resource<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(mut resource): RequestJson<Resource>,
) -> Result<(StatusCode, Json<Resource>), HandlerError> {
    resource.updated_by = user.user_id.clone();
    resource.updated_at = chrono::Utc::now().to_rfc3339();
    state
        .store
        .upsert_resource(resource.clone())
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(resource)))
}

// ---------- Versions ----------

/// Request body for creating a version; the effective time is accepted either
/// as an ISO date or as the raw YYYYMMDD ordinal
#[derive(Debug, Deserialize)]
pub struct CreateVersionBody {
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub effective_time: Option<i32>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub commit_comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersionAccepted {
    pub job_id: String,
}

/// Schedules a versioning run and returns `202 Accepted` with the job id.
/// Cheap input validation happens here so obviously broken requests fail
/// synchronously instead of producing a failed job.
pub async fn create_version<S: Store + 'static>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
    RequestJson(body): RequestJson<CreateVersionBody>,
) -> Result<(StatusCode, Json<VersionAccepted>), HandlerError> {
    let resource = state
        .store
        .get_resource(&id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(&format!("Resource '{}' not found", id))),
            )
        })?;

    let effective_time = match (body.effective_time, body.effective_date.as_deref()) {
        (Some(ordinal), _) => ordinal,
        (None, Some(date)) => effective_time_from_date(date)
            .map_err(|e| (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e))))?,
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "Either effective_date or effective_time is required",
                )),
            ))
        }
    };

    let request = VersionRequest {
        resource: id,
        version: body.version.clone(),
        description: body.description,
        effective_time,
        force: body.force,
        author: None,
        commit_comment: body.commit_comment,
    };

    let coordinator = Arc::clone(&state.coordinator);
    let description = format!(
        "Creating version '{}' for {}.",
        request.version, resource.title
    );
    let job_user = user.clone();
    let job_id = state
        .scheduler
        .schedule(description, user.user_id, move |ctx| async move {
            let outcome = coordinator
                .run(request, &job_user, &ctx.progress, &ctx.cancel)
                .await?;
            serde_json::to_value(outcome).map_err(|e| CoreError::Internal(e.into()))
        })
        .map_err(core_error)?;

    Ok((StatusCode::ACCEPTED, Json(VersionAccepted { job_id })))
}

pub async fn list_versions<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<ListResponse<VersionRecord>>, HandlerError> {
    let uri = crate::model::ResourceUri::new(id);
    let items = state
        .store
        .list_versions_for_resource(&uri)
        .await
        .map_err(internal_error)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

pub async fn get_version<S: Store>(
    State(state): State<AppState<S>>,
    Path((id, version)): Path<(String, String)>,
) -> Result<Json<VersionRecord>, HandlerError> {
    let uri = crate::model::ResourceUri::new(id.clone());
    state
        .store
        .get_version(&uri, &version)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(&format!(
                    "Version '{}' not found for resource '{}'",
                    version, id
                ))),
            )
        })
}

// ---------- Branches ----------

pub async fn get_branch<S: Store>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
) -> Result<Json<crate::model::Branch>, HandlerError> {
    let path = path.trim_matches('/');
    state
        .store
        .get_branch(path)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(&format!("Branch '{}' not found", path))),
            )
        })
}

pub async fn list_child_branches<S: Store>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
) -> Result<Json<ListResponse<crate::model::Branch>>, HandlerError> {
    let path = path.trim_matches('/');
    let items = state
        .store
        .list_child_branches(path)
        .await
        .map_err(internal_error)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}
