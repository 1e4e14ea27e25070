use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::api::job_handlers;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Resource registry
        .route("/resources", get(handlers::list_resources::<S>))
        .route("/resources", post(handlers::upsert_resource::<S>))
        .route("/resources/:id", get(handlers::get_resource::<S>))
        // Versioning
        .route(
            "/resources/:id/versions",
            post(handlers::create_version::<S>),
        )
        .route("/resources/:id/versions", get(handlers::list_versions::<S>))
        .route(
            "/resources/:id/versions/:version",
            get(handlers::get_version::<S>),
        )
        // Branch metadata; the wildcard swallows the whole branch path
        .route("/branches/*path", get(handlers::get_branch::<S>))
        .route(
            "/branch-children/*path",
            get(handlers::list_child_branches::<S>),
        )
        // Remote jobs
        .route("/jobs", get(job_handlers::list_jobs::<S>))
        .route("/jobs/:id", get(job_handlers::get_job::<S>))
        .route("/jobs/:id", delete(job_handlers::delete_job::<S>))
        .route("/jobs/:id/cancel", post(job_handlers::cancel_job::<S>))
        .route("/jobs/:id/result", get(job_handlers::get_job_result::<S>))
}
