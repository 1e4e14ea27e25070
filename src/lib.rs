pub mod api;
pub mod config;
pub mod jobs;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;
pub use api::AppState;

// Export the versioning core
pub use logic::{
    CoreError, LockContext, LockTarget, MemoryRepository, MemoryTooling, OperationLockManager,
    Tooling, ToolingRegistry, VersioningCoordinator, VersioningOutcome,
};

// Export the job layer
pub use jobs::{CancelFlag, JobContext, JobScheduler, ProgressTracker};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use std::sync::Arc;

/// Wires the service objects together into shared handler state
pub fn build_state<S: store::traits::Store>(
    store: Arc<S>,
    toolings: Arc<ToolingRegistry>,
    config: &config::AppConfig,
) -> AppState<S> {
    let scheduler = Arc::new(JobScheduler::new(
        config.jobs.max_finished_jobs,
        config.jobs.max_results,
    ));
    let locks = Arc::new(OperationLockManager::new());
    let coordinator = Arc::new(VersioningCoordinator::new(
        Arc::clone(&store),
        locks,
        toolings,
        config.versioning.commit_low_watermark,
    ));
    AppState {
        store,
        scheduler,
        coordinator,
    }
}

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with INFO level only (suppress DEBUG logs)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    // Load configuration
    let config = crate::config::AppConfig::load()?;

    // Connect to PostgreSQL
    let database_url = config.database_url()?;
    let postgres_store = crate::store::PostgresStore::new(&database_url).await?;

    // Run migrations
    postgres_store.migrate().await?;

    let store = Arc::new(postgres_store);

    let mut toolings = ToolingRegistry::new();
    toolings.register(Arc::new(MemoryTooling::new("snomed")));

    let state = build_state(store, Arc::new(toolings), &config);
    let app = crate::api::routes::create_router().with_state(state);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;

    serve(listener, app).await?;

    Ok(())
}
