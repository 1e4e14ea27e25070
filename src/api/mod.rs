pub mod handlers;
pub mod job_handlers;
pub mod routes;
pub mod user_extractor;

pub use handlers::AppState;
