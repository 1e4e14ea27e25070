pub mod branch;
pub mod common;
pub mod job;
pub mod resource;
pub mod user_context;
pub mod version;

pub use branch::{Branch, MAIN_BRANCH};
pub use common::{generate_id, Dependency, DependencyScope, Id, ResourceStatus, ResourceType};
pub use job::{JobEvent, RemoteJob, RemoteJobState};
pub use resource::{is_reserved_alias, Resource, ResourceUri, RESERVED_ALIASES};
pub use user_context::UserContext;
pub use version::{
    effective_time_from_date, format_effective_time, VersionRecord, VersionRequest,
};
