pub mod capped;
pub mod errors;
pub mod locks;
pub mod repository;
pub mod versioning;

pub use capped::{CappedTransactionContext, CommitCallback, ContentChange, ContentTransaction};
pub use errors::CoreError;
pub use locks::{LockContext, LockTarget, OperationLockGuard, OperationLockManager, CREATE_VERSION};
pub use repository::{
    ContentRepository, MemoryRepository, MemoryTooling, Tooling, ToolingRegistry,
};
pub use versioning::{VersioningCoordinator, VersioningOutcome};
