use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::logic::errors::CoreError;

/// Lock category used by the versioning coordinator
pub const CREATE_VERSION: &str = "create version";

/// Identifies who holds a lock and for which operation category
#[derive(Debug, Clone)]
pub struct LockContext {
    pub user_id: String,
    pub description: String,
}

impl LockContext {
    pub fn new(user_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            description: description.into(),
        }
    }
}

/// A single repository-and-branch a lock covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockTarget {
    pub repository_id: String,
    pub branch_path: String,
}

impl LockTarget {
    pub fn new(repository_id: impl Into<String>, branch_path: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            branch_path: branch_path.into(),
        }
    }
}

#[derive(Debug)]
struct LockEntry {
    context: LockContext,
    targets: HashSet<LockTarget>,
}

#[derive(Debug, Default)]
struct LockRegistry {
    held: Mutex<HashMap<u64, LockEntry>>,
    next_id: AtomicU64,
    released: Notify,
}

/// Grants named, hierarchical exclusive locks over one or more targets for the
/// duration of an operation. Two locks conflict iff their target sets
/// intersect, regardless of category. Injected as a service object with its
/// own registry; no process-global state.
#[derive(Debug, Default)]
pub struct OperationLockManager {
    registry: Arc<LockRegistry>,
}

impl OperationLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires an exclusive lock over `targets`, blocking the caller until no
    /// conflicting lock is held. The returned guard releases the lock on every
    /// exit path when dropped.
    pub async fn lock(
        &self,
        context: LockContext,
        targets: &[LockTarget],
    ) -> Result<OperationLockGuard, CoreError> {
        if targets.is_empty() {
            return Err(CoreError::bad_request("Lock request covers no targets"));
        }
        let target_set: HashSet<LockTarget> = targets.iter().cloned().collect();
        loop {
            // Arm the wakeup before checking so a release between the check
            // and the await is not missed
            let released = self.registry.released.notified();
            if let Some(id) = self.try_acquire(&context, &target_set) {
                return Ok(OperationLockGuard {
                    registry: Arc::clone(&self.registry),
                    id,
                });
            }
            released.await;
        }
    }

    /// Same as [`OperationLockManager::lock`] but gives up after `timeout`,
    /// surfacing the still-conflicting holder in the error
    pub async fn lock_with_timeout(
        &self,
        context: LockContext,
        targets: &[LockTarget],
        timeout: Duration,
    ) -> Result<OperationLockGuard, CoreError> {
        let description = context.description.clone();
        match tokio::time::timeout(timeout, self.lock(context, targets)).await {
            Ok(result) => result,
            Err(_) => {
                let holder = self
                    .conflicting_holder(targets)
                    .unwrap_or_else(|| "another user".to_string());
                Err(CoreError::Locked(format!(
                    "Failed to acquire lock for {} because {} is holding a conflicting lock.",
                    description, holder
                )))
            }
        }
    }

    /// Who currently holds a lock intersecting `targets`, if anyone
    pub fn conflicting_holder(&self, targets: &[LockTarget]) -> Option<String> {
        let held = self.registry.held.lock();
        held.values()
            .find(|entry| targets.iter().any(|t| entry.targets.contains(t)))
            .map(|entry| entry.context.user_id.clone())
    }

    fn try_acquire(&self, context: &LockContext, targets: &HashSet<LockTarget>) -> Option<u64> {
        let mut held = self.registry.held.lock();
        let conflict = held
            .values()
            .any(|entry| !entry.targets.is_disjoint(targets));
        if conflict {
            return None;
        }
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        held.insert(
            id,
            LockEntry {
                context: context.clone(),
                targets: targets.clone(),
            },
        );
        Some(id)
    }
}

/// Scoped lock handle; releasing happens in `Drop`, so the lock cannot be
/// left dangling on failure or cancellation
#[derive(Debug)]
pub struct OperationLockGuard {
    registry: Arc<LockRegistry>,
    id: u64,
}

impl Drop for OperationLockGuard {
    fn drop(&mut self) {
        self.registry.held.lock().remove(&self.id);
        self.registry.released.notify_waiters();
    }
}
