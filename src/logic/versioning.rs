use itertools::Itertools;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::jobs::{CancelFlag, ProgressTracker};
use crate::logic::capped::CappedTransactionContext;
use crate::logic::errors::CoreError;
use crate::logic::locks::{LockContext, LockTarget, OperationLockManager, CREATE_VERSION};
use crate::logic::repository::ToolingRegistry;
use crate::model::{
    branch, format_effective_time, is_reserved_alias, Branch, DependencyScope, Resource,
    ResourceStatus, ResourceUri, UserContext, VersionRecord, VersionRequest,
};
use crate::store::traits::Store;

/// Work units per resource in the progress budget: content commit, branch
/// snapshot, version record
const WORK_PER_RESOURCE: usize = 3;

/// Outcome of a successful versioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersioningOutcome {
    pub version: String,
    /// Every versioned resource id, primary target last
    pub resources: Vec<String>,
    /// The created (or re-created) version branch paths, same order
    pub branch_paths: Vec<String>,
}

/// One member of the version set after validation
struct VersionPlanEntry {
    resource: Resource,
    prospective_path: String,
    /// Force re-tag of the resource's most recent version; tolerates equal
    /// effective time and refreshes the existing record instead of inserting
    republish: bool,
}

/// Orchestrates one versioning run: resolves the version set, validates every
/// member up front, acquires a single exclusive lock over the set, commits
/// content changes through capped transactions, creates branch snapshots with
/// one shared timestamp and writes the permanent version records.
///
/// Cross-repository atomicity is best effort: a failure after some
/// repositories have committed is surfaced to the caller, and the branches
/// and records already created are left in place for manual reconciliation.
/// No compensating deletes are attempted.
pub struct VersioningCoordinator<S> {
    store: Arc<S>,
    locks: Arc<OperationLockManager>,
    toolings: Arc<ToolingRegistry>,
    /// Capped transaction batch size
    low_watermark: usize,
}

impl<S: Store> VersioningCoordinator<S> {
    pub fn new(
        store: Arc<S>,
        locks: Arc<OperationLockManager>,
        toolings: Arc<ToolingRegistry>,
        low_watermark: usize,
    ) -> Self {
        Self {
            store,
            locks,
            toolings,
            low_watermark,
        }
    }

    /// Runs the whole versioning protocol to completion on the caller's task.
    /// Cancellation is cooperative: the flag is checked between
    /// resource-level steps, never in the middle of a commit.
    pub async fn run(
        &self,
        request: VersionRequest,
        user: &UserContext,
        progress: &ProgressTracker,
        cancel: &CancelFlag,
    ) -> Result<VersioningOutcome, CoreError> {
        self.validate_tag(&request.version)?;

        let target = self
            .store
            .get_resource(&request.resource)
            .await?
            .ok_or_else(|| {
                CoreError::not_found(format!("Resource '{}' not found", request.resource))
            })?;

        let version_set = self.resolve_version_set(target).await?;
        progress.begin(2 + WORK_PER_RESOURCE * version_set.len());
        progress.worked(1);

        // Every member is validated before any lock is taken or any commit
        // begins, so input errors cannot leave partial side effects
        let mut plan = Vec::with_capacity(version_set.len());
        for resource in version_set {
            plan.push(self.validate_member(resource, &request).await?);
        }
        progress.worked(1);

        let lock_targets: Vec<LockTarget> = plan
            .iter()
            .map(|entry| {
                LockTarget::new(
                    entry.resource.tooling_id.clone(),
                    entry.resource.branch_path.clone(),
                )
            })
            .collect();
        let _lock = self
            .locks
            .lock(
                LockContext::new(user.user_id.clone(), CREATE_VERSION),
                &lock_targets,
            )
            .await?;

        // One memoized wall-clock read; every branch and version record in
        // the set carries the same creation instant regardless of repository
        let created_at = chrono::Utc::now().to_rfc3339();
        let author = request
            .author
            .clone()
            .unwrap_or_else(|| user.user_id.clone());

        let mut outcome = VersioningOutcome {
            version: request.version.clone(),
            resources: Vec::with_capacity(plan.len()),
            branch_paths: Vec::with_capacity(plan.len()),
        };

        for entry in &plan {
            if cancel.is_canceled() {
                info!(
                    "Versioning of '{}' canceled before processing '{}'",
                    request.version, entry.resource.id
                );
                return Err(CoreError::Canceled);
            }
            self.version_one(entry, &request, &author, &created_at)
                .await
                .map_err(|e| {
                    error!(
                        "Version creation failed for {}: {}",
                        entry.resource.title, e
                    );
                    e
                })?;
            progress.worked(WORK_PER_RESOURCE);
            outcome.resources.push(entry.resource.id.clone());
            outcome.branch_paths.push(entry.prospective_path.clone());
        }

        info!(
            "{} has been successfully versioned with '{}'",
            plan.last()
                .map(|entry| entry.resource.title.as_str())
                .unwrap_or("resource"),
            request.version
        );
        Ok(outcome)
    }

    fn validate_tag(&self, tag: &str) -> Result<(), CoreError> {
        if tag.trim().is_empty() {
            return Err(CoreError::bad_request("Version tag must not be empty"));
        }
        if is_reserved_alias(tag) {
            return Err(CoreError::bad_request(format!(
                "Version tag '{}' is a reserved alias or branch name",
                tag
            )));
        }
        Ok(())
    }

    /// Resolves the full set of resources to version. For a collection this
    /// is all non-retired children of supported types; otherwise all direct
    /// derivatives that list the target with scope `source_of`. The target
    /// itself goes last so the primary resource commits last.
    async fn resolve_version_set(&self, target: Resource) -> Result<Vec<Resource>, CoreError> {
        let mut set = if target.is_collection() {
            let tooling = self.toolings.get(&target.tooling_id)?;
            let supported = tooling.supported_child_resource_types();
            self.store
                .list_resources()
                .await?
                .into_iter()
                .filter(|candidate| {
                    branch::parent_of(&candidate.branch_path) == Some(target.branch_path.as_str())
                        && candidate.status != ResourceStatus::Retired
                        && supported.contains(&candidate.resource_type)
                })
                .sorted_by(|a, b| a.id.cmp(&b.id))
                .collect::<Vec<_>>()
        } else {
            self.store
                .list_resources()
                .await?
                .into_iter()
                .filter(|candidate| {
                    candidate.id != target.id
                        && candidate.depends_on(&target.id, DependencyScope::SourceOf)
                })
                .sorted_by(|a, b| a.id.cmp(&b.id))
                .collect::<Vec<_>>()
        };
        set.push(target);
        Ok(set)
    }

    async fn validate_member(
        &self,
        resource: Resource,
        request: &VersionRequest,
    ) -> Result<VersionPlanEntry, CoreError> {
        if resource.status.is_read_only() {
            return Err(CoreError::bad_request(format!(
                "Resource '{}' is retired and cannot be versioned",
                resource.id
            )));
        }

        let uri = ResourceUri::new(resource.id.clone());
        let versions = self.store.list_versions_for_resource(&uri).await?;
        let latest = versions.last();

        let republish = request.force
            && latest
                .map(|record| record.version == request.version)
                .unwrap_or(false);

        // force only re-tags the most recent version; an older tag stays
        // immutable
        if request.force
            && !republish
            && versions
                .iter()
                .any(|record| record.version == request.version)
        {
            return Err(CoreError::conflict(format!(
                "Version '{}' is not the most recent version of resource '{}' and cannot be recreated",
                request.version, resource.id
            )));
        }

        if let Some(latest) = latest {
            let monotonic = if republish {
                // idempotent republish of the most recent tag tolerates an
                // unchanged effective time
                request.effective_time >= latest.effective_time
            } else {
                request.effective_time > latest.effective_time
            };
            if !monotonic {
                return Err(CoreError::bad_request(format!(
                    "Effective time '{}' must be after the most recent version's effective time '{}' for resource '{}'",
                    format_effective_time(request.effective_time),
                    format_effective_time(latest.effective_time),
                    resource.id
                )));
            }
        }

        let prospective_path = branch::join(&resource.branch_path, &request.version);
        if !request.force && self.store.branch_exists(&prospective_path).await? {
            return Err(CoreError::conflict(format!(
                "Branch '{}' already exists; version '{}' cannot be created for resource '{}'",
                prospective_path, request.version, resource.id
            )));
        }

        Ok(VersionPlanEntry {
            resource,
            prospective_path,
            republish,
        })
    }

    /// Versions one member of the set against its owning repository: capped
    /// content commit, branch snapshot, status transition, version record
    async fn version_one(
        &self,
        entry: &VersionPlanEntry,
        request: &VersionRequest,
        author: &str,
        created_at: &str,
    ) -> Result<(), CoreError> {
        let resource = &entry.resource;
        let tooling = self.toolings.get(&resource.tooling_id)?;
        let comment = self.commit_comment(entry, request);

        let transaction = tooling
            .repository()
            .open_transaction(&resource.branch_path)
            .await?;
        let resource_title = resource.title.clone();
        let mut ctx = CappedTransactionContext::new(
            transaction,
            self.low_watermark,
            author,
            &comment,
            created_at,
        )
        .with_commit_callback(Box::new(move |commit_id| {
            info!("Committed content batch {} for {}", commit_id, resource_title);
        }));
        tooling.version_content(&mut ctx, resource, request).await?;
        let last_commit = ctx.close().await?;

        // force re-tag replaces the live branch with a fresh snapshot
        if request.force && self.store.branch_exists(&entry.prospective_path).await? {
            self.store.tombstone_branch(&entry.prospective_path).await?;
        }
        let mut snapshot_branch =
            Branch::new_child_at(&resource.branch_path, &request.version, created_at);
        if let Some(commit_id) = last_commit {
            snapshot_branch
                .metadata
                .insert("commit_id".to_string(), serde_json::Value::String(commit_id));
        }
        self.store.upsert_branch(snapshot_branch).await?;

        let status = if resource.status == ResourceStatus::Draft {
            ResourceStatus::Active
        } else {
            resource.status
        };
        self.store
            .update_resource_state(&resource.id, status, &resource.branch_path, author)
            .await?;

        let mut snapshot = resource.clone();
        snapshot.status = status;

        let uri = ResourceUri::new(resource.id.clone());
        if entry.republish {
            self.store
                .touch_version(
                    &uri,
                    &request.version,
                    request.effective_time,
                    created_at,
                    &snapshot,
                )
                .await?;
        } else {
            self.store
                .insert_version(VersionRecord {
                    version: request.version.clone(),
                    resource_uri: uri,
                    description: request.description.clone(),
                    effective_time: request.effective_time,
                    branch_path: entry.prospective_path.clone(),
                    author: author.to_string(),
                    created_at: created_at.to_string(),
                    updated_at: created_at.to_string(),
                    resource_snapshot: snapshot,
                })
                .await?;
        }
        Ok(())
    }

    fn commit_comment(&self, entry: &VersionPlanEntry, request: &VersionRequest) -> String {
        if let Some(comment) = &request.commit_comment {
            return comment.clone();
        }
        if entry.republish {
            format!(
                "Adjusted effective time to '{}' for {} version '{}'.",
                format_effective_time(request.effective_time),
                entry.resource.title,
                request.version
            )
        } else {
            format!(
                "Created new version '{}' for {}.",
                request.version, entry.resource.title
            )
        }
    }
}
