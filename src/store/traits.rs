use crate::model::{Branch, Id, Resource, ResourceStatus, ResourceUri, VersionRecord};
use anyhow::Result;

#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_resource(&self, id: &Id) -> Result<Option<Resource>>;
    async fn list_resources(&self) -> Result<Vec<Resource>>;
    async fn upsert_resource(&self, resource: Resource) -> Result<()>;
    /// Funneled mutation used by the versioning coordinator: updates status
    /// and branch path in one write, bumping the audit fields
    async fn update_resource_state(
        &self,
        id: &Id,
        status: ResourceStatus,
        branch_path: &str,
        updated_by: &str,
    ) -> Result<()>;
}

#[async_trait::async_trait]
pub trait BranchStore: Send + Sync {
    /// Branch metadata by full path, tombstones included
    async fn get_branch(&self, path: &str) -> Result<Option<Branch>>;
    /// True only when a non-deleted branch occupies the path
    async fn branch_exists(&self, path: &str) -> Result<bool> {
        Ok(self
            .get_branch(path)
            .await?
            .map(|branch| branch.is_live())
            .unwrap_or(false))
    }
    async fn list_child_branches(&self, parent_path: &str) -> Result<Vec<Branch>>;
    async fn upsert_branch(&self, branch: Branch) -> Result<()>;
    /// Marks the branch at `path` deleted, keeping it for history.
    /// Returns false when no live branch occupies the path.
    async fn tombstone_branch(&self, path: &str) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait VersionStore: Send + Sync {
    async fn get_version(&self, resource_uri: &ResourceUri, version: &str)
        -> Result<Option<VersionRecord>>;
    /// All version records for a resource, ascending by effective time
    async fn list_versions_for_resource(
        &self,
        resource_uri: &ResourceUri,
    ) -> Result<Vec<VersionRecord>>;
    async fn insert_version(&self, record: VersionRecord) -> Result<()>;
    /// Refreshes an existing record in place: adjusted effective time,
    /// `updated_at` and snapshot; used by force republish of the latest tag
    async fn touch_version(
        &self,
        resource_uri: &ResourceUri,
        version: &str,
        effective_time: i32,
        updated_at: &str,
        resource_snapshot: &Resource,
    ) -> Result<()>;
}

pub trait Store: ResourceStore + BranchStore + VersionStore + Send + Sync {}
