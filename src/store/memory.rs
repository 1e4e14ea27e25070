use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{Branch, Id, Resource, ResourceStatus, ResourceUri, VersionRecord};
use crate::store::traits::{BranchStore, ResourceStore, Store, VersionStore};

/// In-memory store backing tests and embedded deployments.
/// Process-lifetime only; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: Arc<RwLock<HashMap<Id, Resource>>>,
    /// Branches keyed by full path, tombstones included
    branches: Arc<RwLock<HashMap<String, Branch>>>,
    /// Version records keyed by (resource URI, tag)
    versions: Arc<RwLock<HashMap<(String, String), VersionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the root branch so resource branches always have a parent
    pub async fn with_root_branch() -> Self {
        let store = Self::new();
        store
            .upsert_branch(Branch::new_root())
            .await
            .expect("in-memory upsert cannot fail");
        store
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryStore {
    async fn get_resource(&self, id: &Id) -> Result<Option<Resource>> {
        Ok(self.resources.read().await.get(id).cloned())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>> {
        let mut resources: Vec<Resource> = self.resources.read().await.values().cloned().collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(resources)
    }

    async fn upsert_resource(&self, resource: Resource) -> Result<()> {
        self.resources
            .write()
            .await
            .insert(resource.id.clone(), resource);
        Ok(())
    }

    async fn update_resource_state(
        &self,
        id: &Id,
        status: ResourceStatus,
        branch_path: &str,
        updated_by: &str,
    ) -> Result<()> {
        let mut resources = self.resources.write().await;
        if let Some(resource) = resources.get_mut(id) {
            resource.status = status;
            resource.branch_path = branch_path.to_string();
            resource.updated_by = updated_by.to_string();
            resource.updated_at = chrono::Utc::now().to_rfc3339();
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BranchStore for MemoryStore {
    async fn get_branch(&self, path: &str) -> Result<Option<Branch>> {
        Ok(self.branches.read().await.get(path).cloned())
    }

    async fn list_child_branches(&self, parent_path: &str) -> Result<Vec<Branch>> {
        let branches = self.branches.read().await;
        let mut children: Vec<Branch> = branches
            .values()
            .filter(|branch| branch.parent_path.as_deref() == Some(parent_path))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn upsert_branch(&self, branch: Branch) -> Result<()> {
        self.branches
            .write()
            .await
            .insert(branch.path.clone(), branch);
        Ok(())
    }

    async fn tombstone_branch(&self, path: &str) -> Result<bool> {
        let mut branches = self.branches.write().await;
        match branches.get_mut(path) {
            Some(branch) if branch.is_live() => {
                branch.deleted = true;
                branch.updated_at = chrono::Utc::now().to_rfc3339();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl VersionStore for MemoryStore {
    async fn get_version(
        &self,
        resource_uri: &ResourceUri,
        version: &str,
    ) -> Result<Option<VersionRecord>> {
        let key = (resource_uri.to_string(), version.to_string());
        Ok(self.versions.read().await.get(&key).cloned())
    }

    async fn list_versions_for_resource(
        &self,
        resource_uri: &ResourceUri,
    ) -> Result<Vec<VersionRecord>> {
        let uri = resource_uri.to_string();
        let mut records: Vec<VersionRecord> = self
            .versions
            .read()
            .await
            .iter()
            .filter(|((resource, _), _)| resource == &uri)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|record| record.effective_time);
        Ok(records)
    }

    async fn insert_version(&self, record: VersionRecord) -> Result<()> {
        let key = (record.resource_uri.to_string(), record.version.clone());
        self.versions.write().await.insert(key, record);
        Ok(())
    }

    async fn touch_version(
        &self,
        resource_uri: &ResourceUri,
        version: &str,
        effective_time: i32,
        updated_at: &str,
        resource_snapshot: &Resource,
    ) -> Result<()> {
        let key = (resource_uri.to_string(), version.to_string());
        let mut versions = self.versions.write().await;
        if let Some(record) = versions.get_mut(&key) {
            record.effective_time = effective_time;
            record.updated_at = updated_at.to_string();
            record.resource_snapshot = resource_snapshot.clone();
        }
        Ok(())
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceType;

    #[tokio::test]
    async fn test_branch_tombstone_frees_the_path() {
        let store = MemoryStore::with_root_branch().await;
        let branch = Branch::new_child("MAIN", "cs11");
        store.upsert_branch(branch.clone()).await.unwrap();
        assert!(store.branch_exists("MAIN/cs11").await.unwrap());

        assert!(store.tombstone_branch("MAIN/cs11").await.unwrap());
        // the path no longer counts as occupied...
        assert!(!store.branch_exists("MAIN/cs11").await.unwrap());
        // ...but the tombstone is still readable
        let tombstone = store.get_branch("MAIN/cs11").await.unwrap().unwrap();
        assert!(tombstone.deleted);

        // tombstoning twice is a no-op
        assert!(!store.tombstone_branch("MAIN/cs11").await.unwrap());
    }

    #[tokio::test]
    async fn test_versions_sorted_by_effective_time() {
        let store = MemoryStore::new();
        let resource = Resource::new("cs13", "Test", "snomed", ResourceType::CodeSystem, "test");
        let uri = ResourceUri::new("cs13");

        for (tag, effective_time) in [("v2", 20200201), ("v1", 20200101), ("v3", 20200301)] {
            store
                .insert_version(VersionRecord {
                    version: tag.to_string(),
                    resource_uri: uri.clone(),
                    description: None,
                    effective_time,
                    branch_path: format!("MAIN/cs13/{}", tag),
                    author: "test".to_string(),
                    created_at: chrono::Utc::now().to_rfc3339(),
                    updated_at: chrono::Utc::now().to_rfc3339(),
                    resource_snapshot: resource.clone(),
                })
                .await
                .unwrap();
        }

        let versions = store.list_versions_for_resource(&uri).await.unwrap();
        let tags: Vec<&str> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(tags, vec!["v1", "v2", "v3"]);
    }

    #[tokio::test]
    async fn test_update_resource_state() {
        let store = MemoryStore::new();
        let resource = Resource::new("cs11", "Test", "snomed", ResourceType::CodeSystem, "author");
        store.upsert_resource(resource).await.unwrap();

        store
            .update_resource_state(
                &"cs11".to_string(),
                ResourceStatus::Active,
                "MAIN/cs11",
                "versioner",
            )
            .await
            .unwrap();

        let updated = store.get_resource(&"cs11".to_string()).await.unwrap().unwrap();
        assert_eq!(updated.status, ResourceStatus::Active);
        assert_eq!(updated.updated_by, "versioner");
    }
}
