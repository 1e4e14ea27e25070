use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::logic::capped::{CappedTransactionContext, ContentChange, ContentTransaction};
use crate::logic::errors::CoreError;
use crate::model::{Resource, ResourceType, VersionRequest};

/// Seam to one physical content repository. The document storage engine
/// behind it is an external collaborator; the core only opens transactions.
#[async_trait::async_trait]
pub trait ContentRepository: Send + Sync {
    async fn open_transaction(&self, branch_path: &str) -> Result<Box<dyn ContentTransaction>>;
}

/// Tooling-specific behavior for one terminology kind: which child resource
/// types a collection of this tooling may contain, which repository stores
/// its content, and how its components are adjusted during versioning.
#[async_trait::async_trait]
pub trait Tooling: Send + Sync {
    fn tooling_id(&self) -> &str;

    /// Child resource types a collection managed by this tooling versions
    /// together with itself
    fn supported_child_resource_types(&self) -> &[ResourceType];

    fn repository(&self) -> Arc<dyn ContentRepository>;

    /// Stages the content adjustments for one resource's new version
    /// (effective time + released flag on every unpublished component)
    async fn version_content(
        &self,
        ctx: &mut CappedTransactionContext,
        resource: &Resource,
        request: &VersionRequest,
    ) -> Result<(), CoreError>;
}

/// Typed registry of toolings keyed by tooling id. Explicitly populated at
/// startup; unknown ids are a caller error, not a panic.
#[derive(Default)]
pub struct ToolingRegistry {
    toolings: HashMap<String, Arc<dyn Tooling>>,
}

impl ToolingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tooling: Arc<dyn Tooling>) {
        self.toolings
            .insert(tooling.tooling_id().to_string(), tooling);
    }

    pub fn get(&self, tooling_id: &str) -> Result<Arc<dyn Tooling>, CoreError> {
        self.toolings.get(tooling_id).cloned().ok_or_else(|| {
            CoreError::bad_request(format!("No tooling registered for id '{}'", tooling_id))
        })
    }

    pub fn tooling_ids(&self) -> Vec<&str> {
        self.toolings.keys().map(String::as_str).collect()
    }
}

/// One committed batch in the in-memory repository
#[derive(Debug, Clone)]
pub struct MemoryCommit {
    pub id: String,
    pub branch_path: String,
    pub author: String,
    pub comment: String,
    pub timestamp: String,
    pub changes: Vec<ContentChange>,
}

/// In-memory content repository used by tests and the embedded demo setup.
/// Commit identifiers are SHA-256 over the commit content, like real content
/// stores produce.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    commits: Arc<RwLock<Vec<MemoryCommit>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn commits(&self) -> Vec<MemoryCommit> {
        self.commits.read().await.clone()
    }

    pub async fn commits_for_branch(&self, branch_path: &str) -> Vec<MemoryCommit> {
        self.commits
            .read()
            .await
            .iter()
            .filter(|commit| commit.branch_path == branch_path)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl ContentRepository for MemoryRepository {
    async fn open_transaction(&self, branch_path: &str) -> Result<Box<dyn ContentTransaction>> {
        Ok(Box::new(MemoryTransaction {
            commits: Arc::clone(&self.commits),
            branch_path: branch_path.to_string(),
            pending: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    commits: Arc<RwLock<Vec<MemoryCommit>>>,
    branch_path: String,
    pending: Vec<ContentChange>,
}

impl MemoryTransaction {
    fn calculate_hash(&self, author: &str, comment: &str, timestamp: &str, parent: Option<&str>) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.branch_path.as_bytes());
        hasher.update(author.as_bytes());
        hasher.update(comment.as_bytes());
        hasher.update(timestamp.as_bytes());
        if let Some(parent) = parent {
            hasher.update(parent.as_bytes());
        }
        for change in &self.pending {
            hasher.update(change.component_id.as_bytes());
            hasher.update(change.effective_time.to_be_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[async_trait::async_trait]
impl ContentTransaction for MemoryTransaction {
    async fn apply(&mut self, changes: &[ContentChange]) -> Result<()> {
        self.pending.extend_from_slice(changes);
        Ok(())
    }

    async fn commit(&mut self, author: &str, comment: &str, timestamp: &str) -> Result<String> {
        let mut commits = self.commits.write().await;
        let parent = commits.last().map(|commit| commit.id.clone());
        let id = self.calculate_hash(author, comment, timestamp, parent.as_deref());
        commits.push(MemoryCommit {
            id: id.clone(),
            branch_path: self.branch_path.clone(),
            author: author.to_string(),
            comment: comment.to_string(),
            timestamp: timestamp.to_string(),
            changes: std::mem::take(&mut self.pending),
        });
        Ok(id)
    }
}

/// Reference tooling over a [`MemoryRepository`]. Components to publish per
/// resource are declared up front; a resource without declared components
/// publishes a single metadata component named after itself.
pub struct MemoryTooling {
    tooling_id: String,
    repository: Arc<MemoryRepository>,
    child_types: Vec<ResourceType>,
    components: HashMap<String, Vec<String>>,
}

impl MemoryTooling {
    pub fn new(tooling_id: impl Into<String>) -> Self {
        Self {
            tooling_id: tooling_id.into(),
            repository: Arc::new(MemoryRepository::new()),
            child_types: vec![
                ResourceType::CodeSystem,
                ResourceType::ValueSet,
                ResourceType::MappingSet,
            ],
            components: HashMap::new(),
        }
    }

    pub fn with_components(
        mut self,
        resource_id: impl Into<String>,
        components: Vec<String>,
    ) -> Self {
        self.components.insert(resource_id.into(), components);
        self
    }

    pub fn with_child_types(mut self, child_types: Vec<ResourceType>) -> Self {
        self.child_types = child_types;
        self
    }

    pub fn memory_repository(&self) -> Arc<MemoryRepository> {
        Arc::clone(&self.repository)
    }
}

#[async_trait::async_trait]
impl Tooling for MemoryTooling {
    fn tooling_id(&self) -> &str {
        &self.tooling_id
    }

    fn supported_child_resource_types(&self) -> &[ResourceType] {
        &self.child_types
    }

    fn repository(&self) -> Arc<dyn ContentRepository> {
        Arc::clone(&self.repository) as Arc<dyn ContentRepository>
    }

    async fn version_content(
        &self,
        ctx: &mut CappedTransactionContext,
        resource: &Resource,
        request: &VersionRequest,
    ) -> Result<(), CoreError> {
        match self.components.get(&resource.id) {
            Some(components) => {
                for component in components {
                    ctx.stage(ContentChange::publish(component, request.effective_time))
                        .await?;
                }
            }
            None => {
                ctx.stage(ContentChange::publish(&resource.id, request.effective_time))
                    .await?;
            }
        }
        Ok(())
    }
}
