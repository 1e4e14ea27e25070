use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root of every branch hierarchy
pub const MAIN_BRANCH: &str = "MAIN";

/// Separator between branch path segments
pub const SEPARATOR: char = '/';

/// Joins a parent branch path and a child segment into a full path
pub fn join(parent: &str, segment: &str) -> String {
    format!("{}{}{}", parent, SEPARATOR, segment)
}

/// Returns the parent path of a branch path, or `None` for the root
pub fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once(SEPARATOR).map(|(parent, _)| parent)
}

/// Returns the last segment of a branch path
pub fn last_segment(path: &str) -> &str {
    path.rsplit_once(SEPARATOR)
        .map(|(_, segment)| segment)
        .unwrap_or(path)
}

/// A point in a resource's mutation history, identified by its hierarchical
/// path (e.g. `MAIN/cs11/v1`). Branches are never physically deleted; the
/// `deleted` flag marks history-preserving tombstones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Full hierarchical path, unique among live branches
    pub path: String,
    /// Last path segment, kept denormalized for display
    pub name: String,
    pub parent_path: Option<String>,
    pub created_at: String, // ISO 8601 timestamp
    pub updated_at: String, // ISO 8601 timestamp
    /// Tombstone flag; a deleted branch keeps its history but its path is
    /// free for reuse
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Branch {
    /// Creates the root branch
    pub fn new_root() -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            path: MAIN_BRANCH.to_string(),
            name: MAIN_BRANCH.to_string(),
            parent_path: None,
            created_at: now.clone(),
            updated_at: now,
            deleted: false,
            metadata: HashMap::new(),
        }
    }

    /// Creates a child branch of `parent` with the given segment name
    pub fn new_child(parent: &str, segment: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            path: join(parent, segment),
            name: segment.to_string(),
            parent_path: Some(parent.to_string()),
            created_at: now.clone(),
            updated_at: now,
            deleted: false,
            metadata: HashMap::new(),
        }
    }

    /// Same as [`Branch::new_child`] but stamps an externally supplied
    /// creation instant, so every branch in one versioning run shares it
    pub fn new_child_at(parent: &str, segment: &str, created_at: &str) -> Self {
        let mut branch = Branch::new_child(parent, segment);
        branch.created_at = created_at.to_string();
        branch.updated_at = created_at.to_string();
        branch
    }

    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_helpers() {
        assert_eq!(join(MAIN_BRANCH, "cs11"), "MAIN/cs11");
        assert_eq!(parent_of("MAIN/cs11/v1"), Some("MAIN/cs11"));
        assert_eq!(parent_of(MAIN_BRANCH), None);
        assert_eq!(last_segment("MAIN/cs11/v1"), "v1");
        assert_eq!(last_segment(MAIN_BRANCH), MAIN_BRANCH);
    }

    #[test]
    fn test_child_branch_links_to_parent() {
        let branch = Branch::new_child("MAIN/cs11", "v1");
        assert_eq!(branch.path, "MAIN/cs11/v1");
        assert_eq!(branch.name, "v1");
        assert_eq!(branch.parent_path, Some("MAIN/cs11".to_string()));
        assert!(branch.is_live());
    }

    #[test]
    fn test_shared_creation_instant() {
        let branch = Branch::new_child_at("MAIN/cs11", "v1", "2020-04-15T00:00:00+00:00");
        assert_eq!(branch.created_at, "2020-04-15T00:00:00+00:00");
        assert_eq!(branch.updated_at, branch.created_at);
    }
}
