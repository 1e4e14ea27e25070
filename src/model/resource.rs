use serde::{Deserialize, Serialize};

use crate::model::{Dependency, DependencyScope, Id, ResourceStatus, ResourceType};

/// Branch path aliases that can never be used as version tags
pub const RESERVED_ALIASES: [&str; 3] = ["HEAD", "LATEST", "NEXT"];

/// Returns true if the given tag collides (case-insensitively) with a reserved
/// branch path alias
pub fn is_reserved_alias(tag: &str) -> bool {
    RESERVED_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(tag))
}

/// Immutable identifier of a resource plus an optional path segment
/// (a branch name, a version tag, or a reserved alias).
///
/// The canonical string form is `<resource_id>` or `<resource_id>@<path>`;
/// equality and hashing are by that normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceUri {
    resource_id: Id,
    path: Option<String>,
}

impl ResourceUri {
    pub fn new(resource_id: impl Into<Id>) -> Self {
        Self {
            resource_id: resource_id.into(),
            path: None,
        }
    }

    pub fn with_path(resource_id: impl Into<Id>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            resource_id: resource_id.into(),
            path: Some(normalize_path_segment(&path)),
        }
    }

    pub fn resource_id(&self) -> &Id {
        &self.resource_id
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// True when the path segment is one of `HEAD`, `LATEST` or `NEXT`
    pub fn has_reserved_path(&self) -> bool {
        self.path.as_deref().map(is_reserved_alias).unwrap_or(false)
    }

    /// The same URI with the path segment removed
    pub fn without_path(&self) -> ResourceUri {
        ResourceUri::new(self.resource_id.clone())
    }
}

/// Reserved aliases normalize to uppercase so `head` and `HEAD` compare equal
fn normalize_path_segment(path: &str) -> String {
    if is_reserved_alias(path) {
        path.to_ascii_uppercase()
    } else {
        path.to_string()
    }
}

impl std::fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}@{}", self.resource_id, path),
            None => write!(f, "{}", self.resource_id),
        }
    }
}

impl std::str::FromStr for ResourceUri {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Resource URI must not be empty".to_string());
        }
        match s.split_once('@') {
            Some((resource_id, path)) => {
                if resource_id.is_empty() || path.is_empty() {
                    return Err(format!("Malformed resource URI: '{}'", s));
                }
                Ok(ResourceUri::with_path(resource_id, path))
            }
            None => Ok(ResourceUri::new(s)),
        }
    }
}

impl TryFrom<String> for ResourceUri {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceUri> for String {
    fn from(uri: ResourceUri) -> Self {
        uri.to_string()
    }
}

/// An addressable, named, versionable entity owned by the resource registry.
/// The versioning core only reads it and updates `status`/`branch_path` as a
/// side effect of versioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Id,
    pub title: String,
    /// Identifies the storage repository holding this resource's content
    pub tooling_id: String,
    pub resource_type: ResourceType,
    pub status: ResourceStatus,
    /// The resource's unversioned working branch, e.g. `MAIN/cs11`
    pub branch_path: String,
    /// Ordered `(uri, scope)` pairs
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    pub created_by: String,
    pub created_at: String, // ISO 8601 timestamp
    pub updated_by: String,
    pub updated_at: String, // ISO 8601 timestamp
}

impl Resource {
    pub fn new(
        id: impl Into<Id>,
        title: impl Into<String>,
        tooling_id: impl Into<String>,
        resource_type: ResourceType,
        author: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let author = author.into();
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            branch_path: format!("{}/{}", crate::model::branch::MAIN_BRANCH, id),
            id,
            title: title.into(),
            tooling_id: tooling_id.into(),
            resource_type,
            status: ResourceStatus::Draft,
            dependencies: Vec::new(),
            created_by: author.clone(),
            created_at: now.clone(),
            updated_by: author,
            updated_at: now,
        }
    }

    pub fn with_dependency(mut self, uri: impl Into<String>, scope: DependencyScope) -> Self {
        self.dependencies.push(Dependency::new(uri, scope));
        self
    }

    pub fn is_collection(&self) -> bool {
        self.resource_type == ResourceType::Collection
    }

    /// True if this resource's dependency list references `resource_id`
    /// with the given scope (any pinned path segment is ignored)
    pub fn depends_on(&self, resource_id: &str, scope: DependencyScope) -> bool {
        self.dependencies.iter().any(|dep| {
            dep.scope == scope
                && dep
                    .uri
                    .parse::<ResourceUri>()
                    .map(|uri| uri.resource_id() == resource_id)
                    .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_normalization_and_equality() {
        let plain: ResourceUri = "cs11".parse().unwrap();
        assert_eq!(plain.resource_id(), "cs11");
        assert_eq!(plain.path(), None);
        assert_eq!(plain.to_string(), "cs11");

        let tagged: ResourceUri = "cs11@v1".parse().unwrap();
        assert_eq!(tagged.resource_id(), "cs11");
        assert_eq!(tagged.path(), Some("v1"));
        assert_eq!(tagged, ResourceUri::with_path("cs11", "v1"));

        // reserved aliases normalize to uppercase
        let head: ResourceUri = "cs11@head".parse().unwrap();
        assert_eq!(head.path(), Some("HEAD"));
        assert_eq!(head, "cs11@HEAD".parse().unwrap());
        assert!(head.has_reserved_path());
    }

    #[test]
    fn test_uri_rejects_malformed_input() {
        assert!("".parse::<ResourceUri>().is_err());
        assert!("  ".parse::<ResourceUri>().is_err());
        assert!("@v1".parse::<ResourceUri>().is_err());
        assert!("cs11@".parse::<ResourceUri>().is_err());
    }

    #[test]
    fn test_reserved_aliases_case_insensitive() {
        for alias in ["HEAD", "head", "Latest", "NEXT", "next"] {
            assert!(is_reserved_alias(alias), "{} should be reserved", alias);
        }
        assert!(!is_reserved_alias("v1"));
        assert!(!is_reserved_alias("2020-04-15"));
    }

    #[test]
    fn test_depends_on_ignores_pinned_path() {
        let resource = Resource::new(
            "cs12",
            "Extension",
            "snomed",
            ResourceType::CodeSystem,
            "test",
        )
        .with_dependency("cs11@v1", DependencyScope::SourceOf);

        assert!(resource.depends_on("cs11", DependencyScope::SourceOf));
        assert!(!resource.depends_on("cs11", DependencyScope::DependsOn));
        assert!(!resource.depends_on("cs13", DependencyScope::SourceOf));
    }
}
