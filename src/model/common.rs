use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

/// Lifecycle status of a terminology resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Draft,   // Resource is being authored, never versioned yet
    Active,  // Resource has at least one published version
    Retired, // Resource is read-only; metadata may change but content must not
}

impl ResourceStatus {
    /// Retired resources must never be versioned
    pub fn is_read_only(&self) -> bool {
        matches!(self, ResourceStatus::Retired)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResourceStatus::Draft => write!(f, "draft"),
            ResourceStatus::Active => write!(f, "active"),
            ResourceStatus::Retired => write!(f, "retired"),
        }
    }
}

impl std::str::FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ResourceStatus::Draft),
            "active" => Ok(ResourceStatus::Active),
            "retired" => Ok(ResourceStatus::Retired),
            _ => Err(format!("Unknown resource status: {}", s)),
        }
    }
}

/// Kinds of resources the server stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    CodeSystem,
    ValueSet,
    MappingSet,
    /// A bundle whose non-retired children version together with it
    Collection,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResourceType::CodeSystem => write!(f, "code_system"),
            ResourceType::ValueSet => write!(f, "value_set"),
            ResourceType::MappingSet => write!(f, "mapping_set"),
            ResourceType::Collection => write!(f, "collection"),
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code_system" => Ok(ResourceType::CodeSystem),
            "value_set" => Ok(ResourceType::ValueSet),
            "mapping_set" => Ok(ResourceType::MappingSet),
            "collection" => Ok(ResourceType::Collection),
            _ => Err(format!("Unknown resource type: {}", s)),
        }
    }
}

/// How a dependency entry relates the owner to the referenced resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyScope {
    /// The referenced resource is the source this one derives from.
    /// Direct derivatives version together with their source.
    SourceOf,
    /// This resource extends the referenced resource at a pinned version
    ExtensionOf,
    /// Informational reference only; never pulls the owner into a version set
    DependsOn,
}

impl std::fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DependencyScope::SourceOf => write!(f, "source_of"),
            DependencyScope::ExtensionOf => write!(f, "extension_of"),
            DependencyScope::DependsOn => write!(f, "depends_on"),
        }
    }
}

impl std::str::FromStr for DependencyScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "source_of" => Ok(DependencyScope::SourceOf),
            "extension_of" => Ok(DependencyScope::ExtensionOf),
            "depends_on" => Ok(DependencyScope::DependsOn),
            _ => Err(format!("Unknown dependency scope: {}", s)),
        }
    }
}

/// An ordered dependency entry on a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub uri: String,
    pub scope: DependencyScope,
}

impl Dependency {
    pub fn new(uri: impl Into<String>, scope: DependencyScope) -> Self {
        Self {
            uri: uri.into(),
            scope,
        }
    }
}

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}
