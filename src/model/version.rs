use serde::{Deserialize, Serialize};

use crate::model::{Id, Resource, ResourceUri};

/// Input value object for one versioning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRequest {
    /// Target resource to version
    pub resource: Id,
    /// Version tag; must not collide with a reserved alias
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Logical date stamped on the version, YYYYMMDD ordinal
    pub effective_time: i32,
    /// Permits re-tagging the most recent version
    #[serde(default)]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_comment: Option<String>,
}

impl VersionRequest {
    pub fn new(resource: impl Into<Id>, version: impl Into<String>, effective_time: i32) -> Self {
        Self {
            resource: resource.into(),
            version: version.into(),
            description: None,
            effective_time,
            force: false,
            author: None,
            commit_comment: None,
        }
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Converts an ISO `YYYY-MM-DD` date into the YYYYMMDD effective time ordinal
pub fn effective_time_from_date(date: &str) -> Result<i32, String> {
    let parsed = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| format!("Invalid effective date '{}': {}", date, e))?;
    Ok(parsed
        .format("%Y%m%d")
        .to_string()
        .parse::<i32>()
        .expect("formatted date is always numeric"))
}

/// Formats a YYYYMMDD ordinal back into `YYYY-MM-DD` for display
pub fn format_effective_time(effective_time: i32) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        effective_time / 10000,
        effective_time / 100 % 100,
        effective_time % 100
    )
}

/// Permanent record created once per successfully versioned resource.
/// Never mutated afterwards except `updated_at`, the commit pointer used
/// for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Version tag, unique per resource branch lineage
    pub version: String,
    pub resource_uri: ResourceUri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub effective_time: i32,
    /// The branch snapshot backing this version, e.g. `MAIN/cs11/v1`
    pub branch_path: String,
    pub author: String,
    pub created_at: String, // ISO 8601 timestamp
    pub updated_at: String, // ISO 8601 timestamp
    /// Structural snapshot of the resource metadata at versioning time
    pub resource_snapshot: Resource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_time_round_trip() {
        assert_eq!(effective_time_from_date("2020-04-15").unwrap(), 20200415);
        assert_eq!(format_effective_time(20200415), "2020-04-15");
        assert!(effective_time_from_date("2020-13-40").is_err());
        assert!(effective_time_from_date("not-a-date").is_err());
    }

    #[test]
    fn test_request_defaults() {
        let json = r#"{"resource": "cs11", "version": "v1", "effective_time": 20200415}"#;
        let req: VersionRequest = serde_json::from_str(json).unwrap();
        assert!(!req.force);
        assert_eq!(req.description, None);
        assert_eq!(req.author, None);
    }
}
