use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::model::{
    Branch, Dependency, Id, Resource, ResourceStatus, ResourceType, ResourceUri, VersionRecord,
};
use crate::store::traits::{BranchStore, ResourceStore, Store, VersionStore};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet. Version records are
    /// permanent; job records deliberately have no table here.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resources (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                tooling_id TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                status TEXT NOT NULL,
                branch_path TEXT NOT NULL,
                dependencies JSONB NOT NULL DEFAULT '[]',
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create resources table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS branches (
                path TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                parent_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                metadata JSONB NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create branches table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS version_records (
                resource_uri TEXT NOT NULL,
                version TEXT NOT NULL,
                description TEXT,
                effective_time INTEGER NOT NULL,
                branch_path TEXT NOT NULL,
                author TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                resource_snapshot JSONB NOT NULL,
                PRIMARY KEY (resource_uri, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create version_records table")?;

        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn resource_from_row(row: &sqlx::postgres::PgRow) -> Result<Resource> {
    let resource_type: String = row.get("resource_type");
    let status: String = row.get("status");
    let dependencies: serde_json::Value = row.get("dependencies");
    Ok(Resource {
        id: row.get("id"),
        title: row.get("title"),
        tooling_id: row.get("tooling_id"),
        resource_type: resource_type
            .parse::<ResourceType>()
            .map_err(anyhow::Error::msg)?,
        status: status
            .parse::<ResourceStatus>()
            .map_err(anyhow::Error::msg)?,
        branch_path: row.get("branch_path"),
        dependencies: serde_json::from_value::<Vec<Dependency>>(dependencies)
            .context("Failed to decode resource dependencies")?,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_by: row.get("updated_by"),
        updated_at: row.get("updated_at"),
    })
}

fn branch_from_row(row: &sqlx::postgres::PgRow) -> Result<Branch> {
    let metadata: serde_json::Value = row.get("metadata");
    Ok(Branch {
        path: row.get("path"),
        name: row.get("name"),
        parent_path: row.get("parent_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted: row.get("deleted"),
        metadata: serde_json::from_value(metadata).context("Failed to decode branch metadata")?,
    })
}

fn version_from_row(row: &sqlx::postgres::PgRow) -> Result<VersionRecord> {
    let resource_uri: String = row.get("resource_uri");
    let resource_snapshot: serde_json::Value = row.get("resource_snapshot");
    Ok(VersionRecord {
        version: row.get("version"),
        resource_uri: resource_uri
            .parse::<ResourceUri>()
            .map_err(anyhow::Error::msg)?,
        description: row.get("description"),
        effective_time: row.get("effective_time"),
        branch_path: row.get("branch_path"),
        author: row.get("author"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        resource_snapshot: serde_json::from_value(resource_snapshot)
            .context("Failed to decode resource snapshot")?,
    })
}

#[async_trait::async_trait]
impl ResourceStore for PostgresStore {
    async fn get_resource(&self, id: &Id) -> Result<Option<Resource>> {
        let row = sqlx::query("SELECT * FROM resources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch resource")?;

        row.map(|row| resource_from_row(&row)).transpose()
    }

    async fn list_resources(&self) -> Result<Vec<Resource>> {
        let rows = sqlx::query("SELECT * FROM resources ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list resources")?;

        rows.iter().map(resource_from_row).collect()
    }

    async fn upsert_resource(&self, resource: Resource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resources (id, title, tooling_id, resource_type, status, branch_path,
                                   dependencies, created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                tooling_id = EXCLUDED.tooling_id,
                resource_type = EXCLUDED.resource_type,
                status = EXCLUDED.status,
                branch_path = EXCLUDED.branch_path,
                dependencies = EXCLUDED.dependencies,
                updated_by = EXCLUDED.updated_by,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&resource.id)
        .bind(&resource.title)
        .bind(&resource.tooling_id)
        .bind(resource.resource_type.to_string())
        .bind(resource.status.to_string())
        .bind(&resource.branch_path)
        .bind(serde_json::to_value(&resource.dependencies)?)
        .bind(&resource.created_by)
        .bind(&resource.created_at)
        .bind(&resource.updated_by)
        .bind(&resource.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert resource")?;

        Ok(())
    }

    async fn update_resource_state(
        &self,
        id: &Id,
        status: ResourceStatus,
        branch_path: &str,
        updated_by: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE resources
            SET status = $2, branch_path = $3, updated_by = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(branch_path)
        .bind(updated_by)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to update resource state")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl BranchStore for PostgresStore {
    async fn get_branch(&self, path: &str) -> Result<Option<Branch>> {
        let row = sqlx::query("SELECT * FROM branches WHERE path = $1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch branch")?;

        row.map(|row| branch_from_row(&row)).transpose()
    }

    async fn list_child_branches(&self, parent_path: &str) -> Result<Vec<Branch>> {
        let rows = sqlx::query("SELECT * FROM branches WHERE parent_path = $1 ORDER BY path")
            .bind(parent_path)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list child branches")?;

        rows.iter().map(branch_from_row).collect()
    }

    async fn upsert_branch(&self, branch: Branch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO branches (path, name, parent_path, created_at, updated_at, deleted, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (path) DO UPDATE SET
                name = EXCLUDED.name,
                parent_path = EXCLUDED.parent_path,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at,
                deleted = EXCLUDED.deleted,
                metadata = EXCLUDED.metadata
            "#,
        )
        .bind(&branch.path)
        .bind(&branch.name)
        .bind(&branch.parent_path)
        .bind(&branch.created_at)
        .bind(&branch.updated_at)
        .bind(branch.deleted)
        .bind(serde_json::to_value(&branch.metadata)?)
        .execute(&self.pool)
        .await
        .context("Failed to upsert branch")?;

        Ok(())
    }

    async fn tombstone_branch(&self, path: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE branches SET deleted = TRUE, updated_at = $2 WHERE path = $1 AND deleted = FALSE",
        )
        .bind(path)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to tombstone branch")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl VersionStore for PostgresStore {
    async fn get_version(
        &self,
        resource_uri: &ResourceUri,
        version: &str,
    ) -> Result<Option<VersionRecord>> {
        let row =
            sqlx::query("SELECT * FROM version_records WHERE resource_uri = $1 AND version = $2")
                .bind(resource_uri.to_string())
                .bind(version)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch version record")?;

        row.map(|row| version_from_row(&row)).transpose()
    }

    async fn list_versions_for_resource(
        &self,
        resource_uri: &ResourceUri,
    ) -> Result<Vec<VersionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM version_records WHERE resource_uri = $1 ORDER BY effective_time",
        )
        .bind(resource_uri.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list version records")?;

        rows.iter().map(version_from_row).collect()
    }

    async fn insert_version(&self, record: VersionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO version_records (resource_uri, version, description, effective_time,
                                         branch_path, author, created_at, updated_at, resource_snapshot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (resource_uri, version) DO UPDATE SET
                description = EXCLUDED.description,
                effective_time = EXCLUDED.effective_time,
                branch_path = EXCLUDED.branch_path,
                updated_at = EXCLUDED.updated_at,
                resource_snapshot = EXCLUDED.resource_snapshot
            "#,
        )
        .bind(record.resource_uri.to_string())
        .bind(&record.version)
        .bind(&record.description)
        .bind(record.effective_time)
        .bind(&record.branch_path)
        .bind(&record.author)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .bind(serde_json::to_value(&record.resource_snapshot)?)
        .execute(&self.pool)
        .await
        .context("Failed to insert version record")?;

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
        sqlx::query(
            r#"
            UPDATE version_records
            SET effective_time = $3, updated_at = $4, resource_snapshot = $5
            WHERE resource_uri = $1 AND version = $2
            "#,
        )
        .bind(resource_uri.to_string())
        .bind(version)
        .bind(effective_time)
        .bind(updated_at)
        .bind(serde_json::to_value(resource_snapshot)?)
        .execute(&self.pool)
        .await
        .context("Failed to touch version record")?;

        Ok(())
    }
}

impl Store for PostgresStore {}
