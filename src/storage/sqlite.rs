//! SQLite backend via sqlx.
//!
//! One table, `kv(resource, id, value)`, with the value stored as JSON text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{KvBackend, StoreKey};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS kv (
    resource TEXT NOT NULL,
    id TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (resource, id)
)";

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connect to `url` (a `sqlite:` URL or a plain file path), creating the
    /// database and table if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite://{url}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own database,
        // so those must share a single connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database: {url}"))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .context("Failed to create kv table")?;

        info!(url = %url, "SQLite store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn get(&self, key: &StoreKey) -> Result<Option<Value>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv WHERE resource = ?1 AND id = ?2")
                .bind(&key.resource)
                .bind(&key.id)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to read {key}"))?;

        row.map(|text| {
            serde_json::from_str(&text).with_context(|| format!("Corrupt value stored at {key}"))
        })
        .transpose()
    }

    async fn put(&self, key: &StoreKey, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value).context("Failed to serialise value")?;
        sqlx::query(
            "INSERT INTO kv (resource, id, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (resource, id) DO UPDATE SET value = excluded.value",
        )
        .bind(&key.resource)
        .bind(&key.id)
        .bind(text)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write {key}"))?;
        Ok(())
    }

    async fn clear_resource(&self, resource: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE resource = ?1")
            .bind(resource)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to clear {resource}"))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
