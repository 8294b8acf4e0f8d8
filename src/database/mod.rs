use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::{info, warn};

use crate::models::QuotaRecord;
use crate::traits::QuotaStore;

/// Key under which the quota record is stored
pub const QUOTA_KEY: &str = "gemini_outfit_limit";

/// Quota record persisted as one JSON value in a SQLite key/value table
#[derive(Clone)]
pub struct SqliteQuotaStore {
    pool: SqlitePool,
}

impl SqliteQuotaStore {
    pub async fn connect(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            if let Some(parent) = database_path(db_url).and_then(Path::parent)
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }

            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePool::connect(db_url).await?;

        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }
}

fn database_path(db_url: &str) -> Option<&Path> {
    let path = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;

    (path != ":memory:").then(|| Path::new(path))
}

#[async_trait]
impl QuotaStore for SqliteQuotaStore {
    async fn read(&self) -> Result<Option<QuotaRecord>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(QUOTA_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value = row.get::<String, _>("value");
        match serde_json::from_str(&value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Discarding malformed quota record {:?}: {}", value, e);
                Ok(None)
            }
        }
    }

    async fn write(&self, record: &QuotaRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;

        sqlx::query(
            r"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
        )
        .bind(QUOTA_KEY)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
