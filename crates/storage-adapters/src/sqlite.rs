//! # SQLite stores
//!
//! Maps tips and bans between SQLite rows and the domain models. The schema
//! is created on connect if missing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::models::{Ban, ModerationStatus, Tip};
use domains::ports::{BanRepo, TipRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::StoreError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tips (
        id BLOB PRIMARY KEY,
        content TEXT NOT NULL,
        moderated_content TEXT NOT NULL,
        identity_hash TEXT NOT NULL,
        encrypted_owner TEXT NOT NULL,
        status TEXT NOT NULL,
        moderation_reason TEXT,
        keywords TEXT NOT NULL,
        submitted_at TEXT NOT NULL,
        submitter_address TEXT
    )",
    "CREATE INDEX IF NOT EXISTS tips_submitted_at ON tips (submitted_at DESC)",
    "CREATE TABLE IF NOT EXISTS bans (
        identifier TEXT PRIMARY KEY,
        reason TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        imposed_at TEXT NOT NULL,
        imposed_by TEXT NOT NULL
    )",
];

/// Opens a pool on `url` and creates the schema.
///
/// In-memory databases are per connection, so those get a single-connection
/// pool to keep every query on the same database.
pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let in_memory = url.contains(":memory:");
    let max_connections = if in_memory { 1 } else { 5 };

    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
    if in_memory {
        // dropping the only connection would drop the database with it
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options
        .connect_with(options)
        .await?;

    for statement in SCHEMA {
        sqlx::query(*statement).execute(&pool).await?;
    }
    info!(max_connections, "sqlite store ready");
    Ok(pool)
}

fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> Result<Uuid, StoreError> {
    Uuid::from_slice(blob).map_err(|e| StoreError::Corrupt(format!("tip id: {e}")))
}

fn row_to_tip(row: &SqliteRow) -> anyhow::Result<Tip> {
    let status: String = row.try_get("status")?;
    let keywords: String = row.try_get("keywords")?;
    Ok(Tip {
        id: blob_to_uuid(row.try_get::<Vec<u8>, _>("id")?.as_slice())?,
        content: row.try_get("content")?,
        moderated_content: row.try_get("moderated_content")?,
        identity_hash: row.try_get("identity_hash")?,
        encrypted_owner: row.try_get("encrypted_owner")?,
        status: ModerationStatus::from_str(&status).map_err(StoreError::Corrupt)?,
        moderation_reason: row.try_get("moderation_reason")?,
        keywords: serde_json::from_str(&keywords)?,
        submitted_at: row.try_get::<DateTime<Utc>, _>("submitted_at")?,
        submitter_address: row.try_get("submitter_address")?,
    })
}

#[derive(Clone)]
pub struct SqliteTipStore {
    pool: SqlitePool,
}

impl SqliteTipStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TipRepo for SqliteTipStore {
    async fn save_tip(&self, tip: &Tip) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO tips (id, content, moderated_content, identity_hash, encrypted_owner, status, moderation_reason, keywords, submitted_at, submitter_address) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(tip.id))
        .bind(&tip.content)
        .bind(&tip.moderated_content)
        .bind(&tip.identity_hash)
        .bind(&tip.encrypted_owner)
        .bind(tip.status.as_str())
        .bind(&tip.moderation_reason)
        .bind(serde_json::to_string(&tip.keywords)?)
        .bind(tip.submitted_at)
        .bind(&tip.submitter_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_tip(&self, id: Uuid) -> anyhow::Result<Option<Tip>> {
        let row = sqlx::query("SELECT * FROM tips WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_tip).transpose()
    }

    async fn recent_tips(&self, limit: usize) -> anyhow::Result<Vec<Tip>> {
        let rows = sqlx::query("SELECT * FROM tips ORDER BY submitted_at DESC, id DESC LIMIT ?")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_tip).collect()
    }
}

#[derive(Clone)]
pub struct SqliteBanStore {
    pool: SqlitePool,
}

impl SqliteBanStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanRepo for SqliteBanStore {
    async fn put_ban(&self, ban: &Ban) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO bans (identifier, reason, expires_at, imposed_at, imposed_by) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&ban.identifier)
        .bind(&ban.reason)
        .bind(ban.expires_at)
        .bind(ban.imposed_at)
        .bind(&ban.imposed_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_ban(&self, identifier: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM bans WHERE identifier = ?")
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn scan_bans(&self) -> anyhow::Result<Vec<Ban>> {
        let rows = sqlx::query("SELECT * FROM bans").fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> anyhow::Result<Ban> {
                Ok(Ban {
                    identifier: row.try_get("identifier")?,
                    reason: row.try_get("reason")?,
                    expires_at: row.try_get("expires_at")?,
                    imposed_at: row.try_get("imposed_at")?,
                    imposed_by: row.try_get("imposed_by")?,
                })
            })
            .collect()
    }
}
