pub mod cards;
mod checkpoints;
mod facts;
mod sessions;
pub mod types;

use anyhow::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

/// Durable record of what should be running: agents, their per-role sessions,
/// checkpoints, and the derived fact/card streams with audit trails.
///
/// The store is authoritative for session lifecycle; the in-memory runtime
/// registry is reconciled against it, never the other way around.
pub struct SessionStore {
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SessionStore {
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).await?;
        }

        let db_path = data_dir.join("stagehand.db");
        let db = Connection::open(&db_path)?;
        Self::init_schema(&db)?;

        info!("Session store ready at {:?}", db_path);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS agents (
                agent_id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'idle',
                stage TEXT,
                realtime_model TEXT NOT NULL DEFAULT '',
                stateless_model TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS agent_sessions (
                session_id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                role TEXT NOT NULL,
                transport TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                provider_session_id TEXT,
                connection_count INTEGER NOT NULL DEFAULT 0,
                last_connected_at DATETIME,
                metrics_json TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (event_id, role)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                event_id TEXT NOT NULL,
                role TEXT NOT NULL,
                last_seq_processed INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (event_id, role)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS facts (
                fact_id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0.0,
                last_seen_seq INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (event_id, key)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS fact_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fact_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                action TEXT NOT NULL,
                before_json TEXT,
                after_json TEXT,
                actor TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS cards (
                card_id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                concept_id TEXT NOT NULL,
                concept_label TEXT NOT NULL,
                template_id TEXT NOT NULL,
                card_type TEXT NOT NULL,
                body TEXT,
                label TEXT,
                visual_request TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS card_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                action TEXT NOT NULL,
                before_json TEXT,
                after_json TEXT,
                actor TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_status_transport
             ON agent_sessions (status, transport)",
            [],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests;
