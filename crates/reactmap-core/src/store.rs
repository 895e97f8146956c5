//! SQLite persistence for reaction analysis.
//!
//! One store owns a single connection to the archive database. The base
//! `messages` and `reactions` tables are populated by the importer and only
//! read here; the analysis tables (contexts, embedding cache, runs) are owned
//! by this crate. Operations are spread over several modules as
//! `impl ReactionStore` blocks.

use crate::{ReactmapError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Row totals of the base conversation store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BaseCounts {
    pub messages: u64,
    pub reactions: u64,
}

/// SQLite-backed store for contexts, cached embeddings and clustering runs.
pub struct ReactionStore {
    conn: Mutex<Connection>,
}

impl ReactionStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        info!(target: "reactmap::store", "Opened store at {}", path.display());
        Self::from_connection(conn)
    }

    /// Wrap an existing connection, e.g. an in-memory database.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        store.migrate()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ReactmapError::LockPoisoned)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                ts TEXT PRIMARY KEY,
                channel_id TEXT,
                user TEXT,
                text TEXT,
                thread_ts TEXT,
                reply_count INTEGER
            );

            CREATE TABLE IF NOT EXISTS reactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_ts TEXT,
                name TEXT,
                user TEXT
            );

            CREATE TABLE IF NOT EXISTS reaction_contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reaction_name TEXT NOT NULL,
                message_ts TEXT NOT NULL,
                message_text TEXT,
                reactor_user TEXT,
                message_author TEXT,
                channel_id TEXT,
                UNIQUE(reaction_name, message_ts, reactor_user)
            );

            CREATE TABLE IF NOT EXISTS embeddings_cache (
                content_key TEXT NOT NULL,
                model_name TEXT NOT NULL,
                embedding BLOB NOT NULL,
                embedding_dim INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (content_key, model_name)
            );

            CREATE TABLE IF NOT EXISTS clustering_runs (
                run_id TEXT PRIMARY KEY,
                algorithm TEXT NOT NULL,
                params_json TEXT NOT NULL,
                text_weight REAL NOT NULL,
                behavior_weight REAL NOT NULL,
                n_clusters INTEGER NOT NULL,
                silhouette_score REAL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cluster_assignments (
                run_id TEXT NOT NULL REFERENCES clustering_runs(run_id) ON DELETE CASCADE,
                reaction_name TEXT NOT NULL,
                cluster_id INTEGER NOT NULL,
                confidence REAL NOT NULL,
                PRIMARY KEY (run_id, reaction_name)
            );

            CREATE INDEX IF NOT EXISTS idx_reactions_message ON reactions(message_ts);
            CREATE INDEX IF NOT EXISTS idx_reaction_contexts_name ON reaction_contexts(reaction_name);
            CREATE INDEX IF NOT EXISTS idx_reaction_contexts_ts ON reaction_contexts(message_ts);
            CREATE INDEX IF NOT EXISTS idx_clustering_runs_created ON clustering_runs(created_at);
            "#,
        )?;
        Ok(())
    }

    /// Run migrations for schema updates.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;

        // Older databases keyed the embedding cache by message timestamp
        let has_content_key: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('embeddings_cache') WHERE name = 'content_key'",
                [],
                |row| row.get(0),
            )?;

        if !has_content_key {
            info!(target: "reactmap::store", "Dropping legacy timestamp-keyed embedding cache");
            conn.execute_batch(
                r#"
                DROP TABLE IF EXISTS embeddings_cache;
                CREATE TABLE embeddings_cache (
                    content_key TEXT NOT NULL,
                    model_name TEXT NOT NULL,
                    embedding BLOB NOT NULL,
                    embedding_dim INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (content_key, model_name)
                );
                "#,
            )?;
        }

        Ok(())
    }

    /// Count rows in the base message and reaction tables.
    pub fn base_counts(&self) -> Result<BaseCounts> {
        let conn = self.conn()?;
        let messages: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        let reactions: i64 =
            conn.query_row("SELECT COUNT(*) FROM reactions", [], |row| row.get(0))?;
        Ok(BaseCounts {
            messages: messages as u64,
            reactions: reactions as u64,
        })
    }
}
