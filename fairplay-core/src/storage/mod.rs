pub mod history_store;

pub use history_store::{HistoryStore, HistoryTotals, RoundRecord};

use crate::error::{FairPlayError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;

/// SQLite database holding settled rounds. Secrets never reach it.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| {
                    FairPlayError::internal(format!("Failed to create directory: {}", e))
                })?;
        }

        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    pub async fn in_memory() -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS rounds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id INTEGER NOT NULL,
                player TEXT NOT NULL,
                wager INTEGER NOT NULL,
                my_move TEXT NOT NULL,
                opponent_move TEXT,
                outcome TEXT NOT NULL,
                net INTEGER NOT NULL,
                settled_at INTEGER NOT NULL,
                UNIQUE (match_id, player)
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
