// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The `Database` struct IS the single writer; query modules accept
//! `&Database` and call through `db.connection().call()`. Do NOT create
//! additional Connection instances for writes.

use std::path::Path;

use tether_core::TetherError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Convert tokio-rusqlite errors into the subsystem storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> TetherError {
    TetherError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the WAL-mode SQLite database with migrations applied.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run all
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, TetherError> {
        Self::open_with_options(path, true).await
    }

    /// Open with explicit WAL control. Non-WAL mode is only useful for
    /// read-only tooling against a copied file.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, TetherError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(TetherError::storage)?;
        }

        // Migrations run on a dedicated blocking connection before the single
        // writer opens; after this point every statement goes through `conn`.
        let migration_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), TetherError> {
            let mut conn =
                rusqlite::Connection::open(&migration_path).map_err(TetherError::storage)?;
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")
                    .map_err(TetherError::storage)?;
            }
            migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| TetherError::Internal(format!("migration task panicked: {e}")))??;

        let conn = Connection::open(path).await.map_err(TetherError::storage)?;

        conn.call(|conn| {
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection (single writer).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(&self) -> Result<(), TetherError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}
