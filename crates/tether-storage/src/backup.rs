// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Online SQLite backup and restore.
//!
//! Uses rusqlite's Backup API for atomic, consistent copies that work even
//! while the database is being written to in WAL mode. The paced copy (100
//! pages per step, 10 ms sleeps) lets a running instance keep writing.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::info;

use tether_core::{BackupHook, TetherError};

/// Run a backup of the SQLite database to the specified path.
pub fn run_backup(db_path: &str, backup_path: &str) -> Result<(), TetherError> {
    let src_path = Path::new(db_path);
    if !src_path.exists() {
        return Err(TetherError::Storage {
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database not found: {db_path}"),
            )),
        });
    }

    // Open source read-only to minimize impact on a running instance.
    let src = Connection::open_with_flags(
        db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(TetherError::storage)?;

    let mut dst = Connection::open(backup_path).map_err(TetherError::storage)?;

    let backup =
        rusqlite::backup::Backup::new(&src, &mut dst).map_err(TetherError::storage)?;

    backup
        .run_to_completion(100, Duration::from_millis(10), None)
        .map_err(TetherError::storage)?;

    let metadata = std::fs::metadata(backup_path).map_err(TetherError::storage)?;
    info!(
        backup_path,
        bytes = metadata.len(),
        "database backup complete"
    );

    Ok(())
}

/// Restore the database from a backup file.
///
/// Creates a safety backup of the current DB before overwriting and validates
/// that the source is a readable SQLite database.
pub fn run_restore(db_path: &str, restore_from: &str) -> Result<(), TetherError> {
    let src_path = Path::new(restore_from);
    if !src_path.exists() {
        return Err(TetherError::Storage {
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backup file not found: {restore_from}"),
            )),
        });
    }

    // Quick validation: can we open and query it?
    let test_conn =
        Connection::open_with_flags(restore_from, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(TetherError::storage)?;
    test_conn
        .execute_batch("SELECT 1")
        .map_err(TetherError::storage)?;
    drop(test_conn);

    // Safety backup of the current DB (if it exists).
    let dst_path = Path::new(db_path);
    if dst_path.exists() {
        let pre_restore_path = format!("{db_path}.pre-restore");
        info!(pre_restore_path, "creating safety backup before restore");
        run_backup(db_path, &pre_restore_path)?;
    }

    let src =
        Connection::open_with_flags(restore_from, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(TetherError::storage)?;
    let mut dst = Connection::open(db_path).map_err(TetherError::storage)?;

    let backup =
        rusqlite::backup::Backup::new(&src, &mut dst).map_err(TetherError::storage)?;
    backup
        .run_to_completion(100, Duration::from_millis(10), None)
        .map_err(TetherError::storage)?;

    info!(db_path, restore_from, "database restore complete");
    Ok(())
}

/// [`BackupHook`] implementation driving [`run_backup`] from the persistence
/// coordinator's periodic backup timer.
pub struct SqliteBackupHook {
    db_path: String,
    backup_path: String,
}

impl SqliteBackupHook {
    pub fn new(db_path: String, backup_path: String) -> Self {
        Self {
            db_path,
            backup_path,
        }
    }
}

#[async_trait]
impl BackupHook for SqliteBackupHook {
    async fn run(&self) -> Result<(), TetherError> {
        let db_path = self.db_path.clone();
        let backup_path = self.backup_path.clone();
        // The Backup API is blocking; keep it off the async workers.
        tokio::task::spawn_blocking(move || run_backup(&db_path, &backup_path))
            .await
            .map_err(|e| TetherError::Internal(format!("backup task panicked: {e}")))?
    }
}
