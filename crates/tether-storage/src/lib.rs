// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage backends for the Tether session subsystem.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`, an in-process
//! volatile store for replica/test use, and online database backup.

pub mod backup;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod queries;
pub mod sqlite;

pub use backup::{run_backup, run_restore, SqliteBackupHook};
pub use database::Database;
pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
