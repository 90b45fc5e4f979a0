// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether status` command implementation.

use tether_config::TetherConfig;
use tether_core::TetherError;
use tether_storage::database::{map_tr_err, Database};

/// Print database health and session counts.
pub async fn run_status(config: &TetherConfig) -> Result<(), TetherError> {
    let db =
        Database::open_with_options(&config.storage.database_path, config.storage.wal_mode)
            .await?;

    let (total, expired): (i64, i64) = db
        .connection()
        .call(|conn| {
            let total = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
            let expired = conn.query_row(
                "SELECT COUNT(*) FROM sessions
                 WHERE expires_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
                |row| row.get(0),
            )?;
            Ok((total, expired))
        })
        .await
        .map_err(map_tr_err)?;

    println!("database: {}", config.storage.database_path);
    println!("sessions: {total} total, {expired} expired");
    println!(
        "replication: {}",
        if config.persist.replication_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "sync: {} ({})",
        if config.sync.enabled { "enabled" } else { "disabled" },
        if config.sync.realtime {
            "real-time"
        } else {
            "periodic"
        }
    );

    db.close().await?;
    Ok(())
}
