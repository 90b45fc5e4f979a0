// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether cleanup` command implementation.

use tether_config::TetherConfig;
use tether_core::{SessionStore, TetherError};
use tether_storage::SqliteSessionStore;

/// Run one expiry sweep against the configured database.
pub async fn run_cleanup(config: &TetherConfig) -> Result<(), TetherError> {
    let store = SqliteSessionStore::new(config.storage.clone());
    store.initialize().await?;

    let removed = store.cleanup().await?;
    println!("removed {removed} expired session(s)");

    store.close().await?;
    Ok(())
}
