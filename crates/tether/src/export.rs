// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether export` command implementation.

use std::str::FromStr;
use std::sync::Arc;

use tether_config::TetherConfig;
use tether_core::{SessionQuery, SessionStore, TetherError};
use tether_persist::{ExportFormat, PersistenceCoordinator};
use tether_storage::SqliteSessionStore;

/// Serialize a user's sessions to stdout.
pub async fn run_export(
    config: &TetherConfig,
    user_id: &str,
    format: &str,
    limit: usize,
) -> Result<(), TetherError> {
    let format = ExportFormat::from_str(format)?;

    let store = SqliteSessionStore::new(config.storage.clone());
    store.initialize().await?;
    let store: Arc<dyn SessionStore> = Arc::new(store);

    let coordinator =
        PersistenceCoordinator::new(store.clone(), None, config.persist.clone());

    let query = SessionQuery {
        limit,
        offset: 0,
        active_only: false,
    };
    let blob = coordinator.export_all(user_id, &query, format).await?;
    println!("{blob}");

    store.close().await?;
    Ok(())
}
