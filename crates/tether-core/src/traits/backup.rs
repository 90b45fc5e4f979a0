// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hook invoked by the persistence coordinator's periodic backup timer.

use async_trait::async_trait;

use crate::error::TetherError;

/// A pluggable backup action. The coordinator only drives the schedule; what
/// a backup means (SQLite online copy, filesystem snapshot, ...) is the
/// backend's business.
#[async_trait]
pub trait BackupHook: Send + Sync + 'static {
    async fn run(&self) -> Result<(), TetherError>;
}
