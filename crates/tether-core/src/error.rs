// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tether session subsystem.

use thiserror::Error;

/// The primary error type used across the Tether storage contract and
/// persistence/synchronization components.
#[derive(Debug, Error)]
pub enum TetherError {
    /// Session absent in all consulted stores.
    #[error("session not found: {id}")]
    NotFound { id: String },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed session or event payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// A strict caller required conflict resolution before proceeding, but the
    /// conflict ledger for the session is non-empty.
    #[error("{pending} unresolved conflict(s) for session {session_id}")]
    ConflictUnresolved { session_id: String, pending: usize },

    /// A storage call exceeded its deadline and is treated as a storage failure.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TetherError {
    /// Wrap an arbitrary backend error as a storage error.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TetherError::Storage {
            source: Box::new(source),
        }
    }

    /// True for errors that the read path may mask by falling back to the
    /// secondary store: backend failures and deadline expiries. `NotFound`
    /// and validation errors are never maskable.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            TetherError::Storage { .. } | TetherError::Timeout { .. }
        )
    }
}
