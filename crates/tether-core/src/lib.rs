// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tether session subsystem.
//!
//! This crate provides the `SessionStore` contract, the error taxonomy, the
//! domain types, and the field-merge engine shared by the persistence
//! coordinator and the synchronization service.

pub mod error;
pub mod merge;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TetherError;
pub use traits::{BackupHook, SessionStore};
pub use types::{
    ConflictType, DeviceSync, HealthStatus, ResolutionStrategy, Session, SessionPatch,
    SessionQuery, SyncConflict, SyncEvent, SyncEventKind, DELETED_AT, MARKED_FOR_DELETION,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _ = TetherError::NotFound { id: "s".into() };
        let _ = TetherError::Storage {
            source: Box::new(std::io::Error::other("x")),
        };
        let _ = TetherError::Validation("bad".into());
        let _ = TetherError::ConflictUnresolved {
            session_id: "s".into(),
            pending: 1,
        };
        let _ = TetherError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _ = TetherError::Config("bad".into());
        let _ = TetherError::Internal("x".into());
    }

    #[test]
    fn store_trait_is_object_safe() {
        fn _assert(_: &dyn SessionStore) {}
    }
}
