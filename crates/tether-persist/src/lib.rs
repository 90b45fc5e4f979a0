// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence coordination for the Tether session subsystem.
//!
//! The [`PersistenceCoordinator`] makes session reads fast (TTL cache) and
//! writes durable (primary store), fails over to the secondary store on read
//! failure, and keeps the secondary eventually consistent via a background
//! replication worker.

pub mod cache;
pub mod coordinator;
pub mod export;
pub mod replication;

pub use coordinator::PersistenceCoordinator;
pub use export::ExportFormat;
pub use replication::ReplicationQueue;
