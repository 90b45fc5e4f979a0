// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-device synchronization for the Tether session subsystem.
//!
//! The [`SyncService`] accepts mutation events tagged with origin device and
//! logical version, detects ordering disagreements, resolves or surfaces
//! them, and broadcasts reconciled events to the other devices tracking a
//! session.

pub mod service;

pub use service::{SyncOutcome, SyncService, SyncStats};
