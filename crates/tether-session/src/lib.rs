// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session facade for the Tether subsystem.
//!
//! The [`SessionManager`] is the narrow contract consumed by the HTTP layer
//! and the automation engine: session CRUD, device registration, and
//! pull-based synchronization, with lifecycle notifications on the bus.

pub mod manager;

pub use manager::{CreateSessionRequest, DeviceOrigin, SessionManager, SyncReport};
