// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tether integration tests.

pub mod harness;
pub mod mock_store;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_store::{CountingStore, FailingStore};
