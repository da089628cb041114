// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! codeloom-storage: key-value store semantics, the materialized job
//! store, and the progress bus.
//!
//! The key-value trait mirrors what the deployment's store (e.g. Redis)
//! must provide; [`MemoryStore`] is the bundled single-node
//! implementation and the one tests run against.

pub mod bus;
pub mod jobs;
pub mod keys;
pub mod kv;
pub mod memory;

pub use bus::{ProgressBus, Subscription};
pub use jobs::{JobPage, JobStore, ListQuery, SortField, SortOrder};
pub use kv::{KeyValueStore, StorageError};
pub use memory::MemoryStore;
