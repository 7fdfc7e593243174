/*
 * Copyright 2024 Clinical Store Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Directory-based advisory locks with leases, automatic renewal, and
//! stale-lock reclamation.
//!
//! A lock is a directory at `<data>/_locks/<lock_id>/` containing one
//! `metadata` file (`{"userName": "..."}`) and one or more
//! `expire-<timestamp>` marker files. Its existence means the lock id is
//! held; the *effective* expiry is the maximum timestamp among its
//! `expire-*` files. Locks are advisory — the store takes no lock for
//! ordinary object I/O, which is serialized by the filesystem rename itself.
//! Callers acquire object-granularity locks through this manager only when
//! they need exclusive editing (e.g. a UI-level "someone else has this
//! client file open" guard).

mod manager;

pub use manager::{AcquireOptions, Lock, LockManager};

use std::time::Duration;

/// Recommended lease duration: a lock is valid for this long without
/// renewal.
pub const DEFAULT_LEASE_TIME: Duration = Duration::from_secs(3 * 60);

/// Recommended renewal interval: a live lock refreshes its lease this often.
pub const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::from_secs(60);

/// The contents of a lock directory's `metadata` file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LockMetadata {
    #[serde(rename = "userName")]
    pub user_name: String,
}
