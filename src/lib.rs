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

//! A local, encrypted, revision-tracked object store for clinical-notes
//! applications.
//!
//! Objects are JSON documents, validated against a [`schema::ModelDefinition`]
//! and stored one directory per object under a plaintext-on-the-outside,
//! encrypted-on-the-inside tree: directory and file *names* are encrypted
//! deterministically so the filesystem can still be browsed and diffed by
//! index, while file *contents* are encrypted with a strong, non-deterministic
//! cipher. Every write lands through the same stage-in-a-tmp-dir-then-rename
//! primitive in [`fs`], so a crash mid-write never leaves a torn object on
//! disk.
//!
//! ```no_run
//! # async fn run() -> clinical_store::Result<()> {
//! use clinical_store::session::Session;
//!
//! let session = Session::login("/path/to/data", "alice", "hunter2").await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod crypto;
mod error;
pub mod events;
pub mod fs;
pub mod lock;
pub mod schema;
pub mod session;
pub mod store;
mod time;

pub use error::{Error, Result};
pub use events::StoreEvent;
