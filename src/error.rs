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

use std::io;
use std::path::PathBuf;

use crate::lock::LockMetadata;

/// The error type for all fallible operations in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A filesystem call failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The schema rejected a payload before it was ever written.
    #[error("validation failed for {collection}: {message}")]
    Validation { collection: String, message: String },

    /// A decrypted payload's embedded context did not match the path it was
    /// found at. This indicates a ciphertext was moved between locations.
    #[error("integrity check failed at {path}: {message}")]
    Integrity { path: PathBuf, message: String },

    /// No object directory in the collection decoded to the requested id.
    #[error("no object with id {id} in collection {collection}")]
    ObjectNotFound { collection: String, id: String },

    /// A lock is held by another, non-stale, holder.
    #[error("lock {lock_id} is held by {}", .metadata.user_name)]
    LockInUse {
        lock_id: String,
        metadata: LockMetadata,
    },

    #[error("no account named {0}")]
    UnknownUserName(String),

    #[error("incorrect password for {0}")]
    IncorrectPassword(String),

    #[error("account {0} has been deactivated")]
    DeactivatedAccount(String),

    /// Ciphertext failed to authenticate. Distinct from `Integrity`: this is
    /// raised by the crypto layer itself, before any context fields are
    /// inspected.
    #[error("ciphertext authentication failed")]
    Decryption,

    /// The filename codec was given malformed input: an unterminated escape
    /// sequence or the wrong component count.
    #[error("malformed filename encoding: {0}")]
    Codec(String),

    /// A task driving a background operation (e.g. lock renewal) panicked
    /// or was cancelled unexpectedly.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
