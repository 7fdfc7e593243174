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

//! Login and the per-process session handle it produces: the entry point
//! that turns a username and password into the key material every other
//! module needs.

mod account;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::crypto::{WeakKey, WEAK_KEY_SECURITY_LEVEL};
use crate::error::Result;
use crate::events::EventBus;
use crate::lock::LockManager;
use crate::schema::ModelDefinition;
use crate::store::{Collection, CollectionContext};

/// Create the fixed on-disk directories every store instance needs before
/// any account can log in: `_tmp`, `_users`, `_locks`, and one directory per
/// top-level collection.
pub async fn bootstrap(data_dir: &Path, top_level_models: &[Arc<ModelDefinition>]) -> Result<()> {
    for name in ["_tmp", "_users", "_locks"] {
        let dir = data_dir.join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| crate::error::Error::io(&dir, e))?;
    }
    for model in top_level_models {
        let dir = data_dir.join(&model.collection_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| crate::error::Error::io(&dir, e))?;
    }
    Ok(())
}

/// Register a new account. Does not log in; call [`Session::login`]
/// afterward.
pub async fn create_account(data_dir: &Path, user_name: &str, password: &str) -> Result<()> {
    account::create(data_dir, user_name, password.as_bytes()).await
}

pub async fn deactivate_account(data_dir: &Path, user_name: &str) -> Result<()> {
    account::deactivate(data_dir, user_name).await
}

/// A logged-in session: the key material and shared infrastructure needed
/// to open collections and acquire locks, held for the lifetime of the
/// process (or until the caller drops it).
pub struct Session {
    data_dir: PathBuf,
    user_name: String,
    strong_key: crate::crypto::StrongKey,
    weak_key: WeakKey,
    events: EventBus,
    locks: LockManager,
}

impl Session {
    /// Verify `user_name`/`password` against the account store and, on
    /// success, derive this process's strong and weak keys.
    pub async fn login(data_dir: impl Into<PathBuf>, user_name: &str, password: &str) -> Result<Self> {
        let data_dir = data_dir.into();
        let strong_key = account::login(&data_dir, user_name, password.as_bytes()).await?;
        let weak_key = WeakKey::derive(&strong_key, WEAK_KEY_SECURITY_LEVEL);
        let events = EventBus::new();
        let locks = LockManager::new(data_dir.clone(), events.clone());

        tracing::debug!(user = %user_name, "session started");

        Ok(Session {
            data_dir,
            user_name: user_name.to_string(),
            strong_key,
            weak_key,
            events,
            locks,
        })
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Open the root collection API for a top-level model.
    pub fn collection(&self, model: Arc<ModelDefinition>) -> Collection {
        Collection::new(
            model,
            CollectionContext::root(),
            self.data_dir.clone(),
            self.strong_key.clone(),
            self.weak_key.clone(),
            self.user_name.clone(),
            self.events.clone(),
        )
    }
}
