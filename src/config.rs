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

//! Store configuration. The store itself only strictly needs a `data_dir`;
//! everything else is an optional tuning knob with a sane default.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lock::{DEFAULT_LEASE_TIME, DEFAULT_RENEWAL_INTERVAL};

/// Configuration for one store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    #[serde(with = "humantime_secs")]
    pub lock_lease_time: Duration,
    #[serde(with = "humantime_secs")]
    pub lock_renewal_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from("."),
            lock_lease_time: DEFAULT_LEASE_TIME,
            lock_renewal_interval: DEFAULT_RENEWAL_INTERVAL,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StoreConfig {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the host application's usual layered sources
    /// (a `store.toml` file, then `STORE_*` environment overrides). Only
    /// available with the `host-config` feature; most embedders are
    /// expected to construct a [`StoreConfig`] directly instead.
    #[cfg(feature = "host-config")]
    pub fn from_host_environment() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("store").required(false))
            .add_source(config::Environment::with_prefix("STORE"))
            .build()?
            .try_deserialize()
    }

    /// Same as [`from_host_environment`](Self::from_host_environment), but
    /// collapsed into [`anyhow::Error`] for host applications that don't want
    /// to match on `config::ConfigError` themselves.
    #[cfg(feature = "host-config")]
    pub fn from_host_environment_anyhow() -> anyhow::Result<Self> {
        Ok(Self::from_host_environment()?)
    }
}

mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
