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

//! On-disk account records.
//!
//! Each account holds a random strong key, encrypted at rest under a key
//! derived from the account's password via Argon2id. Changing a password
//! therefore only re-encrypts this one small record, not the whole store:
//! the content encryption key and the password-derived wrapping key are
//! kept separate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::{strong_decrypt, strong_encrypt, KeySalt, StrongKey};
use crate::error::{Error, Result};
use crate::fs;

const ACCOUNT_FILE: &str = "account.json";

#[derive(Debug, Serialize, Deserialize)]
struct AccountRecord {
    salt: KeySalt,
    #[serde(with = "key_as_base64")]
    encrypted_key: Vec<u8>,
    deactivated: bool,
}

mod key_as_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

fn user_dir(data_dir: &Path, user_name: &str) -> PathBuf {
    data_dir.join("_users").join(user_name)
}

/// Create a new account with a freshly generated random strong key, wrapped
/// under a password-derived key. Errors if the account directory already
/// exists (callers should check [`exists`] first if they want a friendlier
/// "username taken" message).
pub async fn create(data_dir: &Path, user_name: &str, password: &[u8]) -> Result<()> {
    let dir = user_dir(data_dir, user_name);
    let tmp_root = data_dir.join("_tmp");
    let (staged, commit) = fs::write_directory(&dir, &tmp_root).await?;

    let salt = KeySalt::generate();
    let kek = StrongKey::derive_from_password(password, &salt);
    let strong_key = StrongKey::generate();
    let encrypted_key = strong_encrypt(&kek, strong_key.as_bytes());

    let record = AccountRecord {
        salt,
        encrypted_key,
        deactivated: false,
    };
    let bytes = serde_json::to_vec(&record).expect("account record always serializes");
    let record_path = staged.join(ACCOUNT_FILE);
    tokio::fs::write(&record_path, &bytes)
        .await
        .map_err(|e| Error::io(&record_path, e))?;

    commit.commit().await
}

pub async fn exists(data_dir: &Path, user_name: &str) -> bool {
    tokio::fs::metadata(user_dir(data_dir, user_name).join(ACCOUNT_FILE))
        .await
        .is_ok()
}

/// Verify a password and return the account's strong key.
///
/// # Errors
///
/// [`Error::UnknownUserName`] if no such account exists, [`Error::IncorrectPassword`]
/// if the password does not unwrap the stored key, [`Error::DeactivatedAccount`]
/// if the account exists and the password is correct but it has been deactivated.
pub async fn login(data_dir: &Path, user_name: &str, password: &[u8]) -> Result<StrongKey> {
    let record_path = user_dir(data_dir, user_name).join(ACCOUNT_FILE);
    let bytes = tokio::fs::read(&record_path)
        .await
        .map_err(|_| Error::UnknownUserName(user_name.to_string()))?;
    let record: AccountRecord = serde_json::from_slice(&bytes).map_err(|e| Error::Integrity {
        path: record_path.clone(),
        message: format!("corrupt account record: {e}"),
    })?;

    let kek = StrongKey::derive_from_password(password, &record.salt);
    let key_bytes = strong_decrypt(&kek, &record.encrypted_key)
        .map_err(|_| Error::IncorrectPassword(user_name.to_string()))?;

    if record.deactivated {
        return Err(Error::DeactivatedAccount(user_name.to_string()));
    }

    Ok(StrongKey::from_bytes(key_bytes))
}

/// Mark an account deactivated without deleting its record, so future
/// logins fail with [`Error::DeactivatedAccount`] rather than
/// [`Error::UnknownUserName`].
pub async fn deactivate(data_dir: &Path, user_name: &str) -> Result<()> {
    let dir = user_dir(data_dir, user_name);
    let record_path = dir.join(ACCOUNT_FILE);
    let bytes = tokio::fs::read(&record_path)
        .await
        .map_err(|_| Error::UnknownUserName(user_name.to_string()))?;
    let mut record: AccountRecord = serde_json::from_slice(&bytes).map_err(|e| Error::Integrity {
        path: record_path.clone(),
        message: format!("corrupt account record: {e}"),
    })?;
    record.deactivated = true;

    let tmp_root = data_dir.join("_tmp");
    let out = serde_json::to_vec(&record).expect("account record always serializes");
    fs::write_buffer_to_file(&record_path, &tmp_root, &out).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_succeeds_with_correct_password() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), "alice", b"hunter2").await.unwrap();
        let key = login(dir.path(), "alice", b"hunter2").await.unwrap();
        assert_eq!(key.as_bytes().len(), 32);
    }

    #[tokio::test]
    async fn login_fails_with_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), "alice", b"hunter2").await.unwrap();
        let err = login(dir.path(), "alice", b"wrong").await.unwrap_err();
        assert!(matches!(err, Error::IncorrectPassword(_)));
    }

    #[tokio::test]
    async fn login_fails_for_unknown_user() {
        let dir = tempfile::tempdir().unwrap();
        let err = login(dir.path(), "nobody", b"hunter2").await.unwrap_err();
        assert!(matches!(err, Error::UnknownUserName(_)));
    }

    #[tokio::test]
    async fn login_fails_after_deactivation() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), "alice", b"hunter2").await.unwrap();
        deactivate(dir.path(), "alice").await.unwrap();
        let err = login(dir.path(), "alice", b"hunter2").await.unwrap_err();
        assert!(matches!(err, Error::DeactivatedAccount(_)));
    }

    #[tokio::test]
    async fn two_accounts_derive_independent_keys() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), "alice", b"hunter2").await.unwrap();
        create(dir.path(), "bob", b"hunter2").await.unwrap();
        let a = login(dir.path(), "alice", b"hunter2").await.unwrap();
        let b = login(dir.path(), "bob", b"hunter2").await.unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
