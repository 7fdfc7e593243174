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

use argon2::Argon2;
use hkdf::Hkdf;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

const STRONG_KEY_LEN: usize = 32;
const WEAK_KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// The strong symmetric key used to encrypt object payloads, and to encrypt
/// the account key file on disk.
///
/// Held on a [`crate::session::Session`] for the lifetime of the process.
/// Zeroed on drop.
pub struct StrongKey(Secret<Vec<u8>>);

impl Clone for StrongKey {
    fn clone(&self) -> Self {
        StrongKey(Secret::new(self.0.expose_secret().clone()))
    }
}

impl StrongKey {
    /// Generate a new random strong key using the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; STRONG_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        StrongKey(Secret::new(bytes))
    }

    /// Wrap existing key bytes, e.g. after decrypting an account key file.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        StrongKey(Secret::new(bytes))
    }

    /// Derive a strong key from a password and salt via Argon2id. Used only
    /// at login; the password itself is never written anywhere.
    pub fn derive_from_password(password: &[u8], salt: &KeySalt) -> Self {
        let mut out = vec![0u8; STRONG_KEY_LEN];
        Argon2::default()
            .hash_password_into(password, &salt.0, &mut out)
            .expect("argon2 output buffer has a fixed valid length");
        StrongKey(Secret::new(out))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for StrongKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StrongKey(..)")
    }
}

/// The deterministic key used only to encrypt filenames.
pub struct WeakKey(Secret<Vec<u8>>);

impl Clone for WeakKey {
    fn clone(&self) -> Self {
        WeakKey(Secret::new(self.0.expose_secret().clone()))
    }
}

impl WeakKey {
    /// Derive a weak key from a strong key and a security-level integer via
    /// HKDF-SHA256. Deterministic: the same `(strong_key, security_level)`
    /// pair always yields the same weak key, which is required for `list()`
    /// to correlate directory names across process invocations.
    pub fn derive(strong: &StrongKey, security_level: u32) -> Self {
        let hk = Hkdf::<Sha256>::new(None, strong.as_bytes());
        let mut out = vec![0u8; WEAK_KEY_LEN];
        hk.expand(&security_level.to_be_bytes(), &mut out)
            .expect("WEAK_KEY_LEN is a valid HKDF-SHA256 output length");
        WeakKey(Secret::new(out))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for WeakKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakKey(..)")
    }
}

/// A random per-account salt used in password-based key derivation, stored
/// alongside the account (not secret, but must be unique per account).
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeySalt(#[serde(with = "salt_as_base64")] Vec<u8>);

impl KeySalt {
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        KeySalt(bytes)
    }
}

mod salt_as_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_key_derivation_is_deterministic() {
        let strong = StrongKey::generate();
        let a = WeakKey::derive(&strong, 5);
        let b = WeakKey::derive(&strong, 5);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn weak_key_derivation_is_domain_separated_by_level() {
        let strong = StrongKey::generate();
        let a = WeakKey::derive(&strong, 5);
        let b = WeakKey::derive(&strong, 6);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn password_derivation_is_deterministic_given_same_salt() {
        let salt = KeySalt::generate();
        let a = StrongKey::derive_from_password(b"hunter2", &salt);
        let b = StrongKey::derive_from_password(b"hunter2", &salt);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }
}
