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

use aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng};
use aes_siv::Aes128SivAead;
use chacha20poly1305::XChaCha20Poly1305;

use super::keys::{StrongKey, WeakKey};
use crate::error::{Error, Result};

/// Encrypt `plaintext` under `key` with `XChaCha20Poly1305`. A fresh random
/// 24-byte nonce is generated for every call and prepended to the returned
/// ciphertext, so identical plaintexts never produce identical output.
pub fn strong_encrypt(key: &StrongKey, plaintext: &[u8]) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let mut ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("encryption of an in-memory buffer cannot fail");
    let mut out = nonce.to_vec();
    out.append(&mut ciphertext);
    out
}

/// Inverse of [`strong_encrypt`]. Fails with [`Error::Decryption`] if the
/// authentication tag does not verify, which is the only way this function
/// can fail short of `data` being shorter than one nonce.
pub fn strong_decrypt(key: &StrongKey, data: &[u8]) -> Result<Vec<u8>> {
    const NONCE_LEN: usize = 24;
    if data.len() < NONCE_LEN {
        return Err(Error::Decryption);
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    cipher
        .decrypt(GenericArray::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| Error::Decryption)
}

/// Encrypt `plaintext` under `key` with deterministic `AES-SIV`: the same
/// `(key, plaintext)` pair always yields the same ciphertext, which is what
/// lets [`crate::store::Collection::list`] correlate directory names across
/// process invocations without decrypting payloads.
///
/// The nonce is fixed at all-zero: `AES-SIV` is nonce-misuse-resistant by
/// construction, so a constant nonce degrades only to "deterministic",
/// never to a confidentiality or integrity break — which is exactly the
/// property filenames need.
pub fn weak_encrypt(key: &WeakKey, plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes128SivAead::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = GenericArray::default();
    cipher
        .encrypt(&nonce, plaintext)
        .expect("encryption of an in-memory buffer cannot fail")
}

/// Inverse of [`weak_encrypt`].
pub fn weak_decrypt(key: &WeakKey, data: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128SivAead::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = GenericArray::default();
    cipher.decrypt(&nonce, data).map_err(|_| Error::Decryption)
}
