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

//! Packs a sequence of byte-string components into one byte string suitable
//! for weak-encryption and filesystem storage, and reverses that packing.
//!
//! - Within a component, the byte `0x00` is escaped as `0x00 0x4C` (`L`).
//! - Components are separated by `0x00 0x53` (`S`).
//! - Every other byte passes through unchanged.
//!
//! An object-directory name encodes `[index_value_0, …, index_value_{k-1},
//! id_bytes]`; a revision-file name encodes `[timestamp_utf8,
//! revision_id_bytes]`. The encoded bytes are then weak-encrypted and
//! base64url-encoded before they touch the filesystem — see
//! [`crate::crypto`] and [`to_filename`]/[`from_filename`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::crypto::{weak_decrypt, weak_encrypt, WeakKey};
use crate::error::{Error, Result};

const ESCAPE_MARKER: u8 = 0x4C; // 'L'
const SEPARATOR_MARKER: u8 = 0x53; // 'S'

/// Encode an ordered list of byte-string components into one byte string.
pub fn encode(components: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            out.push(0x00);
            out.push(SEPARATOR_MARKER);
        }
        for &byte in component {
            if byte == 0x00 {
                out.push(0x00);
                out.push(ESCAPE_MARKER);
            } else {
                out.push(byte);
            }
        }
    }
    out
}

/// Decode exactly `component_count` components out of `data`.
///
/// Fails if the encoding ends mid-escape, or if it does not contain exactly
/// `component_count` components.
pub fn decode(data: &[u8], component_count: usize) -> Result<Vec<Vec<u8>>> {
    let mut components = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;

    while i < data.len() {
        if data[i] == 0x00 {
            let marker = *data.get(i + 1).ok_or_else(|| {
                Error::Codec("unterminated escape sequence at end of filename".into())
            })?;
            match marker {
                ESCAPE_MARKER => current.push(0x00),
                SEPARATOR_MARKER => {
                    components.push(std::mem::take(&mut current));
                }
                other => {
                    return Err(Error::Codec(format!(
                        "unknown escape marker byte 0x{:02x}",
                        other
                    )))
                }
            }
            i += 2;
        } else {
            current.push(data[i]);
            i += 1;
        }
    }
    components.push(current);

    if components.len() != component_count {
        return Err(Error::Codec(format!(
            "expected {} components, found {}",
            component_count,
            components.len()
        )));
    }

    Ok(components)
}

/// Encode `components`, weak-encrypt, and base64url-encode the result for
/// storage as a filesystem name.
pub fn to_filename(components: &[Vec<u8>], key: &WeakKey) -> String {
    let plaintext = encode(components);
    let ciphertext = weak_encrypt(key, &plaintext);
    URL_SAFE_NO_PAD.encode(ciphertext)
}

/// Inverse of [`to_filename`].
pub fn from_filename(name: &str, component_count: usize, key: &WeakKey) -> Result<Vec<Vec<u8>>> {
    let ciphertext = URL_SAFE_NO_PAD
        .decode(name)
        .map_err(|e| Error::Codec(format!("invalid base64url filename: {e}")))?;
    let plaintext = weak_decrypt(key, &ciphertext)?;
    decode(&plaintext, component_count)
}
