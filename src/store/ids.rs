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

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::error::{Error, Result};

/// Generate a 128-bit-equivalent random identifier, base64url-encoded.
/// Used for both object ids and revision ids.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode an id back to its raw bytes, as stored in filenames to keep
/// directory names short.
pub fn id_to_bytes(id: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(id)
        .map_err(|e| Error::Codec(format!("malformed id {id:?}: {e}")))
}
