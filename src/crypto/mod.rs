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

//! Two key kinds, two ciphers.
//!
//! A **strong** key encrypts object payloads with authenticated,
//! non-deterministic encryption (`XChaCha20Poly1305`): identical plaintexts
//! produce distinct ciphertexts. A **weak** key, deterministically derived
//! from the strong key plus a security-level integer, encrypts filenames
//! with a deterministic, short-overhead scheme (`AES-SIV`) so that `list()`
//! can correlate directory names across process invocations without storing
//! a separate filename key anywhere.
//!
//! The weak cipher provides no meaningful confidentiality against an
//! attacker who can compare ciphertexts for equality, and filenames carry no
//! authentication tag of their own — tampering with a filename is instead
//! caught by the context fields embedded in the (authenticated) payload; see
//! [`crate::store::object`].

mod cipher;
mod keys;

pub use cipher::{strong_decrypt, strong_encrypt, weak_decrypt, weak_encrypt};
pub use keys::{KeySalt, StrongKey, WeakKey};

/// The "security level" parameter mixed into weak-key derivation, fixed at
/// this crate's one supported level. Its only role is to domain-separate the
/// weak key from the strong key it's derived from.
pub const WEAK_KEY_SECURITY_LEVEL: u32 = 5;
