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

//! One fixed, sortable timestamp format used throughout the store: revision
//! filenames, lock expiry markers, and object metadata all share it, so that
//! lexical sort and chronological sort always agree.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format as `YYYY-MM-DDTHH:mm:ss.SSSZ`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Codec(format!("malformed timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_lexically_sortable() {
        let a = now();
        let b = a + chrono::Duration::milliseconds(1);
        assert!(format_timestamp(a) < format_timestamp(b));
    }

    #[test]
    fn round_trips() {
        let ts = now();
        let formatted = format_timestamp(ts);
        let parsed = parse_timestamp(&formatted).unwrap();
        assert_eq!(format_timestamp(parsed), formatted);
    }
}
