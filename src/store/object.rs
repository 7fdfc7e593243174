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

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::time::{format_timestamp, parse_timestamp};

/// The metadata fields the store stamps onto every object, beyond whatever
/// the model itself declares.
pub const METADATA_FIELDS: &[&str] = &["id", "revisionId", "timestamp", "author"];

const CONTEXT_COLLECTION_NAMES: &str = "_contextCollectionNames";
const CONTEXT_IDS: &str = "_contextIds";
const CONTEXT_COLLECTION_NAME: &str = "_collectionName";

/// A fully materialized object revision, as returned to callers: the
/// model's own fields plus the stamped metadata fields, with all internal
/// context fields stripped.
pub type ObjectRecord = Map<String, Value>;

/// A summary of one historical revision, as returned by `list_revisions`:
/// enough to identify and order it, without decrypting its payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RevisionSummary {
    pub revision_id: String,
    pub timestamp: String,
}

pub(crate) fn contains_any_metadata_field(obj: &Map<String, Value>) -> bool {
    METADATA_FIELDS.iter().any(|f| obj.contains_key(*f))
}

pub(crate) fn extract_id(obj: &Map<String, Value>) -> Result<String> {
    obj.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Validation {
            collection: String::new(),
            message: "missing required field id".to_string(),
        })
}

pub(crate) fn stamp_create_metadata(
    obj: &mut Map<String, Value>,
    id: &str,
    revision_id: &str,
    author: &str,
    timestamp: DateTime<Utc>,
) {
    obj.insert("id".to_string(), Value::String(id.to_string()));
    obj.insert(
        "revisionId".to_string(),
        Value::String(revision_id.to_string()),
    );
    obj.insert("author".to_string(), Value::String(author.to_string()));
    obj.insert(
        "timestamp".to_string(),
        Value::String(format_timestamp(timestamp)),
    );
}

pub(crate) fn stamp_revision_metadata(
    obj: &mut Map<String, Value>,
    revision_id: &str,
    author: &str,
    timestamp: DateTime<Utc>,
) {
    obj.insert(
        "revisionId".to_string(),
        Value::String(revision_id.to_string()),
    );
    obj.insert("author".to_string(), Value::String(author.to_string()));
    obj.insert(
        "timestamp".to_string(),
        Value::String(format_timestamp(timestamp)),
    );
}

pub(crate) fn object_timestamp(obj: &Map<String, Value>) -> Result<DateTime<Utc>> {
    obj.get("timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation {
            collection: String::new(),
            message: "missing required field timestamp".to_string(),
        })
        .and_then(parse_timestamp)
}

/// Embed the fields that tie a payload to the physical path it is about to
/// be written at. Checked on every read via [`verify_and_strip_context`].
pub(crate) fn embed_context(
    obj: &mut Map<String, Value>,
    collection_name: &str,
    context_collection_names: &[String],
    context_ids: &[String],
) {
    obj.insert(
        CONTEXT_COLLECTION_NAMES.to_string(),
        Value::Array(
            context_collection_names
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        ),
    );
    obj.insert(
        CONTEXT_IDS.to_string(),
        Value::Array(context_ids.iter().cloned().map(Value::String).collect()),
    );
    obj.insert(
        CONTEXT_COLLECTION_NAME.to_string(),
        Value::String(collection_name.to_string()),
    );
}

/// Verify the embedded context fields match the physical path the payload
/// was read from, then strip them, returning the externally-visible object.
///
/// This is the sole defense against an attacker with filesystem read/write
/// access moving a ciphertext from one object's directory to another's: the
/// payload still decrypts and authenticates fine (the key doesn't depend on
/// location), but the context it was encrypted with will no longer match.
pub(crate) fn verify_and_strip_context(
    mut obj: Map<String, Value>,
    path: &PathBuf,
    expected_id: &str,
    collection_name: &str,
    context_collection_names: &[String],
    context_ids: &[String],
) -> Result<Map<String, Value>> {
    let fail = |message: String| Error::Integrity {
        path: path.clone(),
        message,
    };

    let actual_id = obj
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| fail("payload is missing its id field".to_string()))?;
    if actual_id != expected_id {
        return Err(fail(format!(
            "payload id {actual_id} does not match directory id {expected_id}"
        )));
    }

    let actual_collection = obj
        .get(CONTEXT_COLLECTION_NAME)
        .and_then(Value::as_str)
        .ok_or_else(|| fail("payload is missing _collectionName".to_string()))?;
    if actual_collection != collection_name {
        return Err(fail(format!(
            "payload _collectionName {actual_collection} does not match physical collection {collection_name}"
        )));
    }

    let actual_names: Vec<&str> = obj
        .get(CONTEXT_COLLECTION_NAMES)
        .and_then(Value::as_array)
        .ok_or_else(|| fail("payload is missing _contextCollectionNames".to_string()))?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    if actual_names != context_collection_names {
        return Err(fail(
            "payload _contextCollectionNames does not match physical path".to_string(),
        ));
    }

    let actual_ids: Vec<&str> = obj
        .get(CONTEXT_IDS)
        .and_then(Value::as_array)
        .ok_or_else(|| fail("payload is missing _contextIds".to_string()))?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    if actual_ids != context_ids {
        return Err(fail(
            "payload _contextIds does not match physical path".to_string(),
        ));
    }

    obj.remove(CONTEXT_COLLECTION_NAMES);
    obj.remove(CONTEXT_IDS);
    obj.remove(CONTEXT_COLLECTION_NAME);

    Ok(obj)
}
