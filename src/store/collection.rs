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

//! The collection engine: `create`, `list`, `read`, `create_revision`,
//! `list_revisions`, `read_revisions`, `read_latest_revisions`, and nested
//! child collections.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::context::{lookup_obj_dir_by_id, CollectionContext};
use super::ids;
use super::object::{self, ObjectRecord, RevisionSummary};
use crate::crypto::{strong_decrypt, strong_encrypt, StrongKey, WeakKey};
use crate::error::{Error, Result};
use crate::events::{EventBus, StoreEvent};
use crate::fs::{self, read_dir_filtered};
use crate::schema::{ModelDefinition, Schema};
use crate::time::{self, format_timestamp};

const TMP_DIR: &str = "_tmp";

/// One entry produced by [`Collection::list`]: the indexed field values and
/// id of an object, without decrypting its payload.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub id: String,
    /// Indexed field values, keyed by their dotted field path (e.g.
    /// `clientName.last`).
    pub indexed_fields: HashMap<String, String>,
    /// Internal: the object's physical directory. Exposed so `read` and
    /// `create_revision` callers working from a `list` result can skip a
    /// second lookup.
    pub dir_path: PathBuf,
}

#[derive(Debug, Clone)]
struct RevisionFileEntry {
    timestamp: DateTime<Utc>,
    revision_id: String,
    path: PathBuf,
}

/// The runtime API for one model at one position in the collection tree.
pub struct Collection {
    model: Arc<ModelDefinition>,
    context: CollectionContext,
    data_dir: PathBuf,
    strong_key: StrongKey,
    weak_key: WeakKey,
    author: String,
    events: EventBus,
    full_schema: Schema,
}

impl Collection {
    pub fn new(
        model: Arc<ModelDefinition>,
        context: CollectionContext,
        data_dir: PathBuf,
        strong_key: StrongKey,
        weak_key: WeakKey,
        author: String,
        events: EventBus,
    ) -> Self {
        let full_schema = model.schema.augmented(&context.ancestor_names());
        Collection {
            model,
            context,
            data_dir,
            strong_key,
            weak_key,
            author,
            events,
            full_schema,
        }
    }

    pub fn model(&self) -> &ModelDefinition {
        &self.model
    }

    /// Get the collection API for a child model, scoped to a specific
    /// parent object id.
    pub fn child_collection(&self, collection_name: &str, parent_id: &str) -> Result<Collection> {
        let child_model = self.model.child(collection_name).ok_or_else(|| Error::Validation {
            collection: self.model.collection_name.clone(),
            message: format!("{collection_name} is not a child collection of {}", self.model.name),
        })?;
        let context = self.context.push(self.model.clone(), parent_id.to_string());
        Ok(Collection::new(
            child_model.clone(),
            context,
            self.data_dir.clone(),
            self.strong_key.clone(),
            self.weak_key.clone(),
            self.author.clone(),
            self.events.clone(),
        ))
    }

    fn tmp_root(&self) -> PathBuf {
        self.data_dir.join(TMP_DIR)
    }

    async fn resolve_base_dir(&self) -> Result<PathBuf> {
        let parent_dir = self
            .context
            .resolve_parent_dir(&self.data_dir, &self.weak_key)
            .await?;
        Ok(parent_dir.join(&self.model.collection_name))
    }

    fn extract_index_values(&self, obj: &Map<String, Value>) -> Result<Vec<String>> {
        self.model
            .indexes
            .iter()
            .map(|path| {
                let value = navigate(obj, path).ok_or_else(|| Error::Validation {
                    collection: self.model.collection_name.clone(),
                    message: format!("missing indexed field {}", path.join(".")),
                })?;
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::Validation {
                        collection: self.model.collection_name.clone(),
                        message: format!("indexed field {} is not a string", path.join(".")),
                    })
            })
            .collect()
    }

    fn object_dir_components(&self, obj: &Map<String, Value>, id: &str) -> Result<Vec<Vec<u8>>> {
        let mut components: Vec<Vec<u8>> = self
            .extract_index_values(obj)?
            .into_iter()
            .map(String::into_bytes)
            .collect();
        components.push(ids::id_to_bytes(id)?);
        Ok(components)
    }

    /// Create a new object. Rejects input that already carries any metadata
    /// field (`id`, `revisionId`, `timestamp`, `author`).
    pub async fn create(&self, mut input: Map<String, Value>) -> Result<ObjectRecord> {
        if object::contains_any_metadata_field(&input) {
            return Err(Error::Validation {
                collection: self.model.collection_name.clone(),
                message: "object must not already carry a metadata field".to_string(),
            });
        }

        self.check_ancestor_id_fields(&input)?;

        let id = ids::generate_id();
        let revision_id = ids::generate_id();
        let now = time::now();
        object::stamp_create_metadata(&mut input, &id, &revision_id, &self.author, now);
        self.full_schema.validate(&Value::Object(input.clone()))?;

        let dirname_components = self.object_dir_components(&input, &id)?;
        let dirname = crate::codec::to_filename(&dirname_components, &self.weak_key);

        let base_dir = self.resolve_base_dir().await?;
        let final_dir = base_dir.join(&dirname);
        let tmp_root = self.tmp_root();
        let (staged, commit) = fs::write_directory(&final_dir, &tmp_root).await?;

        for child in &self.model.children {
            let child_dir = staged.join(&child.collection_name);
            tokio::fs::create_dir(&child_dir)
                .await
                .map_err(|e| Error::io(&child_dir, e))?;
        }

        let mut payload = input.clone();
        object::embed_context(
            &mut payload,
            &self.model.collection_name,
            &self.context.collection_names(),
            &self.context.ancestor_ids,
        );
        let plaintext =
            serde_json::to_vec(&Value::Object(payload)).expect("payload always serializes");
        let ciphertext = strong_encrypt(&self.strong_key, &plaintext);

        let rev_components = vec![format_timestamp(now).into_bytes(), ids::id_to_bytes(&revision_id)?];
        let rev_filename = crate::codec::to_filename(&rev_components, &self.weak_key);
        let rev_path = staged.join(&rev_filename);
        tokio::fs::write(&rev_path, &ciphertext)
            .await
            .map_err(|e| Error::io(&rev_path, e))?;

        commit.commit().await?;

        tracing::debug!(model = %self.model.name, id = %id, "object created");
        self.events.emit(StoreEvent::Create {
            model: self.model.name.clone(),
            id: id.clone(),
        });

        Ok(input)
    }

    fn check_ancestor_id_fields(&self, input: &Map<String, Value>) -> Result<()> {
        for (ancestor, expected_id) in self.context.ancestors.iter().zip(&self.context.ancestor_ids) {
            let field_name = format!("{}Id", ancestor.name);
            match input.get(&field_name).and_then(Value::as_str) {
                Some(actual) if actual == expected_id => {}
                Some(actual) => {
                    return Err(Error::Validation {
                        collection: self.model.collection_name.clone(),
                        message: format!(
                            "{field_name} is {actual} but this collection is scoped to {expected_id}"
                        ),
                    })
                }
                None => {
                    return Err(Error::Validation {
                        collection: self.model.collection_name.clone(),
                        message: format!("missing required field {field_name}"),
                    })
                }
            }
        }
        Ok(())
    }

    /// List the objects in this collection without decrypting any payload.
    pub async fn list(&self) -> Result<Vec<ListEntry>> {
        let base_dir = self.resolve_base_dir().await?;
        let component_count = self.model.indexes.len() + 1;
        let entries = read_dir_filtered(&base_dir).await?;

        let mut out = Vec::new();
        for path in entries {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => continue,
                Err(_) => continue,
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let components = match crate::codec::from_filename(name, component_count, &self.weak_key) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable object directory name");
                    continue;
                }
            };

            let id_bytes = components.last().expect("component_count >= 1");
            let id = URL_SAFE_NO_PAD.encode(id_bytes);

            let mut indexed_fields = HashMap::new();
            for (i, field_path) in self.model.indexes.iter().enumerate() {
                let value = String::from_utf8(components[i].clone()).map_err(|e| {
                    Error::Codec(format!("indexed field is not valid UTF-8: {e}"))
                })?;
                indexed_fields.insert(field_path.join("."), value);
            }

            out.push(ListEntry {
                id,
                indexed_fields,
                dir_path: path,
            });
        }

        Ok(out)
    }

    /// Read the single revision of an immutable object.
    pub async fn read(&self, id: &str) -> Result<ObjectRecord> {
        if self.model.is_mutable {
            return Err(Error::Validation {
                collection: self.model.collection_name.clone(),
                message: "read is only valid for immutable collections; use read_latest_revisions".to_string(),
            });
        }

        let base_dir = self.resolve_base_dir().await?;
        let obj_dir = lookup_obj_dir_by_id(&base_dir, &self.model, id, &self.weak_key).await?;
        let entries = self.list_revision_entries(&obj_dir).await?;

        if entries.len() != 1 {
            return Err(Error::Integrity {
                path: obj_dir,
                message: format!(
                    "immutable object has {} revision files, expected exactly 1",
                    entries.len()
                ),
            });
        }

        self.read_revision_file(&entries[0], id).await
    }

    /// Append a new revision to a mutable object, renaming its directory if
    /// the new indexed field values differ from the current ones.
    pub async fn create_revision(&self, mut input: Map<String, Value>) -> Result<ObjectRecord> {
        if !self.model.is_mutable {
            return Err(Error::Validation {
                collection: self.model.collection_name.clone(),
                message: "create_revision is only valid for mutable collections".to_string(),
            });
        }

        let id = object::extract_id(&input)?;
        let base_dir = self.resolve_base_dir().await?;
        let obj_dir = lookup_obj_dir_by_id(&base_dir, &self.model, &id, &self.weak_key).await?;

        let revision_id = ids::generate_id();
        let now = time::now();
        input.remove("revisionId");
        input.remove("timestamp");
        input.remove("author");
        object::stamp_revision_metadata(&mut input, &revision_id, &self.author, now);
        self.full_schema.validate(&Value::Object(input.clone()))?;

        let rev_components = vec![format_timestamp(now).into_bytes(), ids::id_to_bytes(&revision_id)?];
        let rev_filename = crate::codec::to_filename(&rev_components, &self.weak_key);

        let mut payload = input.clone();
        object::embed_context(
            &mut payload,
            &self.model.collection_name,
            &self.context.collection_names(),
            &self.context.ancestor_ids,
        );
        let plaintext =
            serde_json::to_vec(&Value::Object(payload)).expect("payload always serializes");
        let ciphertext = strong_encrypt(&self.strong_key, &plaintext);

        fs::write_buffer_to_file(&obj_dir.join(&rev_filename), &self.tmp_root(), &ciphertext).await?;

        let new_dirname_components = self.object_dir_components(&input, &id)?;
        let new_dirname = crate::codec::to_filename(&new_dirname_components, &self.weak_key);
        let current_name = obj_dir.file_name().and_then(|n| n.to_str());
        if current_name != Some(new_dirname.as_str()) {
            let new_dir = obj_dir
                .parent()
                .expect("object directory always has a parent")
                .join(&new_dirname);
            tokio::fs::rename(&obj_dir, &new_dir)
                .await
                .map_err(|e| Error::io(&new_dir, e))?;
        }

        tracing::debug!(model = %self.model.name, id = %id, revision_id = %revision_id, "revision created");
        self.events.emit(StoreEvent::CreateRevision {
            model: self.model.name.clone(),
            id: id.clone(),
            revision_id: revision_id.clone(),
        });

        Ok(input)
    }

    /// List revision summaries (timestamp + revision id) without decrypting
    /// any payload, sorted ascending by timestamp.
    pub async fn list_revisions(&self, id: &str) -> Result<Vec<RevisionSummary>> {
        let base_dir = self.resolve_base_dir().await?;
        let obj_dir = lookup_obj_dir_by_id(&base_dir, &self.model, id, &self.weak_key).await?;
        let entries = self.list_revision_entries(&obj_dir).await?;
        Ok(entries
            .into_iter()
            .map(|e| RevisionSummary {
                revision_id: e.revision_id,
                timestamp: format_timestamp(e.timestamp),
            })
            .collect())
    }

    /// Read every revision of a mutable object, oldest first.
    pub async fn read_revisions(&self, id: &str) -> Result<Vec<ObjectRecord>> {
        self.read_latest_revisions(id, usize::MAX).await
    }

    /// Read the last `k` revisions of a mutable object, oldest first. The
    /// object directory is always resolved, even for `k == 0`, but no
    /// payload is ever decrypted in that case.
    pub async fn read_latest_revisions(&self, id: &str, k: usize) -> Result<Vec<ObjectRecord>> {
        let base_dir = self.resolve_base_dir().await?;
        let obj_dir = lookup_obj_dir_by_id(&base_dir, &self.model, id, &self.weak_key).await?;
        let entries = self.list_revision_entries(&obj_dir).await?;

        let start = entries.len().saturating_sub(k);
        let mut out = Vec::with_capacity(entries.len() - start);
        for entry in &entries[start..] {
            out.push(self.read_revision_file(entry, id).await?);
        }
        Ok(out)
    }

    async fn list_revision_entries(&self, obj_dir: &Path) -> Result<Vec<RevisionFileEntry>> {
        let entries = read_dir_filtered(obj_dir).await?;
        let mut out = Vec::new();

        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if self.model.children.iter().any(|c| c.collection_name == name) {
                continue;
            }

            let components = match crate::codec::from_filename(name, 2, &self.weak_key) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable revision filename");
                    continue;
                }
            };

            let timestamp_str = String::from_utf8(components[0].clone())
                .map_err(|e| Error::Codec(format!("revision timestamp is not valid UTF-8: {e}")))?;
            let timestamp = time::parse_timestamp(&timestamp_str)?;
            let revision_id = URL_SAFE_NO_PAD.encode(&components[1]);

            out.push(RevisionFileEntry {
                timestamp,
                revision_id,
                path,
            });
        }

        out.sort_by_key(|e| e.timestamp);
        Ok(out)
    }

    async fn read_revision_file(&self, entry: &RevisionFileEntry, expected_id: &str) -> Result<ObjectRecord> {
        let bytes = tokio::fs::read(&entry.path)
            .await
            .map_err(|e| Error::io(&entry.path, e))?;
        let plaintext = strong_decrypt(&self.strong_key, &bytes)?;

        let value: Value = serde_json::from_slice(&plaintext).map_err(|e| Error::Integrity {
            path: entry.path.clone(),
            message: format!("corrupt JSON payload: {e}"),
        })?;
        let obj = value.as_object().cloned().ok_or_else(|| Error::Integrity {
            path: entry.path.clone(),
            message: "payload is not a JSON object".to_string(),
        })?;

        let cleaned = object::verify_and_strip_context(
            obj,
            &entry.path,
            expected_id,
            &self.model.collection_name,
            &self.context.collection_names(),
            &self.context.ancestor_ids,
        )?;
        self.full_schema.validate(&Value::Object(cleaned.clone()))?;

        Ok(cleaned)
    }
}

fn navigate<'a>(obj: &'a Map<String, Value>, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = obj.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
