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

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::codec;
use crate::crypto::WeakKey;
use crate::error::{Error, Result};
use crate::fs::read_dir_filtered;
use crate::schema::ModelDefinition;

/// The immutable chain of ancestor models and ids that fixes where a
/// collection physically lives in the tree. Ownership is one-way: a
/// `CollectionContext` is a pure lookup path, never an owning reference to
/// the parent collection itself.
#[derive(Debug, Clone, Default)]
pub struct CollectionContext {
    pub ancestors: Vec<Arc<ModelDefinition>>,
    pub ancestor_ids: Vec<String>,
}

impl CollectionContext {
    pub fn root() -> Self {
        CollectionContext::default()
    }

    pub fn push(&self, ancestor: Arc<ModelDefinition>, id: String) -> Self {
        let mut ancestors = self.ancestors.clone();
        let mut ancestor_ids = self.ancestor_ids.clone();
        ancestors.push(ancestor);
        ancestor_ids.push(id);
        CollectionContext {
            ancestors,
            ancestor_ids,
        }
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.ancestors
            .iter()
            .map(|a| a.collection_name.clone())
            .collect()
    }

    /// The ancestor models' own names, used to build `<ancestorName>Id`
    /// schema fields. Distinct from [`collection_names`](Self::collection_names):
    /// a model's name and its physical collection directory name need not
    /// coincide.
    pub fn ancestor_names(&self) -> Vec<String> {
        self.ancestors.iter().map(|a| a.name.clone()).collect()
    }

    /// Walk the ancestor chain from `data_dir`, resolving each ancestor's
    /// object directory in turn, to find the directory that a model at this
    /// context physically lives inside.
    pub async fn resolve_parent_dir(&self, data_dir: &Path, weak_key: &WeakKey) -> Result<PathBuf> {
        let mut path = data_dir.to_path_buf();
        for (ancestor, id) in self.ancestors.iter().zip(self.ancestor_ids.iter()) {
            path = path.join(&ancestor.collection_name);
            path = lookup_obj_dir_by_id(&path, ancestor, id, weak_key).await?;
        }
        Ok(path)
    }
}

/// Scan `collection_dir` for the one object directory whose decoded id
/// matches `id`. Returns [`Error::ObjectNotFound`] on zero matches.
pub async fn lookup_obj_dir_by_id(
    collection_dir: &Path,
    model: &ModelDefinition,
    id: &str,
    weak_key: &WeakKey,
) -> Result<PathBuf> {
    let component_count = model.indexes.len() + 1;
    let entries = read_dir_filtered(collection_dir).await?;

    for entry in entries {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(components) = codec::from_filename(name, component_count, weak_key) else {
            continue;
        };
        let Some(id_bytes) = components.last() else {
            continue;
        };
        if URL_SAFE_NO_PAD.encode(id_bytes) == id {
            return Ok(entry);
        }
    }

    Err(Error::ObjectNotFound {
        collection: model.collection_name.clone(),
        id: id.to_string(),
    })
}
