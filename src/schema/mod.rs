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

//! Model definitions and the structural schema each one declares.
//!
//! A [`ModelDefinition`] is compile-time/config-time input: a name, a
//! collection name, whether objects of the model are mutable, the declared
//! indexed field paths, a structural [`Schema`], and a tree of child model
//! definitions whose collections live physically inside each parent
//! object's directory.

mod validate;

pub use validate::{FieldSpec, FieldType, Schema};

use std::sync::Arc;

/// A dotted path to a field, e.g. `clientName.first`.
pub type FieldPath = Vec<String>;

pub fn field_path(dotted: &str) -> FieldPath {
    dotted.split('.').map(str::to_string).collect()
}

/// The metadata fields every stored object carries, beyond whatever the
/// model declares. Ancestor-id fields are appended separately once a
/// model's position in the tree is known (see
/// [`crate::store::CollectionContext`]).
pub fn base_metadata_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::required("id", FieldType::String),
        FieldSpec::required("revisionId", FieldType::String),
        FieldSpec::required("timestamp", FieldType::Timestamp),
        FieldSpec::required("author", FieldType::String),
    ]
}

/// A compile-time/config-time model definition.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    pub name: String,
    pub collection_name: String,
    pub is_mutable: bool,
    pub indexes: Vec<FieldPath>,
    pub schema: Schema,
    pub children: Vec<Arc<ModelDefinition>>,
}

impl ModelDefinition {
    pub fn new(
        name: impl Into<String>,
        collection_name: impl Into<String>,
        is_mutable: bool,
        indexes: Vec<FieldPath>,
        schema: Schema,
    ) -> Self {
        ModelDefinition {
            name: name.into(),
            collection_name: collection_name.into(),
            is_mutable,
            indexes,
            schema,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Arc<ModelDefinition>>) -> Self {
        self.children = children;
        self
    }

    /// Find a direct child model definition by its collection name.
    pub fn child(&self, collection_name: &str) -> Option<&Arc<ModelDefinition>> {
        self.children
            .iter()
            .find(|c| c.collection_name == collection_name)
    }
}
