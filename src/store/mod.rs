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

//! The collection engine: model-driven, schema-validated, revision-tracked
//! object storage on top of the atomic filesystem primitives in
//! [`crate::fs`] and the two-tier crypto in [`crate::crypto`].

pub(crate) mod context;
mod ids;
pub(crate) mod object;

mod collection;

pub use collection::{Collection, ListEntry};
pub use context::CollectionContext;
pub use object::{ObjectRecord, RevisionSummary};
