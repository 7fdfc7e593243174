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

//! Atomic filesystem primitives.
//!
//! Every user-visible mutation the store performs funnels through one of
//! [`write_buffer_to_file`], [`write_directory`], or [`delete_directory`].
//! Directory rename is the only operation that is atomic across every
//! filesystem this crate targets, so all higher layers — locks, object
//! directories, revision files — are built on top of it.

mod atomic;
mod scan;

pub use atomic::{delete_directory, write_buffer_to_file, write_directory, CommitHandle};
pub use scan::{read_dir_filtered, IGNORED_FILE_NAMES};
