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

use tokio::fs;

use crate::error::{Error, Result};

/// Filesystem noise that every directory scan in this crate filters out.
pub const IGNORED_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// List the immediate entries of `dir`, skipping [`IGNORED_FILE_NAMES`].
///
/// Returns an empty list (not an error) if `dir` does not exist, since a
/// collection directory that hasn't been written to yet is equivalent to an
/// empty collection.
pub async fn read_dir_filtered(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(dir, e))? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if IGNORED_FILE_NAMES.contains(&name.as_ref()) {
            continue;
        }
        paths.push(entry.path());
    }
    Ok(paths)
}
