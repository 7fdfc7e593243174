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

use rand::Rng;
use tokio::fs;

use crate::error::{Error, Result};

/// A handle to a temp directory staged under a `tmp_root`, waiting to be
/// renamed into its final location.
///
/// Dropping the handle without calling [`commit`](CommitHandle::commit)
/// leaves the staged directory behind under `tmp_root`; callers that abandon
/// a staged write are responsible for their own cleanup.
#[derive(Debug)]
pub struct CommitHandle {
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl CommitHandle {
    /// Rename the staged directory into place. This is the linearization
    /// point: before this call returns `Ok`, no observer can see the
    /// directory at `final_path`; after, every observer does.
    ///
    /// If `final_path` already exists, the rename fails and the caller
    /// should interpret that as "something is already there" (for the lock
    /// manager, a lock already held).
    pub async fn commit(self) -> Result<()> {
        fs::rename(&self.tmp_path, &self.final_path)
            .await
            .map_err(|e| Error::io(&self.final_path, e))
    }

    /// The path the caller should populate before calling `commit`.
    pub fn staged_path(&self) -> &Path {
        &self.tmp_path
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Stage a fresh, empty temp directory under `tmp_root` and return its path
/// along with a [`CommitHandle`] that renames it to `final_path` on commit.
///
/// `tmp_root` must live on the same filesystem/device as `final_path`'s
/// parent, since the commit is a plain `rename(2)`.
pub async fn write_directory(final_path: &Path, tmp_root: &Path) -> Result<(PathBuf, CommitHandle)> {
    fs::create_dir_all(tmp_root)
        .await
        .map_err(|e| Error::io(tmp_root, e))?;

    let tmp_path = tmp_root.join(format!("stage-{}", random_suffix()));
    fs::create_dir(&tmp_path)
        .await
        .map_err(|e| Error::io(&tmp_path, e))?;

    Ok((
        tmp_path.clone(),
        CommitHandle {
            tmp_path,
            final_path: final_path.to_path_buf(),
        },
    ))
}

/// Write `bytes` to `final_path` atomically: write to a temp file under
/// `tmp_root`, fsync, then rename into place.
pub async fn write_buffer_to_file(final_path: &Path, tmp_root: &Path, bytes: &[u8]) -> Result<()> {
    fs::create_dir_all(tmp_root)
        .await
        .map_err(|e| Error::io(tmp_root, e))?;

    let tmp_path = tmp_root.join(format!("buf-{}", random_suffix()));

    {
        use tokio::io::AsyncWriteExt;
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| Error::io(&tmp_path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| Error::io(&tmp_path, e))?;
        file.sync_all().await.map_err(|e| Error::io(&tmp_path, e))?;
    }

    match fs::rename(&tmp_path, final_path).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp_path).await;
            Err(Error::io(final_path, e))
        }
    }
}

/// Atomically make `path` disappear, even if it is a populous directory: it
/// is first renamed into `tmp_root` (an atomic operation), then removed.
/// Any observer either sees the directory at `path` or does not; there is no
/// window where it is half-deleted.
pub async fn delete_directory(path: &Path, tmp_root: &Path) -> Result<()> {
    fs::create_dir_all(tmp_root)
        .await
        .map_err(|e| Error::io(tmp_root, e))?;

    let graveyard_path = tmp_root.join(format!("dead-{}", random_suffix()));

    match fs::rename(path, &graveyard_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(path, e)),
    }

    fs::remove_dir_all(&graveyard_path)
        .await
        .map_err(|e| Error::io(&graveyard_path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_directory_is_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_root = dir.path().join("_tmp");
        let final_path = dir.path().join("object");

        let (staged, commit) = write_directory(&final_path, &tmp_root).await.unwrap();
        tokio::fs::write(staged.join("marker"), b"x").await.unwrap();

        assert!(!final_path.exists());
        commit.commit().await.unwrap();
        assert!(final_path.join("marker").exists());
    }

    #[tokio::test]
    async fn write_directory_commit_fails_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_root = dir.path().join("_tmp");
        let final_path = dir.path().join("object");
        tokio::fs::create_dir(&final_path).await.unwrap();
        tokio::fs::write(final_path.join("existing"), b"x")
            .await
            .unwrap();

        let (_staged, commit) = write_directory(&final_path, &tmp_root).await.unwrap();
        assert!(commit.commit().await.is_err());
    }

    #[tokio::test]
    async fn write_buffer_to_file_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_root = dir.path().join("_tmp");
        let final_path = dir.path().join("file.bin");

        write_buffer_to_file(&final_path, &tmp_root, b"first")
            .await
            .unwrap();
        write_buffer_to_file(&final_path, &tmp_root, b"second")
            .await
            .unwrap();

        let contents = tokio::fs::read(&final_path).await.unwrap();
        assert_eq!(contents, b"second");
    }

    #[tokio::test]
    async fn delete_directory_removes_populous_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_root = dir.path().join("_tmp");
        let target = dir.path().join("victim");
        tokio::fs::create_dir_all(target.join("nested")).await.unwrap();
        tokio::fs::write(target.join("nested").join("f"), b"x")
            .await
            .unwrap();

        delete_directory(&target, &tmp_root).await.unwrap();
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn delete_directory_missing_path_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_root = dir.path().join("_tmp");
        let target = dir.path().join("never-existed");

        delete_directory(&target, &tmp_root).await.unwrap();
    }
}
