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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::{LockMetadata, DEFAULT_LEASE_TIME, DEFAULT_RENEWAL_INTERVAL};
use crate::error::{Error, Result};
use crate::events::{EventBus, StoreEvent};
use crate::fs;
use crate::time::{format_timestamp, now, parse_timestamp};

const LOCKS_DIR: &str = "_locks";
const TMP_DIR: &str = "_tmp";
const METADATA_FILE: &str = "metadata";
const EXPIRE_PREFIX: &str = "expire-";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Whether [`LockManager::acquire`] should poll until the lock frees, or
/// fail immediately on contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    pub acquire_when_free: bool,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        AcquireOptions {
            acquire_when_free: true,
        }
    }
}

/// Issues and coordinates leased, directory-backed locks under a single
/// data directory.
#[derive(Clone)]
pub struct LockManager {
    data_dir: PathBuf,
    lease_time: Duration,
    renewal_interval: Duration,
    events: EventBus,
}

impl LockManager {
    pub fn new(data_dir: PathBuf, events: EventBus) -> Self {
        LockManager {
            data_dir,
            lease_time: DEFAULT_LEASE_TIME,
            renewal_interval: DEFAULT_RENEWAL_INTERVAL,
            events,
        }
    }

    pub fn with_lease(mut self, lease_time: Duration, renewal_interval: Duration) -> Self {
        self.lease_time = lease_time;
        self.renewal_interval = renewal_interval;
        self
    }

    fn lock_dir(&self, lock_id: &str) -> PathBuf {
        self.data_dir.join(LOCKS_DIR).join(lock_id)
    }

    fn tmp_root(&self) -> PathBuf {
        self.data_dir.join(TMP_DIR)
    }

    /// Acquire `lock_id` for `user_name`, polling roughly once a second
    /// while it is held by someone else.
    pub async fn acquire(&self, lock_id: &str, user_name: &str) -> Result<Lock> {
        self.acquire_with(lock_id, user_name, AcquireOptions::default())
            .await
    }

    /// Attempt to acquire `lock_id`, failing immediately with
    /// [`Error::LockInUse`] if it is already held by a non-stale holder.
    pub async fn try_acquire(&self, lock_id: &str, user_name: &str) -> Result<Lock> {
        self.acquire_with(
            lock_id,
            user_name,
            AcquireOptions {
                acquire_when_free: false,
            },
        )
        .await
    }

    pub async fn acquire_with(
        &self,
        lock_id: &str,
        user_name: &str,
        options: AcquireOptions,
    ) -> Result<Lock> {
        let lock_dir = self.lock_dir(lock_id);
        let tmp_root = self.tmp_root();
        let mut polled = false;

        loop {
            let expiry = now() + chrono::Duration::from_std(self.lease_time).unwrap();
            match self.try_commit_lock(&lock_dir, &tmp_root, user_name, expiry).await {
                Ok(()) => {
                    tracing::debug!(lock_id, user_name, "lock acquired");
                    if polled {
                        self.events.emit(StoreEvent::LockAcquired {
                            lock_id: lock_id.to_string(),
                        });
                    }
                    let next_expiry = Arc::new(StdMutex::new(expiry));
                    let released = Arc::new(AtomicBool::new(false));
                    let renewal_task = spawn_renewal_task(
                        lock_dir.clone(),
                        tmp_root.clone(),
                        self.lease_time,
                        self.renewal_interval,
                        next_expiry.clone(),
                        released.clone(),
                    );
                    return Ok(Lock {
                        lock_id: lock_id.to_string(),
                        lock_dir,
                        tmp_root,
                        lease_time: self.lease_time,
                        renewal_task: Some(renewal_task),
                        next_expiry,
                        released,
                    });
                }
                Err(e) if is_collision(&e) => {
                    if is_stale(&lock_dir).await? {
                        tracing::warn!(lock_id, "reclaiming stale lock");
                        self.try_reclaim(lock_id, &lock_dir, &tmp_root).await?;
                        // Whether we won the race to reclaim it or another
                        // caller did, retry from the top.
                        continue;
                    }

                    let metadata = read_metadata(&lock_dir).await.unwrap_or(LockMetadata {
                        user_name: "<unknown>".to_string(),
                    });

                    if !options.acquire_when_free {
                        return Err(Error::LockInUse {
                            lock_id: lock_id.to_string(),
                            metadata,
                        });
                    }

                    polled = true;
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stage a lock directory containing `metadata` and the first
    /// `expire-*` marker, then attempt to commit it into place.
    async fn try_commit_lock(
        &self,
        lock_dir: &Path,
        tmp_root: &Path,
        user_name: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        let (staged, commit) = fs::write_directory(lock_dir, tmp_root).await?;

        let metadata = LockMetadata {
            user_name: user_name.to_string(),
        };
        let metadata_json =
            serde_json::to_vec(&metadata).expect("LockMetadata always serializes");
        tokio::fs::write(staged.join(METADATA_FILE), metadata_json)
            .await
            .map_err(|e| Error::io(staged.join(METADATA_FILE), e))?;

        let expire_name = format!("{EXPIRE_PREFIX}{}", format_timestamp(expiry));
        tokio::fs::write(staged.join(&expire_name), b"")
            .await
            .map_err(|e| Error::io(staged.join(&expire_name), e))?;

        commit.commit().await
    }

    /// Acquire `<lock_id>.expiry`, re-verify the primary lock is still
    /// stale, delete it if so, then release the secondary lock. Returns
    /// without error whether or not this caller won the reclamation race;
    /// the outer `acquire` loop simply retries either way.
    async fn try_reclaim(&self, lock_id: &str, lock_dir: &Path, tmp_root: &Path) -> Result<()> {
        let secondary_id = format!("{lock_id}.expiry");
        let secondary_dir = self.lock_dir(&secondary_id);

        let short_expiry = now() + chrono::Duration::seconds(30);
        match self
            .try_commit_lock(&secondary_dir, tmp_root, "<reclaim>", short_expiry)
            .await
        {
            Ok(()) => {}
            Err(e) if is_collision(&e) => {
                // Another caller is already reclaiming this lock.
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if is_stale(lock_dir).await? {
            fs::delete_directory(lock_dir, tmp_root).await?;
        }

        fs::delete_directory(&secondary_dir, tmp_root).await
    }
}

/// A lock directory is stale iff its maximum `expire-*` timestamp is in the
/// past — or if it has no `expire-*` file at all. The latter case is a
/// deliberate choice, not an oversight: a lock directory with no expiry
/// marker yet looks identical on disk to one abandoned mid-creation, so it
/// is always treated as stale and reclaimable, even though that risks
/// evicting a lock whose first expire marker hasn't been written yet by a
/// holder that is still mid `try_commit_lock`.
async fn is_stale(lock_dir: &Path) -> Result<bool> {
    let max_expiry = max_expiry(lock_dir).await?;
    match max_expiry {
        Some(expiry) => Ok(expiry < now()),
        None => {
            tracing::warn!(path = %lock_dir.display(), "lock directory has no expire marker; treating as stale");
            Ok(true)
        }
    }
}

async fn max_expiry(lock_dir: &Path) -> Result<Option<DateTime<Utc>>> {
    let entries = fs::read_dir_filtered(lock_dir).await?;
    let mut max: Option<DateTime<Utc>> = None;
    for entry in entries {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(suffix) = name.strip_prefix(EXPIRE_PREFIX) else {
            continue;
        };
        if let Ok(ts) = parse_timestamp(suffix) {
            max = Some(max.map_or(ts, |m| m.max(ts)));
        }
    }
    Ok(max)
}

async fn read_metadata(lock_dir: &Path) -> Result<LockMetadata> {
    let path = lock_dir.join(METADATA_FILE);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| Error::io(&path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Codec(format!("bad lock metadata: {e}")))
}

/// True if `err` represents "the final path already exists" — a commit
/// collision, meaning some other caller holds the lock.
fn is_collision(err: &Error) -> bool {
    let Error::Io { source, .. } = err else {
        return false;
    };
    if source.kind() == std::io::ErrorKind::AlreadyExists {
        return true;
    }
    match source.raw_os_error() {
        // EPERM, EEXIST, ENOTEMPTY on Linux/macOS. Some filesystems (e.g.
        // certain NFS mounts) surface a rename-onto-existing-directory
        // collision as EPERM rather than EEXIST/ENOTEMPTY.
        Some(1) | Some(17) | Some(39) => true,
        // ERROR_ACCESS_DENIED, ERROR_ALREADY_EXISTS, ERROR_DIR_NOT_EMPTY on
        // Windows.
        Some(5) | Some(183) | Some(145) => true,
        _ => false,
    }
}

fn spawn_renewal_task(
    lock_dir: PathBuf,
    tmp_root: PathBuf,
    lease_time: Duration,
    renewal_interval: Duration,
    next_expiry: Arc<StdMutex<DateTime<Utc>>>,
    released: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(renewal_interval).await;
            if released.load(Ordering::SeqCst) {
                return;
            }

            let cached_next_expiry = *next_expiry.lock().unwrap();
            if cached_next_expiry < now() {
                tracing::warn!(path = %lock_dir.display(), "lease expired before renewal; self-releasing");
                let _ = fs::delete_directory(&lock_dir, &tmp_root).await;
                released.store(true, Ordering::SeqCst);
                return;
            }

            let new_expiry = now() + chrono::Duration::from_std(lease_time).unwrap();
            let expire_name = format!("{EXPIRE_PREFIX}{}", format_timestamp(new_expiry));
            if fs::write_buffer_to_file(&lock_dir.join(&expire_name), &tmp_root, b"")
                .await
                .is_ok()
            {
                *next_expiry.lock().unwrap() = new_expiry;
                let old_expire_name = format!("{EXPIRE_PREFIX}{}", format_timestamp(cached_next_expiry));
                if old_expire_name != expire_name {
                    let _ = tokio::fs::remove_file(lock_dir.join(&old_expire_name)).await;
                }
            }
        }
    })
}

/// A held lock. Dropping it without calling [`release`](Lock::release) stops
/// the renewal timer but leaves the lock directory on disk — it will be
/// reclaimed by the next caller once its lease expires, the same as a
/// process that crashes outright.
pub struct Lock {
    lock_id: String,
    lock_dir: PathBuf,
    tmp_root: PathBuf,
    lease_time: Duration,
    renewal_task: Option<JoinHandle<()>>,
    next_expiry: Arc<StdMutex<DateTime<Utc>>>,
    released: Arc<AtomicBool>,
}

impl Lock {
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Manually push the lease forward by one lease duration. The automatic
    /// renewal task already does this on its own schedule; this is for
    /// callers that want to extend the lease ahead of a known-long
    /// operation.
    pub async fn renew(&self) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            return Ok(());
        }
        let previous_expiry = *self.next_expiry.lock().unwrap();
        let new_expiry = now() + chrono::Duration::from_std(self.lease_time).unwrap();
        let expire_name = format!("{EXPIRE_PREFIX}{}", format_timestamp(new_expiry));
        fs::write_buffer_to_file(&self.lock_dir.join(&expire_name), &self.tmp_root, b"").await?;
        *self.next_expiry.lock().unwrap() = new_expiry;
        let old_expire_name = format!("{EXPIRE_PREFIX}{}", format_timestamp(previous_expiry));
        if old_expire_name != expire_name {
            let _ = tokio::fs::remove_file(self.lock_dir.join(&old_expire_name)).await;
        }
        Ok(())
    }

    /// Stop the renewal timer and delete the lock directory. Idempotent:
    /// releasing an already-expired (self-released) lock succeeds silently.
    pub async fn release(mut self) -> Result<()> {
        if let Some(task) = self.renewal_task.take() {
            task.abort();
        }
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        fs::delete_directory(&self.lock_dir, &self.tmp_root).await
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Some(task) = self.renewal_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(data_dir: PathBuf) -> LockManager {
        LockManager::new(data_dir, EventBus::new())
    }

    #[tokio::test]
    async fn second_acquire_fails_with_holder_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path().to_path_buf());

        let _lock = mgr.try_acquire("clientFile-1", "admin").await.unwrap();
        let err = mgr.try_acquire("clientFile-1", "other").await.unwrap_err();
        match err {
            Error::LockInUse { metadata, .. } => assert_eq!(metadata.user_name, "admin"),
            other => panic!("expected LockInUse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn release_then_reacquire_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path().to_path_buf());

        let lock = mgr.try_acquire("clientFile-1", "admin").await.unwrap();
        lock.release().await.unwrap();

        mgr.try_acquire("clientFile-1", "other").await.unwrap();
    }

    #[tokio::test]
    async fn stale_lock_with_no_expire_marker_is_reclaimable() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path().to_path_buf());
        let lock_dir = mgr.lock_dir("clientFile-1");
        tokio::fs::create_dir_all(&lock_dir).await.unwrap();
        tokio::fs::write(
            lock_dir.join(METADATA_FILE),
            serde_json::to_vec(&LockMetadata {
                user_name: "ghost".into(),
            })
            .unwrap(),
        )
        .await
        .unwrap();

        let lock = mgr.try_acquire("clientFile-1", "new-holder").await.unwrap();
        assert_eq!(lock.lock_id(), "clientFile-1");
    }

    #[tokio::test]
    async fn expired_lease_allows_reclaim_without_waiting_out_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path().to_path_buf())
            .with_lease(Duration::from_millis(50), Duration::from_secs(3600));

        let lock = mgr.try_acquire("clientFile-1", "admin").await.unwrap();
        // Simulate the holder's process vanishing without releasing.
        std::mem::forget(lock);

        tokio::time::sleep(Duration::from_millis(100)).await;
        mgr.try_acquire("clientFile-1", "other").await.unwrap();
    }

    #[tokio::test]
    async fn renew_extends_the_lease_by_a_full_lease_time() {
        let dir = tempfile::tempdir().unwrap();
        // Renewal interval longer than the test so only the manual renew()
        // call below can be responsible for any lease extension observed.
        let mgr = manager(dir.path().to_path_buf())
            .with_lease(Duration::from_millis(100), Duration::from_secs(3600));

        let lock = mgr.try_acquire("clientFile-1", "admin").await.unwrap();

        // Renew partway through the original 100ms lease.
        tokio::time::sleep(Duration::from_millis(60)).await;
        lock.renew().await.unwrap();

        // Past the original lease's expiry, but well within the renewed one
        // (renew() was called at ~60ms and should push expiry to ~160ms).
        // A buggy renew() that fails to extend by a full lease_time would
        // already have let this lock expire by now.
        tokio::time::sleep(Duration::from_millis(70)).await;
        let err = mgr.try_acquire("clientFile-1", "other").await.unwrap_err();
        assert!(matches!(err, Error::LockInUse { .. }));

        // Past the renewed expiry: now reclaimable.
        tokio::time::sleep(Duration::from_millis(60)).await;
        mgr.try_acquire("clientFile-1", "other").await.unwrap();
    }

    #[tokio::test]
    async fn renew_does_not_accumulate_expire_markers() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path().to_path_buf())
            .with_lease(Duration::from_secs(3600), Duration::from_secs(3600));

        let lock = mgr.try_acquire("clientFile-1", "admin").await.unwrap();
        for _ in 0..5 {
            lock.renew().await.unwrap();
        }

        let lock_dir = mgr.lock_dir("clientFile-1");
        let mut entries = tokio::fs::read_dir(&lock_dir).await.unwrap();
        let mut expire_marker_count = 0;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().starts_with(EXPIRE_PREFIX) {
                expire_marker_count += 1;
            }
        }
        assert_eq!(expire_marker_count, 1);
    }
}
