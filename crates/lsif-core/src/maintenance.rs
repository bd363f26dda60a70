//! Periodic maintenance tasks and the advisory lock that gates them.
//!
//! Every instance of the service may schedule the same task; the lock makes
//! sure at most one of them runs it at a time. The lock backend itself is
//! supplied by the caller through [`AdvisoryLock`].

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::{LsifError, LsifResult};

/// A fleet-wide exclusive lock keyed by a 64-bit integer.
pub trait AdvisoryLock: Send + Sync {
    /// Try to take `key` without blocking. `Ok(false)` means someone else
    /// holds it.
    fn try_lock(&self, key: i64) -> LsifResult<bool>;

    fn unlock(&self, key: i64) -> LsifResult<()>;
}

/// Lock key for a task name: the first eight bytes of its SHA-256 digest.
pub fn lock_key(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(prefix)
}

struct LockGuard<'a> {
    lock: &'a dyn AdvisoryLock,
    key: i64,
    name: &'a str,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock(self.key) {
            warn!(task = self.name, error = %e, "failed to release advisory lock");
        }
    }
}

/// Run `task` only if the advisory lock for `name` can be taken. Returns
/// `Ok(None)` when another holder has it. The lock is released on every
/// exit path, including a failing or panicking task.
pub fn try_with_lock<T, F>(lock: &dyn AdvisoryLock, name: &str, task: F) -> LsifResult<Option<T>>
where
    F: FnOnce() -> LsifResult<T>,
{
    let key = lock_key(name);
    if !lock.try_lock(key)? {
        debug!(task = name, "advisory lock held elsewhere; skipping");
        return Ok(None);
    }
    let _guard = LockGuard { lock, key, name };
    task().map(Some)
}

/// In-process lock for single-instance deployments.
#[derive(Default)]
pub struct LocalAdvisoryLock {
    held: Mutex<HashSet<i64>>,
}

impl AdvisoryLock for LocalAdvisoryLock {
    fn try_lock(&self, key: i64) -> LsifResult<bool> {
        Ok(self.held.lock().insert(key))
    }

    fn unlock(&self, key: i64) -> LsifResult<()> {
        if self.held.lock().remove(&key) {
            Ok(())
        } else {
            Err(LsifError::Lock(format!("key {key} is not held")))
        }
    }
}

/// Delete files under `scratch_dir` last modified more than `max_age`
/// before `now`. Returns how many were removed.
pub fn clean_stale_temp_files(scratch_dir: &Path, max_age: Duration, now: SystemTime) -> LsifResult<usize> {
    if !scratch_dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in WalkDir::new(scratch_dir).min_depth(1) {
        let entry = entry.map_err(|e| LsifError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = entry.metadata().map_err(|e| LsifError::Io(e.into()))?.modified()?;
        // Clock skew makes a file look newer than `now`; keep it.
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age <= max_age {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    if removed > 0 {
        info!(dir = %scratch_dir.display(), removed, "removed stale temp files");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_are_stable_and_distinct() {
        assert_eq!(lock_key("clean"), lock_key("clean"));
        assert_ne!(lock_key("clean"), lock_key("retention"));
    }

    #[test]
    fn task_runs_only_when_lock_is_free() {
        let lock = LocalAdvisoryLock::default();
        assert_eq!(try_with_lock(&lock, "t", || Ok(1)).unwrap(), Some(1));

        let key = lock_key("t");
        assert!(lock.try_lock(key).unwrap());
        let mut ran = false;
        let result = try_with_lock(&lock, "t", || {
            ran = true;
            Ok(())
        })
        .unwrap();
        assert!(result.is_none());
        assert!(!ran);
        lock.unlock(key).unwrap();
    }

    #[test]
    fn lock_is_released_after_failure() {
        let lock = LocalAdvisoryLock::default();
        let failed: LsifResult<Option<()>> =
            try_with_lock(&lock, "t", || Err(LsifError::Parse("boom".into())));
        assert!(failed.is_err());
        assert!(lock.try_lock(lock_key("t")).unwrap());
    }

    #[test]
    fn unlocking_a_free_key_is_an_error() {
        let lock = LocalAdvisoryLock::default();
        assert!(matches!(lock.unlock(7), Err(LsifError::Lock(_))));
    }

    #[test]
    fn only_old_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.db"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("b.db"), b"b").unwrap();

        let max_age = Duration::from_secs(60);
        let now = SystemTime::now();
        assert_eq!(clean_stale_temp_files(dir.path(), max_age, now).unwrap(), 0);

        let later = now + Duration::from_secs(3600);
        assert_eq!(clean_stale_temp_files(dir.path(), max_age, later).unwrap(), 2);
        assert!(!dir.path().join("a.db").exists());
        assert!(dir.path().join("nested").is_dir());

        assert_eq!(
            clean_stale_temp_files(&dir.path().join("missing"), max_age, now).unwrap(),
            0
        );
    }
}
