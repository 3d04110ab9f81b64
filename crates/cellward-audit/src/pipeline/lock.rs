use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    created_at_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    // kill(pid, 0) checks existence/permission without sending a signal.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    // No portable liveness check off Unix; fall back to pure staleness.
    true
}

/// An advisory, filesystem-backed mutual-exclusion lock (spec §4.5,
/// §6.6). A holder writes `{pid, createdAt}`; a lock is considered
/// free if the file is absent, if its owning pid is no longer alive,
/// or if it has been held longer than `stale_after`.
pub struct FileLock {
    path: PathBuf,
}

pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Try to take the lock once. Returns `None` if another live,
    /// non-stale holder has it.
    pub fn try_acquire(&self, stale_after: Duration) -> Option<LockGuard> {
        if let Ok(existing) = fs::read(&self.path) {
            if let Ok(record) = serde_json::from_slice::<LockRecord>(&existing) {
                let age_ms = now_ms().saturating_sub(record.created_at_ms);
                let still_fresh = age_ms < stale_after.as_millis() as u64;
                if still_fresh && pid_is_alive(record.pid) {
                    return None;
                }
            }
        }
        self.write_record();
        Some(LockGuard { path: self.path.clone() })
    }

    /// Block (with simple polling) until the lock can be acquired or
    /// `timeout` elapses.
    pub fn acquire_blocking(&self, stale_after: Duration, timeout: Duration) -> Option<LockGuard> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(guard) = self.try_acquire(stale_after) {
                return Some(guard);
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn write_record(&self) {
        let record = LockRecord {
            pid: std::process::id(),
            created_at_ms: now_ms(),
        };
        if let Ok(bytes) = serde_json::to_vec(&record) {
            let _ = fs::write(&self.path, bytes);
        }
    }
}

impl LockGuard {
    /// Bump the lock's `createdAt` so a long-running holder (mid-flush)
    /// doesn't get pre-empted by a staleness timeout (spec §4.5 "touch
    /// the flush lock between batches").
    pub fn touch(&self) {
        let record = LockRecord {
            pid: std::process::id(),
            created_at_ms: now_ms(),
        };
        if let Ok(bytes) = serde_json::to_vec(&record) {
            let _ = fs::write(&self.path, bytes);
        }
    }
}

pub fn path_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

/// Write (or overwrite) an owner record at `path` without taking out a
/// [`LockGuard`] — used for the long-lived per-segment `.open.lock`
/// file, whose lifetime is the segment's "open" phase rather than a
/// single critical section.
pub fn write_owner_record(path: &Path) {
    let record = LockRecord {
        pid: std::process::id(),
        created_at_ms: now_ms(),
    };
    if let Ok(bytes) = serde_json::to_vec(&record) {
        let _ = fs::write(path, bytes);
    }
}

/// True if `path` holds no record, or an unreadable one, or a record
/// owned by a dead or stale process — i.e. the segment it guards is an
/// orphan (spec §4.5 "owner PID no longer alive, or stale-ms exceeded").
pub fn is_orphaned(path: &Path, stale_after: Duration) -> bool {
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<LockRecord>(&bytes) {
            Ok(record) => {
                let age_ms = now_ms().saturating_sub(record.created_at_ms);
                age_ms >= stale_after.as_millis() as u64 || !pid_is_alive(record.pid)
            }
            Err(_) => true,
        },
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_blocked_while_first_holds() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("queue.enqueue.lock");
        let lock = FileLock::new(&lock_path);
        let guard = lock.try_acquire(Duration::from_secs(60)).unwrap();
        assert!(lock.try_acquire(Duration::from_secs(60)).is_none());
        drop(guard);
        assert!(lock.try_acquire(Duration::from_secs(60)).is_some());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("queue.flush.lock");
        let record = LockRecord { pid: std::process::id(), created_at_ms: 0 };
        fs::write(&lock_path, serde_json::to_vec(&record).unwrap()).unwrap();
        let lock = FileLock::new(&lock_path);
        assert!(lock.try_acquire(Duration::from_millis(1)).is_some());
    }
}
