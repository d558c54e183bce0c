//! Advisory resource locks with stale-holder detection.
//!
//! Each mutable snapshot has a single logical writer. Writers take a
//! lock file named after the resource, containing the holder PID. A
//! lock whose PID no longer exists is stale and safe to reclaim.

use backoff::{retry, Error as BackoffError, ExponentialBackoff};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::error::{CortexError, Result};

/// Held advisory lock; released on drop.
#[derive(Debug)]
pub struct ResourceLock {
    path: PathBuf,
}

impl ResourceLock {
    /// Acquire the lock for `resource` inside `lock_dir`, retrying with
    /// exponential backoff on contention before surfacing `Transient`.
    pub fn acquire(lock_dir: &Path, resource: &str) -> Result<Self> {
        fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{resource}.lock"));

        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(50),
            max_elapsed_time: Some(Duration::from_millis(400)),
            ..ExponentialBackoff::default()
        };
        retry(policy, || {
            Self::try_acquire(&path).map_err(|err| {
                if err.is_transient() {
                    BackoffError::transient(err)
                } else {
                    BackoffError::permanent(err)
                }
            })
        })
        .map_err(|err| match err {
            BackoffError::Transient { err, .. } | BackoffError::Permanent(err) => err,
        })
    }

    fn try_acquire(path: &Path) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                write!(file, "{}", std::process::id())?;
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if Self::holder_is_stale(path) {
                    // Stale holder: reclaim by removing and retrying once.
                    fs::remove_file(path).ok();
                    return Self::try_acquire(path);
                }
                Err(CortexError::Transient(format!(
                    "lock held: {}",
                    path.display()
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A holder is stale when its recorded PID no longer exists.
    fn holder_is_stale(path: &Path) -> bool {
        let Ok(contents) = fs::read_to_string(path) else {
            // Unreadable lock file: treat as stale rather than deadlock.
            return true;
        };
        let Ok(pid) = contents.trim().parse::<i32>() else {
            return true;
        };
        // Signal 0 probes existence without delivering anything.
        kill(Pid::from_raw(pid), None).is_err()
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        fs::remove_file(&self.path).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("queue.lock");
        {
            let _lock = ResourceLock::acquire(dir.path(), "queue").unwrap();
            assert!(lock_path.exists());
            let pid: i32 = fs::read_to_string(&lock_path).unwrap().trim().parse().unwrap();
            assert_eq!(pid, std::process::id() as i32);
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_contention_with_live_holder_fails_transient() {
        let dir = TempDir::new().unwrap();
        let _held = ResourceLock::acquire(dir.path(), "queue").unwrap();
        let err = ResourceLock::acquire(dir.path(), "queue").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("queue.lock");
        // PID 1 is init and never matches a dead process, so fabricate
        // a PID far beyond pid_max instead.
        fs::write(&lock_path, "999999999").unwrap();
        let _lock = ResourceLock::acquire(dir.path(), "queue").unwrap();
        let pid: i32 = fs::read_to_string(&lock_path).unwrap().trim().parse().unwrap();
        assert_eq!(pid, std::process::id() as i32);
    }

    #[test]
    fn test_garbage_lock_file_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("queue.lock"), "not-a-pid").unwrap();
        let lock = ResourceLock::acquire(dir.path(), "queue");
        assert!(lock.is_ok());
    }
}
