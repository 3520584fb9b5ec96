//! core::ops::lock
//!
//! Cross-process and cross-thread exclusive lock for one store name.
//!
//! # Architecture
//!
//! A [`StoreLock`] is created once per store name per process and shared by
//! every caller touching that store. Acquiring it combines two locks:
//!
//! - a per-name reentrant mutex, so threads of this process serialize while a
//!   single thread may nest acquisitions;
//! - an OS-level advisory exclusive lock (`fs2`) on the lock marker file, so
//!   other processes serialize too.
//!
//! Advisory `flock` locks belong to an open file description: a second
//! descriptor opened by the same thread would wait on its own lock. Only the
//! outermost acquisition on a thread therefore opens and locks the marker
//! file; nested acquisitions bump a depth counter.
//!
//! The order is always in-process mutex first, then OS lock. This is the
//! reverse of the OS-lock-first order a plain file lock would use: with the
//! OS lock first, two threads of one process would each open a descriptor
//! and the second would contend with its own process. Exclusion across
//! processes is unchanged.
//!
//! # Storage
//!
//! - `<root>/<store>/device/lock` - Lock file with OS-level exclusive lock
//!
//! # Invariants
//!
//! - The marker file descriptor is closed when the last nested guard releases
//! - Every guard releases on drop (RAII pattern)
//! - Transient open/lock failures are retried a bounded number of times;
//!   exhausting the budget is an error, never a silent success
//!
//! # Example
//!
//! ```ignore
//! use tierprops::core::ops::lock::{LockPolicy, StoreLock};
//!
//! let lock = StoreLock::new(paths.lock_path(), LockPolicy::default());
//! let guard = lock.acquire()?;
//!
//! // Touch revision markers and tier files while holding the guard
//! // ...
//!
//! // Released when dropped
//! drop(guard);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use lock_api::ArcReentrantMutexGuard;
use parking_lot::{RawMutex, RawThreadId, ReentrantMutex};
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of attempts to open and lock the marker file.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Default pause between attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Failed to create the directory holding the lock file.
    #[error("failed to create lock directory {}: {source}", .path.display())]
    CreateFailed { path: PathBuf, source: io::Error },

    /// The retry budget ran out before the OS lock was obtained.
    #[error("failed to acquire lock {} after {attempts} attempts: {source}", .path.display())]
    Exhausted {
        path: PathBuf,
        attempts: u32,
        source: io::Error,
    },

    /// Failed to release the OS lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// Retry budget for acquiring the OS lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Attempts before giving up. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// State shared by the nested guards of the owning thread.
#[derive(Debug, Default)]
struct Held {
    depth: usize,
    file: Option<File>,
}

/// Per-name lock shared by every caller in the process.
pub struct StoreLock {
    path: PathBuf,
    policy: LockPolicy,
    held: Arc<ReentrantMutex<RefCell<Held>>>,
}

impl fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLock")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl StoreLock {
    /// Create a lock hosted by the marker file at `path`.
    ///
    /// Nothing is touched on disk until the first [`StoreLock::acquire`].
    pub fn new(path: PathBuf, policy: LockPolicy) -> Self {
        Self {
            path,
            policy,
            held: Arc::new(ReentrantMutex::new(RefCell::new(Held::default()))),
        }
    }

    /// Path of the lock marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Retry budget used by this lock.
    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Acquire the lock, blocking until both the in-process mutex and the OS
    /// lock are held.
    ///
    /// Waiting for the in-process mutex is unbounded; waiting for the OS lock
    /// is bounded by the [`LockPolicy`].
    ///
    /// Reentrant on the calling thread.
    ///
    /// # Errors
    ///
    /// - [`LockError::CreateFailed`] if the lock directory cannot be created
    /// - [`LockError::Exhausted`] if the marker file could not be opened and
    ///   locked within the retry budget
    pub fn acquire(&self) -> Result<StoreLockGuard, LockError> {
        let held = self.held.lock_arc();

        {
            let mut state = held.borrow_mut();
            if state.depth == 0 {
                state.file = Some(self.lock_file_with_retry()?);
            }
            state.depth += 1;
        }

        Ok(StoreLockGuard {
            path: self.path.clone(),
            held: Some(held),
        })
    }

    /// Open the marker file and take the OS lock, retrying transient failures.
    fn lock_file_with_retry(&self) -> Result<File, LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::CreateFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.try_lock_file() {
                Ok(file) => {
                    if attempt > 1 {
                        debug!(path = %self.path.display(), attempt, "lock acquired after retry");
                    }
                    return Ok(file);
                }
                Err(e) => {
                    debug!(path = %self.path.display(), attempt, error = %e, "lock attempt failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        thread::sleep(self.policy.backoff);
                    }
                }
            }
        }

        warn!(path = %self.path.display(), attempts, "lock retry budget exhausted");
        Err(LockError::Exhausted {
            path: self.path.clone(),
            attempts,
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no attempt made")),
        })
    }

    /// One non-blocking attempt. On a lock failure the freshly opened file is
    /// dropped, which closes its descriptor.
    fn try_lock_file(&self) -> io::Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        file.try_lock_exclusive()?;
        Ok(file)
    }
}

/// A held store lock.
///
/// Released on [`StoreLockGuard::release`] or on drop, whichever comes first.
pub struct StoreLockGuard {
    path: PathBuf,
    held: Option<ArcReentrantMutexGuard<RawMutex, RawThreadId, RefCell<Held>>>,
}

impl fmt::Debug for StoreLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLockGuard")
            .field("path", &self.path)
            .field("held", &self.is_held())
            .finish()
    }
}

impl StoreLockGuard {
    /// Check if this guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Path of the lock marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    ///
    /// Releases both the OS lock (when this is the outermost guard on the
    /// thread) and the in-process mutex. Calling it again is a no-op.
    pub fn release(&mut self) -> Result<(), LockError> {
        let Some(held) = self.held.take() else {
            return Ok(());
        };

        let file = {
            let mut state = held.borrow_mut();
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 {
                state.file.take()
            } else {
                None
            }
        };

        // The in-process mutex goes last so no other thread can open the
        // marker while this one still has it locked.
        let result = match file {
            Some(file) => FileExt::unlock(&file)
                .map_err(|e| LockError::ReleaseFailed(e.to_string())),
            None => Ok(()),
        };
        drop(held);
        result
    }
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        // Best-effort; closing the descriptor drops the OS lock regardless.
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_lock(temp: &TempDir) -> StoreLock {
        StoreLock::new(
            temp.path().join("main").join("device").join("lock"),
            LockPolicy::default(),
        )
    }

    /// Whether a fresh descriptor could take the OS lock right now.
    fn os_lock_free(path: &Path) -> bool {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .expect("open lock file");
        match file.try_lock_exclusive() {
            Ok(()) => {
                FileExt::unlock(&file).expect("unlock probe");
                true
            }
            Err(_) => false,
        }
    }

    #[test]
    fn acquire_creates_lock_file() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = test_lock(&temp);

        let guard = lock.acquire().expect("acquire");
        assert!(guard.is_held());
        assert!(lock.path().exists());
        assert_eq!(guard.path(), lock.path());
    }

    #[cfg(unix)]
    #[test]
    fn os_lock_held_until_release() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = test_lock(&temp);

        let mut guard = lock.acquire().expect("acquire");
        assert!(!os_lock_free(lock.path()));

        guard.release().expect("release");
        assert!(!guard.is_held());
        assert!(os_lock_free(lock.path()));
    }

    #[cfg(unix)]
    #[test]
    fn nested_acquire_on_same_thread() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = test_lock(&temp);

        let outer = lock.acquire().expect("outer");
        let inner = lock.acquire().expect("inner must not deadlock");
        assert!(inner.is_held());

        drop(inner);
        assert!(!os_lock_free(lock.path()), "outer guard still holds");

        drop(outer);
        assert!(os_lock_free(lock.path()));
    }

    #[test]
    fn inner_release_after_outer_keeps_counting() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = test_lock(&temp);

        let mut outer = lock.acquire().expect("outer");
        let mut inner = lock.acquire().expect("inner");

        outer.release().expect("release outer first");
        inner.release().expect("release inner");

        // Fully released: another thread can take it.
        let lock = Arc::new(lock);
        let lock_clone = Arc::clone(&lock);
        thread::spawn(move || {
            lock_clone.acquire().expect("acquire from other thread");
        })
        .join()
        .expect("join");
    }

    #[test]
    fn other_thread_blocks_until_release() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = Arc::new(test_lock(&temp));
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = lock.acquire().expect("acquire");

        let lock_clone = Arc::clone(&lock);
        let acquired_clone = Arc::clone(&acquired);
        let handle = thread::spawn(move || {
            let _guard = lock_clone.acquire().expect("acquire in thread");
            acquired_clone.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst), "second thread must wait");

        drop(guard);
        handle.join().expect("join");
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn exhausted_when_marker_cannot_be_opened() {
        let temp = TempDir::new().expect("create temp dir");
        // A directory where the marker file should be cannot be opened for writing.
        let path = temp.path().join("lock");
        fs::create_dir_all(&path).expect("mkdir");

        let lock = StoreLock::new(
            path,
            LockPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
        );

        match lock.acquire() {
            Err(LockError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {:?}", other),
        }

        // A failed acquisition leaves the in-process mutex free.
        assert!(matches!(lock.acquire(), Err(LockError::Exhausted { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn exhausted_while_another_descriptor_holds_it() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = StoreLock::new(
            temp.path().join("lock"),
            LockPolicy {
                max_attempts: 5,
                backoff: Duration::from_millis(2),
            },
        );
        drop(lock.acquire().expect("create marker"));

        // Stands in for another process.
        let holder = OpenOptions::new()
            .read(true)
            .write(true)
            .open(lock.path())
            .expect("open marker");
        holder.try_lock_exclusive().expect("hold");

        assert!(matches!(
            lock.acquire(),
            Err(LockError::Exhausted { attempts: 5, .. })
        ));

        FileExt::unlock(&holder).expect("unlock");
        assert!(lock.acquire().is_ok());
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = StoreLock::new(
            temp.path().join("lock"),
            LockPolicy {
                max_attempts: 0,
                backoff: Duration::from_millis(1),
            },
        );

        assert!(lock.acquire().is_ok());
    }

    #[test]
    fn create_failed_when_parent_is_a_file() {
        let temp = TempDir::new().expect("create temp dir");
        let blocker = temp.path().join("device");
        fs::write(&blocker, "not a dir").expect("write");

        let lock = StoreLock::new(blocker.join("lock"), LockPolicy::default());
        assert!(matches!(
            lock.acquire(),
            Err(LockError::CreateFailed { .. })
        ));
    }

    #[test]
    fn multiple_release_calls_are_safe() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = test_lock(&temp);

        let mut guard = lock.acquire().expect("acquire");
        guard.release().expect("first release");
        guard.release().expect("second release should be ok");
        assert!(!guard.is_held());
    }

    #[test]
    fn default_policy_values() {
        let policy = LockPolicy::default();
        assert_eq!(policy.max_attempts, 100);
        assert_eq!(policy.backoff, Duration::from_millis(10));
    }

    #[test]
    fn error_display_formatting() {
        let err = LockError::Exhausted {
            path: PathBuf::from("/x/lock"),
            attempts: 100,
            source: io::Error::new(io::ErrorKind::Interrupted, "interrupted"),
        };
        let msg = err.to_string();
        assert!(msg.contains("100 attempts"));
        assert!(msg.contains("/x/lock"));

        let err = LockError::ReleaseFailed("test".into());
        assert!(err.to_string().contains("release"));
    }
}
