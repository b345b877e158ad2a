//! Single-instance locking so only one batch run executes at a time

use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Another instance is already running (lock held: {resource})")]
    Held { resource: String },

    #[error("Failed to prepare lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Acquire-or-fail process lock
pub trait InstanceLock {
    /// Take the lock without blocking. Fails with [`LockError::Held`] when
    /// another holder exists.
    fn acquire(&mut self) -> Result<(), LockError>;

    /// Release the lock. Calling this when not held is a no-op.
    fn release(&mut self);
}

/// Releases the lock when dropped, on every exit path
pub struct LockGuard<'a, L: InstanceLock + ?Sized> {
    lock: &'a mut L,
}

impl<'a, L: InstanceLock + ?Sized> LockGuard<'a, L> {
    pub fn acquire(lock: &'a mut L) -> Result<Self, LockError> {
        lock.acquire()?;
        Ok(Self { lock })
    }
}

impl<L: InstanceLock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Advisory file lock held for the whole run.
///
/// The lock file contains the holder's PID and is removed on release.
pub struct FileLock {
    path: PathBuf,
    held: Option<HeldLock>,
}

/// Lock and guard stored together. Field order matters: the guard must be
/// dropped before the lock it borrows from.
struct HeldLock {
    _guard: RwLockWriteGuard<'static, File>,
    _lock: Box<RwLock<File>>,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    fn io_error(&self, source: std::io::Error) -> LockError {
        LockError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl InstanceLock for FileLock {
    fn acquire(&mut self) -> Result<(), LockError> {
        if self.held.is_some() {
            return Ok(());
        }

        debug!("Attempting to acquire lock: {:?}", self.path);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        let mut lock = Box::new(RwLock::new(file));

        // SAFETY: the guard borrows the RwLock inside the Box. The Box's heap
        // allocation never moves, and HeldLock drops the guard before the Box.
        let lock_ptr: *mut RwLock<File> = &mut *lock;
        let guard = match unsafe { (*lock_ptr).try_write() } {
            Ok(guard) => guard,
            Err(_) => {
                return Err(LockError::Held {
                    resource: self.path.display().to_string(),
                })
            }
        };
        let mut guard: RwLockWriteGuard<'static, File> = unsafe { std::mem::transmute(guard) };

        let pid = std::process::id();
        if let Err(e) = write_pid(&mut guard, pid) {
            warn!("Could not write PID to lock file {:?}: {}", self.path, e);
        }

        self.held = Some(HeldLock {
            _guard: guard,
            _lock: lock,
        });

        info!("Acquired instance lock: {:?} (pid {})", self.path, pid);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(held) = self.held.take() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!("Failed to remove lock file: {}", e);
            }
            drop(held);
            info!("Released instance lock: {:?}", self.path);
        }
    }
}

fn write_pid(file: &mut File, pid: u32) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", pid)?;
    file.flush()
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// In-memory lock for tests. Clones share state, so a clone that acquires
/// first makes every other clone fail with [`LockError::Held`].
#[derive(Default)]
pub struct MemoryLock {
    state: Arc<AtomicBool>,
    owned: bool,
}

impl Clone for MemoryLock {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            owned: false,
        }
    }
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }
}

impl InstanceLock for MemoryLock {
    fn acquire(&mut self) -> Result<(), LockError> {
        if self.owned {
            return Ok(());
        }
        self.state
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| LockError::Held {
                resource: "memory".to_string(),
            })?;
        self.owned = true;
        Ok(())
    }

    fn release(&mut self) {
        if self.owned {
            self.owned = false;
            self.state.store(false, Ordering::SeqCst);
        }
    }
}
