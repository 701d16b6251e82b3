//! File-based locking for single-writer safety.
//!
//! Cross-platform (fs2) advisory lock taken on the store file itself:
//! a second open of the same store fails fast instead of racing the pager.
//! The lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::Path;

pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        let _ = self.file.unlock();
    }
}

/// Try to take an exclusive lock on the store file. Returns Err if another
/// handle (this process or any other) already holds it.
pub fn try_acquire_exclusive(file: &File, path: &Path) -> Result<LockGuard> {
    let handle = file
        .try_clone()
        .with_context(|| format!("clone handle to lock {}", path.display()))?;
    handle
        .try_lock_exclusive()
        .with_context(|| format!("store is locked by another process: {}", path.display()))?;
    Ok(LockGuard { file: handle })
}
