//! Directory lock for single-process ownership of an on-disk store.
//!
//! Cross-platform (fs2) advisory exclusive lock on `<root>/LOCK`.
//! The sequence allocator and snapshot registry live in process memory, so two
//! processes sharing one directory would break sequence monotonicity; the
//! second opener fails fast instead of blocking.
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::consts::LOCK_FILE;

#[derive(Debug)]
pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        let _ = self.file.unlock();
    }
}

fn lock_file_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

/// Try to take the exclusive lock. Returns Err if another owner holds it.
pub fn try_lock_dir(root: &Path) -> Result<LockGuard> {
    let path = lock_file_path(root);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    file.try_lock_exclusive()
        .with_context(|| format!("try_lock_exclusive failed: {}", path.display()))?;
    Ok(LockGuard { file, path })
}
