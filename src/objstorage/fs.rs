//! Local directory object provider.
//!
//! - Exclusive `<root>/LOCK` (fs2) until `release()` or drop.
//! - Objects are written to `<name>.tmp` and renamed on finish (atomic visibility).
//! - With fsync enabled, files are synced before rename and the directory on `sync()`.

use anyhow::{Context, Result};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::cancel::CancelToken;
use crate::consts::{LOCK_FILE, TMP_SUFFIX};
use crate::error::LsmError;
use crate::lock::{try_lock_dir, LockGuard};

use super::{Provider, Readable, Writable};

#[derive(Debug)]
pub struct FsProvider {
    root: PathBuf,
    fsync: bool,
    lock: Mutex<Option<LockGuard>>,
}

impl FsProvider {
    /// Open (creating if needed) a store directory and take its lock.
    /// Leftover `*.tmp` objects from an interrupted write are removed.
    pub fn open(root: &Path, fsync: bool) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("create root {}", root.display()))?;
        let lock = try_lock_dir(root)?;

        for de in fs::read_dir(root).with_context(|| format!("read_dir {}", root.display()))? {
            let de = de?;
            let name = de.file_name().to_string_lossy().to_string();
            if name.ends_with(TMP_SUFFIX) {
                debug!("fs provider: removing stale {}", name);
                let _ = fs::remove_file(de.path());
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            fsync,
            lock: Mutex::new(Some(lock)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

struct FsReadable {
    file: Mutex<File>,
    size: u64,
    path: PathBuf,
}

impl Readable for FsReadable {
    fn read_at(&self, cancel: &CancelToken, buf: &mut [u8], off: u64) -> Result<()> {
        cancel.check()?;
        let end = off.saturating_add(buf.len() as u64);
        if end > self.size {
            return Err(LsmError::Corruption(format!(
                "read [{}, {}) past end of {} ({} B)",
                off,
                end,
                self.path.display(),
                self.size
            ))
            .into());
        }
        let mut f = self.file.lock().unwrap_or_else(|e| e.into_inner());
        f.seek(SeekFrom::Start(off))?;
        f.read_exact(buf)
            .with_context(|| format!("read {} B at {} from {}", buf.len(), off, self.path.display()))?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

struct FsWritable {
    w: BufWriter<File>,
    tmp: PathBuf,
    dst: PathBuf,
    fsync: bool,
}

impl Writable for FsWritable {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.w
            .write_all(data)
            .with_context(|| format!("write {}", self.tmp.display()))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let FsWritable { w, tmp, dst, fsync } = *self;
        let f = w
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("flush {}", tmp.display()))?;
        if fsync {
            f.sync_all().with_context(|| format!("fsync {}", tmp.display()))?;
        }
        drop(f);
        fs::rename(&tmp, &dst)
            .with_context(|| format!("rename {} -> {}", tmp.display(), dst.display()))?;
        Ok(())
    }

    fn abort(self: Box<Self>) {
        let tmp = self.tmp.clone();
        drop(self);
        let _ = fs::remove_file(tmp);
    }
}

impl Provider for FsProvider {
    fn create(&self, name: &str) -> Result<Box<dyn Writable>> {
        let dst = self.object_path(name);
        let tmp = self.object_path(&format!("{}{}", name, TMP_SUFFIX));
        let f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open {}", tmp.display()))?;
        Ok(Box::new(FsWritable {
            w: BufWriter::new(f),
            tmp,
            dst,
            fsync: self.fsync,
        }))
    }

    fn open(&self, name: &str) -> Result<Arc<dyn Readable>> {
        let path = self.object_path(name);
        let f = OpenOptions::new()
            .read(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        let size = f.metadata()?.len();
        Ok(Arc::new(FsReadable {
            file: Mutex::new(f),
            size,
            path,
        }))
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.object_path(name);
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for de in fs::read_dir(&self.root).with_context(|| format!("read_dir {}", self.root.display()))? {
            let de = de?;
            if !de.file_type()?.is_file() {
                continue;
            }
            let name = de.file_name().to_string_lossy().to_string();
            if name == LOCK_FILE || name.ends_with(TMP_SUFFIX) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn sync(&self) -> Result<()> {
        if !self.fsync {
            return Ok(());
        }
        // Directory fsync makes renames/removals durable (unix); best-effort elsewhere.
        if let Ok(d) = File::open(&self.root) {
            let _ = d.sync_all();
        }
        Ok(())
    }

    fn path(&self, name: &str) -> String {
        self.object_path(name).display().to_string()
    }

    fn release(&self) {
        let guard = self.lock.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(g) = guard {
            debug!("fs provider: released {}", g.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_root(prefix: &str) -> PathBuf {
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("qlsm-fs-{prefix}-{}-{t}", std::process::id()))
    }

    #[test]
    fn write_finish_read_remove() {
        let root = unique_root("basic");
        let p = FsProvider::open(&root, true).unwrap();
        let mut w = p.create("000001.sst").unwrap();
        w.write(b"abcdef").unwrap();
        assert!(p.list().unwrap().is_empty());
        w.finish().unwrap();
        p.sync().unwrap();

        assert_eq!(p.list().unwrap(), vec!["000001.sst".to_string()]);
        assert_eq!(p.read_all("000001.sst").unwrap(), b"abcdef");

        let w = p.create("000002.sst").unwrap();
        w.abort();
        assert!(!root.join("000002.sst.tmp").exists());

        p.remove("000001.sst").unwrap();
        assert!(p.list().unwrap().is_empty());
    }

    #[test]
    fn second_provider_on_same_root_is_refused() {
        let root = unique_root("lock");
        let _p = FsProvider::open(&root, false).unwrap();
        assert!(FsProvider::open(&root, false).is_err());
    }

    #[test]
    fn release_unlocks_but_keeps_open_objects_readable() {
        let root = unique_root("release");
        let p = FsProvider::open(&root, false).unwrap();
        let mut w = p.create("000001.sst").unwrap();
        w.write(b"xyz").unwrap();
        w.finish().unwrap();
        let r = p.open("000001.sst").unwrap();

        p.release();
        p.release();
        let p2 = FsProvider::open(&root, false).unwrap();

        let mut buf = [0u8; 3];
        r.read_at(&CancelToken::new(), &mut buf, 0).unwrap();
        assert_eq!(&buf, b"xyz");
        assert_eq!(p2.read_all("000001.sst").unwrap(), b"xyz");
    }
}
