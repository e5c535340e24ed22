//! Object storage: named, immutable-once-finished byte objects.
//!
//! - mem.rs: MemProvider (process memory; tests and ephemeral stores).
//! - fs.rs: FsProvider (local directory, LOCK file, tmp+rename on finish).
//!
//! Tables and manifests are the only objects. A Writable becomes visible
//! under its name only after `finish`; `abort` leaves nothing behind.

use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::consts::{MANIFEST_PREFIX, TABLE_EXT};

pub mod fs;
pub mod mem;

pub use fs::FsProvider;
pub use mem::MemProvider;

/// Object opened for reading. Parallel `read_at` calls are allowed.
pub trait Readable: Send + Sync {
    /// Fill `buf` from offset `off`; fails if the range is past the end.
    fn read_at(&self, cancel: &CancelToken, buf: &mut [u8], off: u64) -> Result<()>;

    fn size(&self) -> u64;
}

/// Object opened for writing. Either `finish` or `abort` must be called.
pub trait Writable: Send {
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Complete the object and make it visible (and durable, if configured).
    fn finish(self: Box<Self>) -> Result<()>;

    fn abort(self: Box<Self>);
}

pub trait Provider: Send + Sync + fmt::Debug {
    fn create(&self, name: &str) -> Result<Box<dyn Writable>>;

    fn open(&self, name: &str) -> Result<Arc<dyn Readable>>;

    fn remove(&self, name: &str) -> Result<()>;

    /// Names of all finished objects.
    fn list(&self) -> Result<Vec<String>>;

    /// Persist metadata of created/removed objects.
    fn sync(&self) -> Result<()>;

    /// Informational location, for logs.
    fn path(&self, name: &str) -> String;

    /// Give up exclusive ownership of the underlying store (called by `Db::close`).
    /// Objects already opened stay readable.
    fn release(&self) {}

    /// Read a whole object.
    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let r = self.open(name)?;
        let mut buf = vec![0u8; r.size() as usize];
        r.read_at(&CancelToken::new(), &mut buf, 0)
            .with_context(|| format!("read {}", self.path(name)))?;
        Ok(buf)
    }
}

pub fn table_object_name(file_num: u64) -> String {
    format!("{:06}.{}", file_num, TABLE_EXT)
}

pub fn parse_table_object_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(TABLE_EXT)?.strip_suffix('.')?;
    stem.parse::<u64>().ok()
}

pub fn manifest_object_name(num: u64) -> String {
    format!("{}{:06}", MANIFEST_PREFIX, num)
}

pub fn parse_manifest_object_name(name: &str) -> Option<u64> {
    name.strip_prefix(MANIFEST_PREFIX)?.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_parse_back() {
        assert_eq!(table_object_name(7), "000007.sst");
        assert_eq!(parse_table_object_name("000007.sst"), Some(7));
        assert_eq!(parse_table_object_name("000007.sst.tmp"), None);
        assert_eq!(parse_table_object_name("LOCK"), None);
        assert_eq!(manifest_object_name(3), "MANIFEST-000003");
        assert_eq!(parse_manifest_object_name("MANIFEST-000003"), Some(3));
        assert_eq!(parse_manifest_object_name("000003.sst"), None);
    }
}
