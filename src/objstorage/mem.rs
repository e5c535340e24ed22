//! In-memory object provider.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cancel::CancelToken;
use crate::error::LsmError;

use super::{Provider, Readable, Writable};

type Objects = Arc<Mutex<HashMap<String, Arc<Vec<u8>>>>>;

#[derive(Debug, Default, Clone)]
pub struct MemProvider {
    objects: Objects,
}

impl MemProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<u8>>>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct MemReadable {
    data: Arc<Vec<u8>>,
}

impl Readable for MemReadable {
    fn read_at(&self, cancel: &CancelToken, buf: &mut [u8], off: u64) -> Result<()> {
        cancel.check()?;
        let start = off as usize;
        let end = start.saturating_add(buf.len());
        if end > self.data.len() {
            return Err(LsmError::Corruption(format!(
                "read [{}, {}) past end of object ({} B)",
                start,
                end,
                self.data.len()
            ))
            .into());
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

struct MemWritable {
    name: String,
    buf: Vec<u8>,
    objects: Objects,
}

impl Writable for MemWritable {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(this.name, Arc::new(this.buf));
        Ok(())
    }

    fn abort(self: Box<Self>) {}
}

impl Provider for MemProvider {
    fn create(&self, name: &str) -> Result<Box<dyn Writable>> {
        Ok(Box::new(MemWritable {
            name: name.to_string(),
            buf: Vec::new(),
            objects: self.objects.clone(),
        }))
    }

    fn open(&self, name: &str) -> Result<Arc<dyn Readable>> {
        let data = self
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("object '{}' not found", name))?;
        Ok(Arc::new(MemReadable { data }))
    }

    fn remove(&self, name: &str) -> Result<()> {
        match self.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(anyhow!("object '{}' not found", name)),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn path(&self, name: &str) -> String {
        format!("mem://{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;

    #[test]
    fn object_visible_only_after_finish() {
        let p = MemProvider::new();
        let mut w = p.create("a").unwrap();
        w.write(b"hello ").unwrap();
        w.write(b"world").unwrap();
        assert!(p.open("a").is_err());
        w.finish().unwrap();

        let r = p.open("a").unwrap();
        assert_eq!(r.size(), 11);
        let mut buf = [0u8; 5];
        r.read_at(&CancelToken::new(), &mut buf, 6).unwrap();
        assert_eq!(&buf, b"world");
        assert!(r.read_at(&CancelToken::new(), &mut buf, 8).is_err());

        let w = p.create("b").unwrap();
        w.abort();
        assert_eq!(p.list().unwrap(), vec!["a".to_string()]);
        p.remove("a").unwrap();
        assert!(p.remove("a").is_err());
    }

    #[test]
    fn cancelled_read_fails() {
        let p = MemProvider::new();
        let mut w = p.create("x").unwrap();
        w.write(b"data").unwrap();
        w.finish().unwrap();
        let r = p.open("x").unwrap();
        let c = CancelToken::new();
        c.cancel();
        let mut buf = [0u8; 4];
        let err = r.read_at(&c, &mut buf, 0).unwrap_err();
        assert_eq!(kind_of(&err), Some(&LsmError::Cancelled));
    }
}
