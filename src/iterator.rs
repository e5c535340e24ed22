//! Bidirectional iterator over a fixed read view.
//!
//! Positioning methods return whether the iterator is now valid. Once a
//! storage error happens the iterator stays invalid; `error()` exposes it and
//! `close()` returns it.

use anyhow::Result;
use std::fmt;
use std::ops::Bound;

use crate::cancel::CancelToken;
use crate::db::view::ReadView;
use crate::keys::SeqNum;
use crate::metrics::record_iterator_created;

#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    /// Inclusive lower bound.
    pub lower_bound: Option<Vec<u8>>,
    /// Exclusive upper bound.
    pub upper_bound: Option<Vec<u8>>,
    pub cancel: Option<CancelToken>,
}

impl IterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lower_bound(mut self, k: &[u8]) -> Self {
        self.lower_bound = Some(k.to_vec());
        self
    }

    pub fn with_upper_bound(mut self, k: &[u8]) -> Self {
        self.upper_bound = Some(k.to_vec());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Bounds covering exactly the keys that start with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            lower_bound: Some(prefix.to_vec()),
            upper_bound: prefix_successor(prefix),
            cancel: None,
        }
    }
}

/// Smallest key greater than every key with this prefix (None if unbounded).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.pop() {
        if last != 0xFF {
            out.push(last + 1);
            return Some(out);
        }
    }
    None
}

pub struct DbIterator {
    view: ReadView,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
    cancel: CancelToken,
    cur: Option<(Vec<u8>, Vec<u8>)>,
    err: Option<anyhow::Error>,
    closed: bool,
}

impl fmt::Debug for DbIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbIterator")
            .field("seq", &self.seq())
            .field("valid", &self.valid())
            .field("closed", &self.closed)
            .field("err", &self.err.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

impl DbIterator {
    pub(crate) fn new(view: ReadView, opts: &IterOptions) -> Self {
        record_iterator_created();
        Self {
            view,
            lower: opts.lower_bound.clone(),
            upper: opts.upper_bound.clone(),
            cancel: opts.cancel.clone().unwrap_or_default(),
            cur: None,
            err: None,
            closed: false,
        }
    }

    /// Horizon the iterator reads at.
    pub fn seq(&self) -> SeqNum {
        self.view.horizon()
    }

    fn settle(&mut self, r: Result<Option<(Vec<u8>, Vec<u8>)>>) -> bool {
        match r {
            Ok(cur) => self.cur = cur,
            Err(e) => {
                self.cur = None;
                self.err = Some(e);
            }
        }
        self.cur.is_some()
    }

    fn usable(&self) -> bool {
        !self.closed && self.err.is_none()
    }

    fn forward(&mut self, from: Bound<Vec<u8>>) -> bool {
        if !self.usable() {
            return false;
        }
        let from = match &from {
            Bound::Included(k) => Bound::Included(k.as_slice()),
            Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let r = self.view.next_visible(from, self.upper.as_deref(), &self.cancel);
        self.settle(r)
    }

    fn backward(&mut self, from: Bound<Vec<u8>>) -> bool {
        if !self.usable() {
            return false;
        }
        let from = match &from {
            Bound::Included(k) => Bound::Included(k.as_slice()),
            Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let r = self.view.prev_visible(from, self.lower.as_deref(), &self.cancel);
        self.settle(r)
    }

    pub fn first(&mut self) -> bool {
        let from = match &self.lower {
            Some(l) => Bound::Included(l.clone()),
            None => Bound::Unbounded,
        };
        self.forward(from)
    }

    pub fn last(&mut self) -> bool {
        let from = match &self.upper {
            Some(u) => Bound::Excluded(u.clone()),
            None => Bound::Unbounded,
        };
        self.backward(from)
    }

    /// First key >= `key` (clamped to the lower bound).
    pub fn seek_ge(&mut self, key: &[u8]) -> bool {
        let k = match &self.lower {
            Some(l) if l.as_slice() > key => l.clone(),
            _ => key.to_vec(),
        };
        self.forward(Bound::Included(k))
    }

    /// Last key < `key` (clamped to the upper bound).
    pub fn seek_lt(&mut self, key: &[u8]) -> bool {
        let k = match &self.upper {
            Some(u) if u.as_slice() < key => u.clone(),
            _ => key.to_vec(),
        };
        self.backward(Bound::Excluded(k))
    }

    pub fn next(&mut self) -> bool {
        match self.cur.take() {
            Some((k, _)) => self.forward(Bound::Excluded(k)),
            None => false,
        }
    }

    pub fn prev(&mut self) -> bool {
        match self.cur.take() {
            Some((k, _)) => self.backward(Bound::Excluded(k)),
            None => false,
        }
    }

    pub fn valid(&self) -> bool {
        self.usable() && self.cur.is_some()
    }

    /// Current key; empty when not valid.
    pub fn key(&self) -> &[u8] {
        self.cur.as_ref().map(|(k, _)| k.as_slice()).unwrap_or_default()
    }

    /// Current value; empty when not valid.
    pub fn value(&self) -> &[u8] {
        self.cur.as_ref().map(|(_, v)| v.as_slice()).unwrap_or_default()
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }

    /// Release the view; returns the error that stopped iteration, if any.
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.cur = None;
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drain the remaining entries from the current position onward.
    pub fn collect_remaining(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        while self.valid() {
            out.push((self.key().to_vec(), self.value().to_vec()));
            self.next();
        }
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_successor_handles_ff() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(b"a\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_successor(b"\xff\xff"), None);
        assert_eq!(prefix_successor(b""), None);
    }

    #[test]
    fn debug_shows_position_state() {
        let db = crate::db::Db::open_in_memory(crate::config::LsmConfig::default()).unwrap();
        db.set(b"a", b"1").unwrap();
        let mut it = db.new_iter(&IterOptions::default()).unwrap();
        assert!(it.first());
        let s = format!("{:?}", it);
        assert!(s.contains("seq: 1"), "{s}");
        assert!(s.contains("valid: true"), "{s}");
    }
}
