//! In-memory write buffer.
//!
//! Entries are keyed by InternalKey, so every insert creates a new version and
//! nothing already inserted is ever modified. Readers filter by sequence number;
//! a reader never observes an entry above its horizon even while writers keep
//! appending under the same RwLock.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::keys::{Entry, InternalKey, Kind, SeqNum};
use crate::rangedel::RangeTombstone;

// Per-entry bookkeeping on top of key/value bytes.
const ENTRY_OVERHEAD: usize = 32;

#[derive(Debug)]
pub struct Memtable {
    id: u64,
    entries: RwLock<BTreeMap<InternalKey, Vec<u8>>>,
    tombstones: RwLock<Vec<RangeTombstone>>,
    size: AtomicUsize,
    largest_seq: AtomicU64,
}

impl Memtable {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            entries: RwLock::new(BTreeMap::new()),
            tombstones: RwLock::new(Vec::new()),
            size: AtomicUsize::new(0),
            largest_seq: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<InternalKey, Vec<u8>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<InternalKey, Vec<u8>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_tombstones(&self) -> RwLockReadGuard<'_, Vec<RangeTombstone>> {
        self.tombstones.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a point mutation. Caller holds the commit serialization point.
    pub fn add(&self, seq: SeqNum, kind: Kind, key: &[u8], value: &[u8]) {
        let sz = key.len() + value.len() + ENTRY_OVERHEAD;
        self.write().insert(InternalKey::new(key, seq, kind), value.to_vec());
        self.size.fetch_add(sz, Ordering::Relaxed);
        self.largest_seq.fetch_max(seq, Ordering::Release);
    }

    pub fn add_range_delete(&self, seq: SeqNum, start: &[u8], end: &[u8]) {
        let sz = start.len() + end.len() + ENTRY_OVERHEAD;
        self.tombstones
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(RangeTombstone::new(start, end, seq));
        self.size.fetch_add(sz, Ordering::Relaxed);
        self.largest_seq.fetch_max(seq, Ordering::Release);
    }

    pub fn approximate_size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn largest_seq(&self) -> SeqNum {
        self.largest_seq.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty() && self.read_tombstones().is_empty()
    }

    /// All versions of `key`, newest first.
    pub fn versions(&self, key: &[u8]) -> Vec<Entry> {
        let map = self.read();
        let lo = InternalKey::seek_first(key);
        let hi = InternalKey::seek_last(key);
        map.range(lo..=hi)
            .map(|(k, v)| Entry {
                seq: k.seq,
                kind: k.kind,
                value: v.clone(),
            })
            .collect()
    }

    /// First user key at or after `from` together with its versions.
    pub fn next_versions(&self, from: Bound<&[u8]>) -> Option<(Vec<u8>, Vec<Entry>)> {
        let map = self.read();
        let lo = match from {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(k) => Bound::Included(InternalKey::seek_first(k)),
            Bound::Excluded(k) => Bound::Excluded(InternalKey::seek_last(k)),
        };
        let mut it = map.range((lo, Bound::Unbounded));
        let (first, v0) = it.next()?;
        let user = first.user_key.clone();
        let mut out = vec![Entry {
            seq: first.seq,
            kind: first.kind,
            value: v0.clone(),
        }];
        for (k, v) in it {
            if k.user_key != user {
                break;
            }
            out.push(Entry {
                seq: k.seq,
                kind: k.kind,
                value: v.clone(),
            });
        }
        Some((user, out))
    }

    /// Last user key at or before `from` together with its versions.
    pub fn prev_versions(&self, from: Bound<&[u8]>) -> Option<(Vec<u8>, Vec<Entry>)> {
        let user = {
            let map = self.read();
            let hi = match from {
                Bound::Unbounded => Bound::Unbounded,
                Bound::Included(k) => Bound::Included(InternalKey::seek_last(k)),
                Bound::Excluded(k) => Bound::Excluded(InternalKey::seek_first(k)),
            };
            let (last, _) = map.range((Bound::Unbounded, hi)).next_back()?;
            last.user_key.clone()
        };
        let vs = self.versions(&user);
        Some((user, vs))
    }

    pub fn range_tombstones(&self) -> Vec<RangeTombstone> {
        self.read_tombstones().clone()
    }

    /// Any point key or tombstone intersecting [start, end).
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        if self.read_tombstones().iter().any(|t| t.overlaps(start, end)) {
            return true;
        }
        let map = self.read();
        map.range(InternalKey::seek_first(start)..)
            .next()
            .map(|(k, _)| k.user_key.as_slice() < end)
            .unwrap_or(false)
    }

    /// Sorted copy of the contents, used by flush.
    pub fn sorted_contents(&self) -> (Vec<(InternalKey, Vec<u8>)>, Vec<RangeTombstone>) {
        let entries = self.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        (entries, self.range_tombstones())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> Memtable {
        let m = Memtable::new(1);
        m.add(1, Kind::Set, b"a", b"a1");
        m.add(2, Kind::Set, b"b", b"b2");
        m.add(3, Kind::Set, b"a", b"a3");
        m.add(4, Kind::Delete, b"c", b"");
        m
    }

    #[test]
    fn versions_are_newest_first() {
        let m = filled();
        let vs = m.versions(b"a");
        assert_eq!(vs.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 1]);
        assert!(m.versions(b"zz").is_empty());
    }

    #[test]
    fn next_and_prev_walk_user_keys() {
        let m = filled();
        let (k, vs) = m.next_versions(Bound::Unbounded).unwrap();
        assert_eq!(k, b"a");
        assert_eq!(vs.len(), 2);
        let (k, _) = m.next_versions(Bound::Excluded(&b"a"[..])).unwrap();
        assert_eq!(k, b"b");
        let (k, _) = m.next_versions(Bound::Included(&b"b"[..])).unwrap();
        assert_eq!(k, b"b");
        assert!(m.next_versions(Bound::Excluded(&b"c"[..])).is_none());

        let (k, _) = m.prev_versions(Bound::Unbounded).unwrap();
        assert_eq!(k, b"c");
        let (k, vs) = m.prev_versions(Bound::Excluded(&b"b"[..])).unwrap();
        assert_eq!(k, b"a");
        assert_eq!(vs.len(), 2);
        assert!(m.prev_versions(Bound::Excluded(&b"a"[..])).is_none());
    }

    #[test]
    fn overlap_checks_points_and_tombstones() {
        let m = filled();
        assert!(m.overlaps(b"b", b"c"));
        assert!(!m.overlaps(b"d", b"z"));
        m.add_range_delete(5, b"x", b"y");
        assert!(m.overlaps(b"d", b"z"));
        assert_eq!(m.largest_seq(), 5);
    }
}
