//! Sorted table reader.
//!
//! Opening a table reads the footer, index, range-del, bloom and props blocks
//! eagerly; data blocks are read on demand through the shared BlockCache.
//! A table marked obsolete removes its object when the last reference drops.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::consts::TABLE_FOOTER_LEN;
use crate::error::LsmError;
use crate::keys::{Entry, SeqNum};
use crate::metrics::record_bloom_skip;
use crate::objstorage::{table_object_name, Provider, Readable};
use crate::rangedel::RangeTombstone;

use super::bloom::BloomFilter;
use super::cache::{Block, BlockCache};
use super::format::{decode_block, decode_entries, decode_index, decode_tombstones, Footer, Handle, IndexEntry, Props};

pub struct Table {
    file_num: u64,
    provider: Arc<dyn Provider>,
    readable: Arc<dyn Readable>,
    cache: Arc<BlockCache>,

    index: Vec<IndexEntry>,
    tombstones: Vec<RangeTombstone>,
    bloom: Option<BloomFilter>,
    props: Props,

    smallest: Vec<u8>,
    largest: Vec<u8>,
    size: u64,
    obsolete: AtomicBool,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("file_num", &self.file_num)
            .field("size", &self.size)
            .field("blocks", &self.index.len())
            .field("range_dels", &self.tombstones.len())
            .field("props", &self.props)
            .finish()
    }
}

fn read_raw(r: &dyn Readable, cancel: &CancelToken, (off, len): Handle) -> Result<Vec<u8>> {
    if off.saturating_add(len) > r.size() {
        return Err(LsmError::Corruption(format!(
            "block [{}, +{}) past end of table ({} B)",
            off,
            len,
            r.size()
        ))
        .into());
    }
    let mut buf = vec![0u8; len as usize];
    r.read_at(cancel, &mut buf, off)?;
    decode_block(&buf)
}

impl Table {
    pub fn open(provider: Arc<dyn Provider>, cache: Arc<BlockCache>, file_num: u64) -> Result<Self> {
        let name = table_object_name(file_num);
        let readable = provider
            .open(&name)
            .with_context(|| format!("open table {}", provider.path(&name)))?;
        let size = readable.size();
        if size < TABLE_FOOTER_LEN as u64 {
            return Err(LsmError::Corruption(format!("table {} too short ({} B)", name, size)).into());
        }

        let cancel = CancelToken::new();
        let mut fb = [0u8; TABLE_FOOTER_LEN];
        readable.read_at(&cancel, &mut fb, size - TABLE_FOOTER_LEN as u64)?;
        let footer = Footer::decode(&fb).with_context(|| format!("table {}", name))?;

        let r = readable.as_ref();
        let index = decode_index(&read_raw(r, &cancel, footer.index)?)
            .with_context(|| format!("index of {}", name))?;
        let tombstones = decode_tombstones(&read_raw(r, &cancel, footer.range_del)?)
            .with_context(|| format!("range-del block of {}", name))?;
        let bloom = BloomFilter::decode(&read_raw(r, &cancel, footer.bloom)?)
            .with_context(|| format!("bloom of {}", name))?;
        let props = Props::decode(&read_raw(r, &cancel, footer.props)?)
            .with_context(|| format!("props of {}", name))?;

        let mut smallest: Option<&[u8]> = index.first().map(|e| e.first.as_slice());
        let mut largest: Option<&[u8]> = index.last().map(|e| e.last.as_slice());
        for t in &tombstones {
            smallest = Some(smallest.map_or(t.start.as_slice(), |s| s.min(t.start.as_slice())));
            largest = Some(largest.map_or(t.end.as_slice(), |l| l.max(t.end.as_slice())));
        }
        let smallest = smallest.unwrap_or_default().to_vec();
        let largest = largest.unwrap_or_default().to_vec();

        debug!(
            "table {} opened: {} B, {} blocks, {} entries, {} range-dels, seq=[{}, {}]",
            name,
            size,
            index.len(),
            props.num_entries,
            props.num_range_dels,
            props.smallest_seq,
            props.largest_seq
        );

        Ok(Self {
            file_num,
            provider,
            readable,
            cache,
            index,
            tombstones,
            bloom,
            props,
            smallest,
            largest,
            size,
            obsolete: AtomicBool::new(false),
        })
    }

    pub fn file_num(&self) -> u64 {
        self.file_num
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn largest_seq(&self) -> SeqNum {
        self.props.largest_seq
    }

    pub fn smallest_key(&self) -> &[u8] {
        &self.smallest
    }

    /// Largest point key or tombstone end (treated as inclusive for overlap checks).
    pub fn largest_key(&self) -> &[u8] {
        &self.largest
    }

    pub fn range_tombstones(&self) -> &[RangeTombstone] {
        &self.tombstones
    }

    /// Key span intersects [start, end).
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        self.smallest.as_slice() < end && start <= self.largest.as_slice()
    }

    pub fn overlaps_table(&self, other: &Table) -> bool {
        self.smallest <= other.largest && other.smallest <= self.largest
    }

    /// The object is deleted once the last reference to this table drops.
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    fn read_block(&self, idx: usize, cancel: &CancelToken) -> Result<Arc<Block>> {
        let key = (self.file_num, idx as u32);
        if let Some(b) = self.cache.get(key) {
            return Ok(b);
        }
        let raw = read_raw(self.readable.as_ref(), cancel, (self.index[idx].off, self.index[idx].len))
            .with_context(|| format!("data block {} of table {}", idx, self.file_num))?;
        let block = Arc::new(Block {
            entries: decode_entries(&raw)?,
        });
        self.cache.put(key, block.clone());
        Ok(block)
    }

    /// Versions of the user key starting at `pos` in `block`.
    fn group_at(block: &Block, pos: usize) -> (Vec<u8>, Vec<Entry>) {
        let user = block.entries[pos].0.user_key.clone();
        let vs = block.entries[pos..]
            .iter()
            .take_while(|(k, _)| k.user_key == user)
            .map(|(k, v)| Entry {
                seq: k.seq,
                kind: k.kind,
                value: v.clone(),
            })
            .collect();
        (user, vs)
    }

    /// All versions of `key`, newest first.
    pub fn versions(&self, key: &[u8], cancel: &CancelToken) -> Result<Vec<Entry>> {
        if let Some(b) = &self.bloom {
            if !b.may_contain(key) {
                record_bloom_skip();
                return Ok(Vec::new());
            }
        }
        let idx = self.index.partition_point(|e| e.last.as_slice() < key);
        if idx == self.index.len() || self.index[idx].first.as_slice() > key {
            return Ok(Vec::new());
        }
        let block = self.read_block(idx, cancel)?;
        let pos = block.entries.partition_point(|(k, _)| k.user_key.as_slice() < key);
        if pos == block.entries.len() || block.entries[pos].0.user_key != key {
            return Ok(Vec::new());
        }
        Ok(Self::group_at(&block, pos).1)
    }

    /// First user key at or after `from` together with its versions.
    pub fn next_versions(&self, from: Bound<&[u8]>, cancel: &CancelToken) -> Result<Option<(Vec<u8>, Vec<Entry>)>> {
        let idx = match from {
            Bound::Unbounded => 0,
            Bound::Included(k) => self.index.partition_point(|e| e.last.as_slice() < k),
            Bound::Excluded(k) => self.index.partition_point(|e| e.last.as_slice() <= k),
        };
        if idx >= self.index.len() {
            return Ok(None);
        }
        let block = self.read_block(idx, cancel)?;
        let pos = match from {
            Bound::Unbounded => 0,
            Bound::Included(k) => block.entries.partition_point(|(ik, _)| ik.user_key.as_slice() < k),
            Bound::Excluded(k) => block.entries.partition_point(|(ik, _)| ik.user_key.as_slice() <= k),
        };
        if pos >= block.entries.len() {
            return Err(LsmError::Corruption(format!(
                "table {}: block {} disagrees with its index entry",
                self.file_num, idx
            ))
            .into());
        }
        Ok(Some(Self::group_at(&block, pos)))
    }

    /// Last user key at or before `from` together with its versions.
    pub fn prev_versions(&self, from: Bound<&[u8]>, cancel: &CancelToken) -> Result<Option<(Vec<u8>, Vec<Entry>)>> {
        let idx = match from {
            Bound::Unbounded => self.index.len(),
            Bound::Included(k) => self.index.partition_point(|e| e.first.as_slice() <= k),
            Bound::Excluded(k) => self.index.partition_point(|e| e.first.as_slice() < k),
        };
        if idx == 0 {
            return Ok(None);
        }
        let block = self.read_block(idx - 1, cancel)?;
        let end = match from {
            Bound::Unbounded => block.entries.len(),
            Bound::Included(k) => block.entries.partition_point(|(ik, _)| ik.user_key.as_slice() <= k),
            Bound::Excluded(k) => block.entries.partition_point(|(ik, _)| ik.user_key.as_slice() < k),
        };
        if end == 0 {
            return Err(LsmError::Corruption(format!(
                "table {}: block {} disagrees with its index entry",
                self.file_num,
                idx - 1
            ))
            .into());
        }
        let user = block.entries[end - 1].0.user_key.as_slice();
        let start = block.entries[..end].partition_point(|(ik, _)| ik.user_key.as_slice() < user);
        Ok(Some(Self::group_at(&block, start)))
    }

    /// Sequential scan yielding one user key (with all its versions) per item.
    pub fn scan<'a>(&'a self, cancel: &'a CancelToken) -> TableScan<'a> {
        TableScan {
            table: self,
            cancel,
            block_idx: 0,
            block: None,
            pos: 0,
        }
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if !self.obsolete.load(Ordering::Acquire) {
            return;
        }
        self.cache.evict_file(self.file_num);
        let name = table_object_name(self.file_num);
        match self.provider.remove(&name) {
            Ok(()) => debug!("table {}: obsolete object removed", name),
            Err(e) => warn!("table {}: failed to remove obsolete object: {:#}", name, e),
        }
    }
}

pub struct TableScan<'a> {
    table: &'a Table,
    cancel: &'a CancelToken,
    block_idx: usize,
    block: Option<Arc<Block>>,
    pos: usize,
}

impl Iterator for TableScan<'_> {
    type Item = Result<(Vec<u8>, Vec<Entry>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(b) = &self.block {
                if self.pos < b.entries.len() {
                    let (user, vs) = Table::group_at(b, self.pos);
                    self.pos += vs.len();
                    return Some(Ok((user, vs)));
                }
                self.block = None;
                self.block_idx += 1;
                self.pos = 0;
            }
            if self.block_idx >= self.table.index.len() {
                return None;
            }
            match self.table.read_block(self.block_idx, self.cancel) {
                Ok(b) => self.block = Some(b),
                Err(e) => {
                    self.block_idx = self.table.index.len();
                    return Some(Err(e));
                }
            }
        }
    }
}
