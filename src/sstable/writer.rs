//! Sorted table writer.
//!
//! Entries must arrive in InternalKey order. A data block is cut only when the
//! user key changes, so all versions of one user key live in a single block.

use anyhow::{Context, Result};

use crate::config::{Codec, LsmConfig};
use crate::error::LsmError;
use crate::keys::{InternalKey, SeqNum, SEQ_MAX};
use crate::objstorage::Writable;
use crate::rangedel::RangeTombstone;

use super::bloom::BloomBuilder;
use super::format::{
    encode_block, put_entry, put_index_entry, put_tombstone, Footer, Handle, IndexEntry, Props,
};

#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub block_size: usize,
    pub codec: Codec,
    pub zstd_level: i32,
    pub bloom_bits_per_key: usize,
}

impl WriterOptions {
    pub fn from_config(cfg: &LsmConfig) -> Self {
        Self {
            block_size: cfg.block_size,
            codec: cfg.compression,
            zstd_level: cfg.zstd_level,
            bloom_bits_per_key: cfg.bloom_bits_per_key,
        }
    }
}

pub struct TableWriter {
    w: Box<dyn Writable>,
    opts: WriterOptions,
    offset: u64,

    block: Vec<u8>,
    block_first: Option<Vec<u8>>,
    block_last: Vec<u8>,

    index: Vec<IndexEntry>,
    tombstones: Vec<RangeTombstone>,
    bloom: BloomBuilder,
    last_key: Option<InternalKey>,

    smallest_seq: SeqNum,
    largest_seq: SeqNum,
    num_entries: u64,
}

impl TableWriter {
    pub fn new(w: Box<dyn Writable>, opts: WriterOptions) -> Self {
        Self {
            w,
            opts,
            offset: 0,
            block: Vec::with_capacity(opts.block_size + opts.block_size / 4),
            block_first: None,
            block_last: Vec::new(),
            index: Vec::new(),
            tombstones: Vec::new(),
            bloom: BloomBuilder::default(),
            last_key: None,
            smallest_seq: SEQ_MAX,
            largest_seq: 0,
            num_entries: 0,
        }
    }

    pub fn add(&mut self, key: &InternalKey, value: &[u8]) -> Result<()> {
        let new_user_key = match &self.last_key {
            Some(prev) => {
                if prev >= key {
                    return Err(LsmError::Corruption(format!(
                        "table writer: key {:?}@{} added after {:?}@{}",
                        String::from_utf8_lossy(&key.user_key),
                        key.seq,
                        String::from_utf8_lossy(&prev.user_key),
                        prev.seq
                    ))
                    .into());
                }
                prev.user_key != key.user_key
            }
            None => true,
        };

        if new_user_key {
            if !self.block.is_empty() && self.block.len() >= self.opts.block_size {
                self.flush_block()?;
            }
            self.bloom.add(&key.user_key);
        }

        if self.block_first.is_none() {
            self.block_first = Some(key.user_key.clone());
        }
        if new_user_key {
            self.block_last = key.user_key.clone();
        }
        put_entry(&mut self.block, key, value);

        self.smallest_seq = self.smallest_seq.min(key.seq);
        self.largest_seq = self.largest_seq.max(key.seq);
        self.num_entries += 1;
        self.last_key = Some(key.clone());
        Ok(())
    }

    pub fn add_range_tombstone(&mut self, t: &RangeTombstone) {
        self.smallest_seq = self.smallest_seq.min(t.seq);
        self.largest_seq = self.largest_seq.max(t.seq);
        self.tombstones.push(t.clone());
    }

    /// Bytes written so far plus the pending block.
    pub fn estimated_size(&self) -> u64 {
        self.offset + self.block.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0 && self.tombstones.is_empty()
    }

    fn write_block(&mut self, raw: &[u8]) -> Result<Handle> {
        let blk = encode_block(raw, self.opts.codec, self.opts.zstd_level)?;
        self.w.write(&blk)?;
        let h = (self.offset, blk.len() as u64);
        self.offset += blk.len() as u64;
        Ok(h)
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let raw = std::mem::take(&mut self.block);
        let (off, len) = self.write_block(&raw)?;
        self.index.push(IndexEntry {
            off,
            len,
            first: self.block_first.take().unwrap_or_default(),
            last: std::mem::take(&mut self.block_last),
        });
        self.block = raw;
        self.block.clear();
        Ok(())
    }

    /// Write the trailing blocks and footer, then publish the object.
    /// Returns the object size in bytes.
    pub fn finish(mut self) -> Result<u64> {
        if let Err(e) = self.write_tail() {
            self.w.abort();
            return Err(e);
        }
        let size = self.offset;
        self.w.finish().context("finish table object")?;
        Ok(size)
    }

    fn write_tail(&mut self) -> Result<()> {
        self.flush_block()?;

        self.tombstones
            .sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.seq.cmp(&a.seq)));
        let mut raw = Vec::new();
        for t in &self.tombstones {
            put_tombstone(&mut raw, t);
        }
        let range_del = self.write_block(&raw)?;

        let bloom_raw = std::mem::take(&mut self.bloom).finish(self.opts.bloom_bits_per_key);
        let bloom = self.write_block(&bloom_raw)?;

        let props = Props {
            smallest_seq: if self.smallest_seq == SEQ_MAX && self.largest_seq == 0 {
                0
            } else {
                self.smallest_seq
            },
            largest_seq: self.largest_seq,
            num_entries: self.num_entries,
            num_range_dels: self.tombstones.len() as u64,
        };
        let props = self.write_block(&props.encode())?;

        let mut raw = Vec::new();
        for e in &self.index {
            put_index_entry(&mut raw, e);
        }
        let index = self.write_block(&raw)?;

        let footer = Footer {
            index,
            range_del,
            bloom,
            props,
        };
        self.w.write(&footer.encode())?;
        self.offset += footer.encode().len() as u64;
        Ok(())
    }

    pub fn abort(self) {
        self.w.abort();
    }
}
