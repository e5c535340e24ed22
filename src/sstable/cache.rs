//! O(1) LRU cache for decoded table blocks.
//!
//! Design:
//! - HashMap<BlockKey, Entry> stores the block and doubly-linked pointers (prev/next by key).
//! - head = MRU, tail = LRU.
//! - get() moves the node to head and hands out a shared Arc<Block>.
//! - put() updates existing (move to head) or inserts a new head, evicting tail if over capacity.
//!
//! Notes:
//! - Shared by all tables of one Db behind a Mutex; blocks are immutable.
//! - Capacity=0 disables the cache (no-op).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::keys::InternalKey;
use crate::metrics::{record_block_cache_hit, record_block_cache_miss};

/// Decoded data block: internal keys in order with their values.
#[derive(Debug)]
pub struct Block {
    pub entries: Vec<(InternalKey, Vec<u8>)>,
}

/// (file_num, block index)
pub(crate) type BlockKey = (u64, u32);

struct Entry {
    block: Arc<Block>,
    prev: Option<BlockKey>,
    next: Option<BlockKey>,
}

struct Lru {
    cap: usize,
    map: HashMap<BlockKey, Entry>,
    head: Option<BlockKey>, // Most-recently used
    tail: Option<BlockKey>, // Least-recently used
}

pub struct BlockCache {
    inner: Mutex<Lru>,
}

impl BlockCache {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Lru {
                cap,
                map: HashMap::with_capacity(cap.min(4096).max(1)),
                head: None,
                tail: None,
            }),
        }
    }

    pub(crate) fn get(&self, key: BlockKey) -> Option<Arc<Block>> {
        let mut lru = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let hit = lru.get(key);
        if hit.is_some() {
            record_block_cache_hit();
        } else {
            record_block_cache_miss();
        }
        hit
    }

    pub(crate) fn put(&self, key: BlockKey, block: Arc<Block>) {
        let mut lru = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        lru.put(key, block);
    }

    /// Drop every cached block of a removed table.
    pub(crate) fn evict_file(&self, file_num: u64) {
        let mut lru = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let victims: Vec<BlockKey> = lru.map.keys().filter(|k| k.0 == file_num).copied().collect();
        for k in victims {
            lru.detach(k);
            lru.map.remove(&k);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Lru {
    fn get(&mut self, key: BlockKey) -> Option<Arc<Block>> {
        if self.cap == 0 {
            return None;
        }
        let block = self.map.get(&key)?.block.clone();
        self.detach(key);
        self.attach_front(key);
        Some(block)
    }

    fn put(&mut self, key: BlockKey, block: Arc<Block>) {
        if self.cap == 0 {
            return;
        }

        if let Some(e) = self.map.get_mut(&key) {
            e.block = block;
            self.detach(key);
            self.attach_front(key);
            return;
        }

        // Evict LRU if full.
        if self.map.len() >= self.cap {
            if let Some(victim) = self.tail {
                self.detach(victim);
                self.map.remove(&victim);
            }
        }

        self.map.insert(
            key,
            Entry {
                block,
                prev: None,
                next: None,
            },
        );
        self.attach_front(key);
    }

    // ---------------- internal helpers ----------------

    fn detach(&mut self, key: BlockKey) {
        let (prev, next) = match self.map.get(&key) {
            Some(e) => (e.prev, e.next),
            None => return,
        };

        if self.head == Some(key) {
            self.head = next;
        }
        if self.tail == Some(key) {
            self.tail = prev;
        }

        if let Some(p) = prev {
            if let Some(pe) = self.map.get_mut(&p) {
                pe.next = next;
            }
        }
        if let Some(n) = next {
            if let Some(ne) = self.map.get_mut(&n) {
                ne.prev = prev;
            }
        }

        if let Some(e) = self.map.get_mut(&key) {
            e.prev = None;
            e.next = None;
        }
    }

    fn attach_front(&mut self, key: BlockKey) {
        if self.head == Some(key) {
            return;
        }
        let old_head = self.head;
        if let Some(e) = self.map.get_mut(&key) {
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(he) = self.map.get_mut(&h) {
                he.prev = Some(key);
            }
        }
        self.head = Some(key);
        if self.tail.is_none() {
            self.tail = Some(key);
        }
    }
}
