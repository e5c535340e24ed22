//! Ordered registry of open snapshot sequence numbers.
//!
//! Design:
//! - Slots live in a Vec; a released slot goes to a free list and its
//!   generation is bumped, so a stale SnapshotId never aliases a new record.
//! - Live slots form a doubly-linked list (prev/next by slot index), head = oldest.
//! - push_back / remove / oldest are O(1); insert_ordered walks from the tail.
//!
//! Not synchronized: the engine keeps it under its commit mutex.

use anyhow::Result;

use crate::error::LsmError;
use crate::keys::SeqNum;

/// Stable handle to a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    seq: SeqNum,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>, // oldest
    tail: Option<u32>, // newest
    len: usize,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Smallest registered sequence number.
    pub fn oldest(&self) -> Option<SeqNum> {
        self.head.and_then(|i| self.node(i)).map(|n| n.seq)
    }

    /// Largest registered sequence number.
    pub fn newest(&self) -> Option<SeqNum> {
        self.tail.and_then(|i| self.node(i)).map(|n| n.seq)
    }

    /// Append at the tail. `seq` must be >= every registered seq.
    pub fn push_back(&mut self, seq: SeqNum) -> SnapshotId {
        debug_assert!(self.newest().map_or(true, |t| t <= seq), "push_back out of order");
        let tail = self.tail;
        self.link_after(tail, seq)
    }

    /// Insert keeping ascending order; equal seqs go after existing ones.
    pub fn insert_ordered(&mut self, seq: SeqNum) -> SnapshotId {
        let mut after = self.tail;
        while let Some(i) = after {
            match self.node(i) {
                Some(n) if n.seq > seq => after = n.prev,
                _ => break,
            }
        }
        self.link_after(after, seq)
    }

    /// Unlink a record and return its seq. A stale or unknown id is NotRegistered.
    pub fn remove(&mut self, id: SnapshotId) -> Result<SeqNum> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .ok_or(LsmError::NotRegistered)?;
        let node = slot.node.take().ok_or(LsmError::NotRegistered)?;
        slot.generation = slot.generation.wrapping_add(1);

        match node.prev {
            Some(p) => self.node_mut(p).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.node_mut(n).prev = node.prev,
            None => self.tail = node.prev,
        }

        self.free.push(id.index);
        self.len -= 1;
        Ok(node.seq)
    }

    /// Registered seqs, oldest first.
    pub fn to_vec(&self) -> Vec<SeqNum> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.head;
        while let Some(i) = cur {
            match self.node(i) {
                Some(n) => {
                    out.push(n.seq);
                    cur = n.next;
                }
                None => break,
            }
        }
        out
    }

    // ---------------- internal helpers ----------------

    fn node(&self, index: u32) -> Option<&Node> {
        self.slots.get(index as usize).and_then(|s| s.node.as_ref())
    }

    // Only called with indices taken from live links.
    fn node_mut(&mut self, index: u32) -> &mut Node {
        match self.slots[index as usize].node.as_mut() {
            Some(n) => n,
            None => unreachable!("registry link points at a free slot"),
        }
    }

    /// Allocate a slot for `seq` and link it after `after` (None = new head).
    fn link_after(&mut self, after: Option<u32>, seq: SeqNum) -> SnapshotId {
        let next = match after {
            Some(a) => self.node_mut(a).next,
            None => self.head,
        };
        let node = Node { seq, prev: after, next };

        let index = match self.free.pop() {
            Some(i) => {
                self.slots[i as usize].node = Some(node);
                i
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        };

        match after {
            Some(a) => self.node_mut(a).next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(n) => self.node_mut(n).prev = Some(index),
            None => self.tail = Some(index),
        }

        self.len += 1;
        SnapshotId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }
}
