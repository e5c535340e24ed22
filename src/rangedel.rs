//! Range tombstones and their fragmented, horizon-filtered view.
//!
//! Tombstones overlap freely when written. For reads they are split at every
//! start/end boundary into non-overlapping spans; each span keeps only the
//! greatest sequence number visible at the reader horizon, which is all the
//! visibility rule needs. Lookup is a binary search.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use crate::keys::SeqNum;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTombstone {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub seq: SeqNum,
}

impl RangeTombstone {
    pub fn new(start: &[u8], end: &[u8], seq: SeqNum) -> Self {
        Self {
            start: start.to_vec(),
            end: end.to_vec(),
            seq,
        }
    }

    #[inline]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.start.as_slice() <= key && key < self.end.as_slice()
    }

    #[inline]
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        self.start.as_slice() < end && start < self.end.as_slice()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fragment {
    start: Vec<u8>,
    end: Vec<u8>,
    seq: SeqNum,
}

#[derive(Debug, Clone, Default)]
pub struct Fragments {
    frags: Vec<Fragment>,
}

impl Fragments {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fragment all tombstones with `seq <= horizon`.
    pub fn build<'a, I>(tombstones: I, horizon: SeqNum) -> Self
    where
        I: IntoIterator<Item = &'a RangeTombstone>,
    {
        let mut ts: Vec<&RangeTombstone> = tombstones
            .into_iter()
            .filter(|t| t.seq <= horizon && t.start < t.end)
            .collect();
        if ts.is_empty() {
            return Self::empty();
        }
        ts.sort_by(|a, b| a.start.cmp(&b.start));

        let mut bounds: Vec<&[u8]> = Vec::with_capacity(ts.len() * 2);
        for t in &ts {
            bounds.push(t.start.as_slice());
            bounds.push(t.end.as_slice());
        }
        bounds.sort();
        bounds.dedup();

        // Sweep: active multiset of seqs, min-heap of (end, seq) for expiry.
        let mut frags = Vec::new();
        let mut active: BTreeMap<SeqNum, usize> = BTreeMap::new();
        let mut expiry: BinaryHeap<Reverse<(&[u8], SeqNum)>> = BinaryHeap::new();
        let mut next = 0usize;

        for w in bounds.windows(2) {
            let (lo, hi) = (w[0], w[1]);
            while let Some(Reverse((end, seq))) = expiry.peek().copied() {
                if end > lo {
                    break;
                }
                expiry.pop();
                if let Some(c) = active.get_mut(&seq) {
                    *c -= 1;
                    if *c == 0 {
                        active.remove(&seq);
                    }
                }
            }
            while next < ts.len() && ts[next].start.as_slice() <= lo {
                let t = ts[next];
                *active.entry(t.seq).or_insert(0) += 1;
                expiry.push(Reverse((t.end.as_slice(), t.seq)));
                next += 1;
            }
            if let Some((&max_seq, _)) = active.iter().next_back() {
                frags.push(Fragment {
                    start: lo.to_vec(),
                    end: hi.to_vec(),
                    seq: max_seq,
                });
            }
        }

        Self { frags }
    }

    /// Greatest visible tombstone sequence number covering `key`.
    pub fn covering_seq(&self, key: &[u8]) -> Option<SeqNum> {
        let idx = self.frags.partition_point(|f| f.start.as_slice() <= key);
        if idx == 0 {
            return None;
        }
        let f = &self.frags[idx - 1];
        if key < f.end.as_slice() {
            Some(f.seq)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frags.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_tombstones_keep_max_seq() {
        let ts = vec![
            RangeTombstone::new(b"a", b"m", 5),
            RangeTombstone::new(b"f", b"z", 9),
            RangeTombstone::new(b"c", b"d", 12),
        ];
        let fr = Fragments::build(&ts, u64::MAX);
        assert_eq!(fr.covering_seq(b"a"), Some(5));
        assert_eq!(fr.covering_seq(b"c"), Some(12));
        assert_eq!(fr.covering_seq(b"d"), Some(5));
        assert_eq!(fr.covering_seq(b"g"), Some(9));
        assert_eq!(fr.covering_seq(b"m"), Some(9));
        assert_eq!(fr.covering_seq(b"z"), None);
        assert_eq!(fr.covering_seq(b"0"), None);
    }

    #[test]
    fn horizon_hides_newer_tombstones() {
        let ts = vec![
            RangeTombstone::new(b"a", b"m", 5),
            RangeTombstone::new(b"c", b"d", 12),
        ];
        let fr = Fragments::build(&ts, 10);
        assert_eq!(fr.covering_seq(b"c"), Some(5));
        let fr = Fragments::build(&ts, 4);
        assert!(fr.is_empty());
        assert_eq!(fr.covering_seq(b"c"), None);
    }

    #[test]
    fn gaps_between_tombstones_are_uncovered() {
        let ts = vec![
            RangeTombstone::new(b"a", b"b", 1),
            RangeTombstone::new(b"x", b"y", 2),
        ];
        let fr = Fragments::build(&ts, 100);
        assert_eq!(fr.covering_seq(b"b"), None);
        assert_eq!(fr.covering_seq(b"k"), None);
        assert_eq!(fr.covering_seq(b"x"), Some(2));
    }
}
