//! Sequence numbers, mutation kinds and internal keys.
//!
//! Internal key order: user key ascending, then sequence number descending,
//! then kind descending. All versions of one user key are therefore adjacent,
//! newest first.

use std::cmp::Ordering;

use anyhow::Result;

use crate::error::LsmError;

pub type SeqNum = u64;

/// Sequence numbers fit in 56 bits (trailer = seq << 8 | kind).
pub const SEQ_MAX: SeqNum = (1 << 56) - 1;

/// Reserved: never assigned to a mutation.
pub const SEQ_ZERO: SeqNum = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Kind {
    Delete = 0,
    Set = 1,
    Merge = 2,
    RangeDelete = 15,
}

impl Kind {
    pub const MIN: Kind = Kind::Delete;
    pub const MAX: Kind = Kind::RangeDelete;

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Kind::Delete),
            1 => Some(Kind::Set),
            2 => Some(Kind::Merge),
            15 => Some(Kind::RangeDelete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    pub user_key: Vec<u8>,
    pub seq: SeqNum,
    pub kind: Kind,
}

impl InternalKey {
    pub fn new(user_key: &[u8], seq: SeqNum, kind: Kind) -> Self {
        Self {
            user_key: user_key.to_vec(),
            seq,
            kind,
        }
    }

    /// Smallest internal key for `user_key` (sorts before all its versions).
    pub fn seek_first(user_key: &[u8]) -> Self {
        Self::new(user_key, SEQ_MAX, Kind::MAX)
    }

    /// Largest internal key for `user_key` (sorts after all its versions).
    pub fn seek_last(user_key: &[u8]) -> Self {
        Self::new(user_key, SEQ_ZERO, Kind::MIN)
    }

    #[inline]
    pub fn trailer(&self) -> u64 {
        encode_trailer(self.seq, self.kind)
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| other.kind.cmp(&self.kind))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
pub fn encode_trailer(seq: SeqNum, kind: Kind) -> u64 {
    (seq << 8) | kind.to_u8() as u64
}

pub fn decode_trailer(trailer: u64) -> Result<(SeqNum, Kind)> {
    let kind = Kind::from_u8((trailer & 0xFF) as u8)
        .ok_or_else(|| LsmError::Corruption(format!("unknown kind in trailer {:#x}", trailer)))?;
    Ok((trailer >> 8, kind))
}

/// One version of a user key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub seq: SeqNum,
    pub kind: Kind,
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_sort_newest_first() {
        let mut keys = vec![
            InternalKey::new(b"b", 3, Kind::Set),
            InternalKey::new(b"a", 1, Kind::Set),
            InternalKey::new(b"a", 7, Kind::Delete),
            InternalKey::new(b"a", 4, Kind::Merge),
        ];
        keys.sort();
        let got: Vec<(&[u8], SeqNum)> = keys.iter().map(|k| (k.user_key.as_slice(), k.seq)).collect();
        assert_eq!(got, vec![(&b"a"[..], 7), (&b"a"[..], 4), (&b"a"[..], 1), (&b"b"[..], 3)]);
    }

    #[test]
    fn seek_bounds_bracket_all_versions() {
        let v = InternalKey::new(b"k", 42, Kind::Set);
        assert!(InternalKey::seek_first(b"k") < v);
        assert!(v < InternalKey::seek_last(b"k"));
        assert!(InternalKey::seek_last(b"j") < InternalKey::seek_first(b"k"));
    }

    #[test]
    fn trailer_decodes_back() {
        let t = encode_trailer(12345, Kind::Merge);
        assert_eq!(decode_trailer(t).unwrap(), (12345, Kind::Merge));
        assert!(decode_trailer(0x07).is_err());
    }
}
