//! Visibility rule: pick the single correct result for one user key at a
//! reader horizon.
//!
//! Inputs are the key's versions (any order, any source) and the greatest
//! range tombstone sequence number covering the key at the horizon. The same
//! function serves point lookups, iteration and compaction folding.

use anyhow::Result;

use crate::keys::{Entry, Kind, SeqNum};
use crate::merge::{fold_operands, Merger};

/// Resolve `versions` at `horizon`. `Ok(None)` means absent or deleted.
///
/// `versions` must be sorted by sequence number descending.
pub fn resolve(
    merger: &dyn Merger,
    key: &[u8],
    versions: &[Entry],
    tombstone: Option<SeqNum>,
    horizon: SeqNum,
) -> Result<Option<Vec<u8>>> {
    let masked_at = tombstone.filter(|&t| t <= horizon);
    let mut operands: Vec<&[u8]> = Vec::new();

    for v in versions.iter().filter(|v| v.seq <= horizon) {
        if let Some(t) = masked_at {
            if t >= v.seq {
                break;
            }
        }
        match v.kind {
            Kind::Set => {
                if operands.is_empty() {
                    return Ok(Some(v.value.clone()));
                }
                return fold_operands(merger, key, Some(v.value.as_slice()), &operands).map(Some);
            }
            Kind::Delete => {
                if operands.is_empty() {
                    return Ok(None);
                }
                return fold_operands(merger, key, None, &operands).map(Some);
            }
            Kind::Merge => operands.push(v.value.as_slice()),
            // Range deletions live in Fragments, never as point versions.
            Kind::RangeDelete => {}
        }
    }

    if operands.is_empty() {
        Ok(None)
    } else {
        fold_operands(merger, key, None, &operands).map(Some)
    }
}

/// Sort versions gathered from several sources newest first, dropping exact duplicates.
pub fn normalize(versions: &mut Vec<Entry>) {
    versions.sort_by(|a, b| b.seq.cmp(&a.seq).then_with(|| b.kind.cmp(&a.kind)));
    versions.dedup_by(|a, b| a.seq == b.seq && a.kind == b.kind);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConcatMerger;

    fn e(seq: SeqNum, kind: Kind, v: &[u8]) -> Entry {
        Entry {
            seq,
            kind,
            value: v.to_vec(),
        }
    }

    #[test]
    fn tombstone_over_older_version() {
        // version at V=3, tombstone at T=7
        let m = ConcatMerger;
        let vs = vec![e(3, Kind::Set, b"v")];
        for h in 7..10 {
            assert_eq!(resolve(&m, b"k", &vs, Some(7), h).unwrap(), None, "H={h}");
        }
        for h in 3..7 {
            assert_eq!(resolve(&m, b"k", &vs, Some(7), h).unwrap(), Some(b"v".to_vec()), "H={h}");
        }
        for h in 0..3 {
            assert_eq!(resolve(&m, b"k", &vs, Some(7), h).unwrap(), None, "H={h}");
        }
    }

    #[test]
    fn newer_version_survives_older_tombstone() {
        let m = ConcatMerger;
        let vs = vec![e(9, Kind::Set, b"new"), e(2, Kind::Set, b"old")];
        assert_eq!(resolve(&m, b"k", &vs, Some(5), 10).unwrap(), Some(b"new".to_vec()));
        assert_eq!(resolve(&m, b"k", &vs, Some(5), 6).unwrap(), None);
    }

    #[test]
    fn merges_fold_down_to_set() {
        let m = ConcatMerger;
        let vs = vec![
            e(5, Kind::Merge, b"c"),
            e(4, Kind::Merge, b"b"),
            e(3, Kind::Set, b"a"),
            e(1, Kind::Set, b"zzz"),
        ];
        assert_eq!(resolve(&m, b"k", &vs, None, 10).unwrap(), Some(b"abc".to_vec()));
        assert_eq!(resolve(&m, b"k", &vs, None, 4).unwrap(), Some(b"ab".to_vec()));
    }

    #[test]
    fn merges_stop_at_delete_and_tombstone() {
        let m = ConcatMerger;
        let vs = vec![e(5, Kind::Merge, b"x"), e(3, Kind::Delete, b""), e(1, Kind::Set, b"a")];
        assert_eq!(resolve(&m, b"k", &vs, None, 10).unwrap(), Some(b"x".to_vec()));

        let vs = vec![e(5, Kind::Merge, b"x"), e(1, Kind::Set, b"a")];
        assert_eq!(resolve(&m, b"k", &vs, Some(3), 10).unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn point_delete_hides_key() {
        let m = ConcatMerger;
        let vs = vec![e(4, Kind::Delete, b""), e(2, Kind::Set, b"a")];
        assert_eq!(resolve(&m, b"k", &vs, None, 4).unwrap(), None);
        assert_eq!(resolve(&m, b"k", &vs, None, 3).unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn normalize_orders_and_dedups() {
        let mut vs = vec![e(1, Kind::Set, b"a"), e(5, Kind::Set, b"b"), e(1, Kind::Set, b"a")];
        normalize(&mut vs);
        assert_eq!(vs.iter().map(|v| v.seq).collect::<Vec<_>>(), vec![5, 1]);
    }
}
