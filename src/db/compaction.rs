//! db/compaction - перезапись таблиц с учётом GC-горизонта.
//!
//! Горизонт G берётся под DbState-мьютексом вместе с выбором входных таблиц.
//! Правила для каждого пользовательского ключа:
//! - версии с seq >= G переносятся как есть;
//! - версии с seq < G, замаскированные range-tombstone с seq < G, удаляются,
//!   остальные сворачиваются максимум в одну запись (Set, либо свёрнутый Merge
//!   как Set, либо ничего, если ключ удалён);
//! - range-tombstones с seq < G удаляются.
//! Набор входных таблиц замкнут по пересечению диапазонов ключей, поэтому всё,
//! что затеняет удаляемый tombstone, переписывается в той же компакции.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::LsmError;
use crate::keys::{Entry, InternalKey, Kind, SeqNum};
use crate::merge::Merger;
use crate::metrics::record_compaction;
use crate::objstorage::table_object_name;
use crate::rangedel::{Fragments, RangeTombstone};
use crate::sstable::{Table, TableScan, TableWriter, WriterOptions};
use crate::visibility::{normalize, resolve};

use super::core::{lock, Db, DbInner, VersionEdit};
use super::gc::GcHorizon;

#[derive(Debug, Clone, Serialize)]
pub struct CompactReport {
    pub horizon: GcHorizon,
    pub inputs: Vec<u64>,
    pub outputs: Vec<u64>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub entries_in: u64,
    pub entries_out: u64,
    pub versions_dropped: u64,
    pub tombstones_in: u64,
    pub tombstones_dropped: u64,
}

impl CompactReport {
    fn new(horizon: GcHorizon) -> Self {
        Self {
            horizon,
            inputs: Vec::new(),
            outputs: Vec::new(),
            bytes_in: 0,
            bytes_out: 0,
            entries_in: 0,
            entries_out: 0,
            versions_dropped: 0,
            tombstones_in: 0,
            tombstones_dropped: 0,
        }
    }
}

/// Rewrite the versions of one key (newest first) against GC limit `g`.
/// `covering_below` is the greatest covering tombstone seq below `g`.
pub(crate) fn gc_key_versions(
    merger: &dyn Merger,
    key: &[u8],
    mut versions: Vec<Entry>,
    g: SeqNum,
    covering_below: Option<SeqNum>,
) -> Result<Vec<Entry>> {
    let split = versions.partition_point(|e| e.seq >= g);
    let below = versions.split_off(split);
    let Some(newest_below) = below.first().map(|e| e.seq) else {
        return Ok(versions);
    };
    if let Some(value) = resolve(merger, key, &below, covering_below, g - 1)? {
        versions.push(Entry {
            seq: newest_below,
            kind: Kind::Set,
            value,
        });
    }
    Ok(versions)
}

/// Tables overlapping `range` (all when None), closed under key-range overlap.
fn pick_inputs(tables: &[Arc<Table>], range: Option<(&[u8], &[u8])>) -> Vec<Arc<Table>> {
    let mut picked: Vec<bool> = tables
        .iter()
        .map(|t| range.map_or(true, |(s, e)| t.overlaps(s, e)))
        .collect();
    loop {
        let mut grew = false;
        for i in 0..tables.len() {
            if picked[i] {
                continue;
            }
            if (0..tables.len()).any(|j| picked[j] && tables[i].overlaps_table(&tables[j])) {
                picked[i] = true;
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    tables
        .iter()
        .zip(picked)
        .filter(|(_, p)| *p)
        .map(|(t, _)| t.clone())
        .collect()
}

type Heads = Vec<Option<Vec<Entry>>>;
type KeyHeap = BinaryHeap<Reverse<(Vec<u8>, usize)>>;

fn advance(scans: &mut [TableScan<'_>], heads: &mut Heads, heap: &mut KeyHeap, i: usize) -> Result<()> {
    if let Some((k, vs)) = scans[i].next().transpose()? {
        heads[i] = Some(vs);
        heap.push(Reverse((k, i)));
    }
    Ok(())
}

/// Output tables cut at `target` bytes on key boundaries.
/// Dropped before `finish` → the open writer is aborted and finished
/// outputs are marked obsolete.
struct Outputs<'a> {
    db: &'a DbInner,
    opts: WriterOptions,
    target: u64,
    current: Option<(u64, TableWriter)>,
    done: Vec<Arc<Table>>,
}

impl<'a> Outputs<'a> {
    fn new(db: &'a DbInner) -> Self {
        Self {
            db,
            opts: WriterOptions::from_config(&db.cfg),
            target: db.cfg.target_file_size as u64,
            current: None,
            done: Vec::new(),
        }
    }

    fn writer(&mut self) -> Result<&mut TableWriter> {
        let cur = match self.current.take() {
            Some(c) => c,
            None => {
                let n = self.db.lock_state().alloc_file_num();
                let w = self.db.provider.create(&table_object_name(n))?;
                (n, TableWriter::new(w, self.opts))
            }
        };
        Ok(&mut self.current.insert(cur).1)
    }

    fn roll(&mut self) -> Result<()> {
        if let Some((n, w)) = self.current.take() {
            w.finish()?;
            let t = Table::open(self.db.provider.clone(), self.db.cache.clone(), n)?;
            self.done.push(Arc::new(t));
        }
        Ok(())
    }

    fn add_key(&mut self, key: &[u8], entries: &[Entry]) -> Result<()> {
        if let Some((_, w)) = &self.current {
            if w.estimated_size() >= self.target {
                self.roll()?;
            }
        }
        let w = self.writer()?;
        for e in entries {
            w.add(&InternalKey::new(key, e.seq, e.kind), &e.value)?;
        }
        Ok(())
    }

    fn finish(mut self, tombstones: &[RangeTombstone]) -> Result<Vec<Arc<Table>>> {
        if !tombstones.is_empty() {
            let w = self.writer()?;
            for t in tombstones {
                w.add_range_tombstone(t);
            }
        }
        self.roll()?;
        Ok(std::mem::take(&mut self.done))
    }
}

impl Drop for Outputs<'_> {
    fn drop(&mut self) {
        if let Some((_, w)) = self.current.take() {
            w.abort();
        }
        for t in &self.done {
            t.mark_obsolete();
        }
    }
}

impl DbInner {
    pub(crate) fn compact_range(&self, range: Option<(&[u8], &[u8])>) -> Result<CompactReport> {
        let _g = lock(&self.compact_mu);
        self.compact_locked(range)
    }

    /// Caller holds compact_mu.
    pub(crate) fn compact_locked(&self, range: Option<(&[u8], &[u8])>) -> Result<CompactReport> {
        let flush_needed = {
            let mut st = self.lock_state();
            let overlap = st.version.memtables().any(|m| match range {
                Some((s, e)) => m.overlaps(s, e),
                None => !m.is_empty(),
            });
            if overlap {
                st.rotate_memtable();
            }
            !st.version.imm.is_empty()
        };
        if flush_needed {
            self.flush_immutables().context("flush before compaction")?;
        }

        let (inputs, horizon) = {
            let st = self.lock_state();
            (
                pick_inputs(&st.version.tables, range),
                GcHorizon::from_registry(&st.snapshots),
            )
        };
        let mut report = CompactReport::new(horizon);
        if inputs.is_empty() {
            debug!("compaction: no tables in range");
            return Ok(report);
        }

        let g = horizon.limit();
        let merger = self.cfg.merger.as_ref();
        report.inputs = inputs.iter().map(|t| t.file_num()).collect();
        report.bytes_in = inputs.iter().map(|t| t.size()).sum();

        let all_ts: Vec<RangeTombstone> = inputs
            .iter()
            .flat_map(|t| t.range_tombstones().iter().cloned())
            .collect();
        let frags_below = Fragments::build(&all_ts, g.saturating_sub(1));
        let (kept_ts, dropped_ts): (Vec<RangeTombstone>, Vec<RangeTombstone>) =
            all_ts.into_iter().partition(|t| t.seq >= g);
        report.tombstones_in = (kept_ts.len() + dropped_ts.len()) as u64;
        report.tombstones_dropped = dropped_ts.len() as u64;

        let cancel = CancelToken::new();
        let mut scans: Vec<TableScan<'_>> = inputs.iter().map(|t| t.scan(&cancel)).collect();
        let mut heads: Heads = vec![None; scans.len()];
        let mut heap: KeyHeap = BinaryHeap::new();
        for i in 0..scans.len() {
            advance(&mut scans, &mut heads, &mut heap, i)?;
        }

        let mut out = Outputs::new(self);
        while let Some(Reverse((key, i))) = heap.pop() {
            let mut vs = heads[i].take().unwrap_or_default();
            advance(&mut scans, &mut heads, &mut heap, i)?;
            while let Some(Reverse((k, _))) = heap.peek() {
                if *k != key {
                    break;
                }
                if let Some(Reverse((_, j))) = heap.pop() {
                    vs.extend(heads[j].take().unwrap_or_default());
                    advance(&mut scans, &mut heads, &mut heap, j)?;
                }
            }

            normalize(&mut vs);
            let n_in = vs.len() as u64;
            let kept = gc_key_versions(merger, &key, vs, g, frags_below.covering_seq(&key))?;
            report.entries_in += n_in;
            report.entries_out += kept.len() as u64;
            report.versions_dropped += n_in - kept.len() as u64;
            if !kept.is_empty() {
                out.add_key(&key, &kept)?;
            }
        }
        let outputs = out.finish(&kept_ts)?;

        report.outputs = outputs.iter().map(|t| t.file_num()).collect();
        report.bytes_out = outputs.iter().map(|t| t.size()).sum();

        self.install(VersionEdit {
            flushed_mem: None,
            added: outputs,
            removed: report.inputs.clone(),
        })?;

        record_compaction(
            report.entries_in,
            report.entries_out,
            report.versions_dropped,
            report.tombstones_dropped,
        );
        info!(
            "compaction: horizon={} inputs={:?} outputs={:?} entries {}->{} (dropped {}), range-dels dropped {}/{}",
            horizon,
            report.inputs,
            report.outputs,
            report.entries_in,
            report.entries_out,
            report.versions_dropped,
            report.tombstones_dropped,
            report.tombstones_in
        );
        Ok(report)
    }
}

impl Db {
    /// Compact tables overlapping [start, end) and their overlap closure.
    pub fn compact(&self, start: &[u8], end: &[u8]) -> Result<CompactReport> {
        if start >= end {
            return Err(LsmError::InvalidRange.into());
        }
        self.inner.check_open()?;
        self.inner.compact_range(Some((start, end)))
    }

    /// Compact the whole key space.
    pub fn compact_all(&self) -> Result<CompactReport> {
        self.inner.check_open()?;
        self.inner.compact_range(None)
    }
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
    fn versions_at_or_above_horizon_survive() {
        let vs = vec![e(9, Kind::Set, b"c"), e(6, Kind::Set, b"b"), e(2, Kind::Set, b"a")];
        let out = gc_key_versions(&ConcatMerger, b"k", vs, 6, None).unwrap();
        assert_eq!(out.iter().map(|x| x.seq).collect::<Vec<_>>(), vec![9, 6, 2]);

        let vs = vec![e(9, Kind::Set, b"c"), e(6, Kind::Set, b"b"), e(2, Kind::Set, b"a"), e(1, Kind::Set, b"z")];
        let out = gc_key_versions(&ConcatMerger, b"k", vs, 6, None).unwrap();
        assert_eq!(out.iter().map(|x| x.seq).collect::<Vec<_>>(), vec![9, 6, 2]);
        assert_eq!(out[2].value, b"a");
    }

    #[test]
    fn merges_below_horizon_fold_into_set() {
        let vs = vec![e(8, Kind::Merge, b"z"), e(4, Kind::Merge, b"y"), e(3, Kind::Merge, b"x"), e(1, Kind::Set, b"w")];
        let out = gc_key_versions(&ConcatMerger, b"k", vs, 5, None).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, Kind::Merge);
        assert_eq!(out[1], e(4, Kind::Set, b"wxy"));
    }

    #[test]
    fn deleted_and_masked_history_disappears() {
        let vs = vec![e(3, Kind::Delete, b""), e(1, Kind::Set, b"a")];
        assert!(gc_key_versions(&ConcatMerger, b"k", vs, 10, None).unwrap().is_empty());

        let vs = vec![e(4, Kind::Set, b"a")];
        assert!(gc_key_versions(&ConcatMerger, b"k", vs, 10, Some(6)).unwrap().is_empty());

        // tombstone above the version but not below the horizon does not apply
        let vs = vec![e(4, Kind::Set, b"a")];
        let out = gc_key_versions(&ConcatMerger, b"k", vs, 5, None).unwrap();
        assert_eq!(out, vec![e(4, Kind::Set, b"a")]);
    }
}
