//! Point-in-time read view.
//!
//! A view pins one `Version` (memtables + tables) and a horizon H. Every read
//! goes through the same steps: gather the versions of one user key from all
//! sources, order them newest first, and apply `visibility::resolve` with the
//! greatest covering tombstone at or below H.

use anyhow::Result;
use std::ops::Bound;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::keys::{Entry, SeqNum};
use crate::merge::Merger;
use crate::rangedel::{Fragments, RangeTombstone};
use crate::visibility::{normalize, resolve};

use super::core::Version;

type Group = (Vec<u8>, Vec<Entry>);

#[derive(Clone, Copy)]
enum Dir {
    Forward,
    Backward,
}

pub(crate) struct ReadView {
    version: Arc<Version>,
    horizon: SeqNum,
    frags: Fragments,
    merger: Arc<dyn Merger>,
}

impl ReadView {
    pub(crate) fn new(version: Arc<Version>, horizon: SeqNum, merger: Arc<dyn Merger>) -> Self {
        let mem_ts: Vec<RangeTombstone> = version
            .memtables()
            .flat_map(|m| m.range_tombstones())
            .collect();
        let frags = Fragments::build(
            mem_ts
                .iter()
                .chain(version.tables.iter().flat_map(|t| t.range_tombstones().iter())),
            horizon,
        );
        Self {
            version,
            horizon,
            frags,
            merger,
        }
    }

    pub(crate) fn horizon(&self) -> SeqNum {
        self.horizon
    }

    /// Visible value of `key` at the view's horizon.
    pub(crate) fn get(&self, key: &[u8], cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
        cancel.check()?;
        let mut vs: Vec<Entry> = Vec::new();
        for m in self.version.memtables() {
            vs.extend(m.versions(key));
        }
        for t in &self.version.tables {
            vs.extend(t.versions(key, cancel)?);
        }
        self.resolve_group(key, vs)
    }

    fn resolve_group(&self, key: &[u8], mut vs: Vec<Entry>) -> Result<Option<Vec<u8>>> {
        vs.retain(|e| e.seq <= self.horizon);
        if vs.is_empty() {
            return Ok(None);
        }
        normalize(&mut vs);
        resolve(self.merger.as_ref(), key, &vs, self.frags.covering_seq(key), self.horizon)
    }

    /// Nearest user key in direction `dir` from `from`, with versions from every source.
    fn step(&self, dir: Dir, from: Bound<&[u8]>, cancel: &CancelToken) -> Result<Option<Group>> {
        let mut best: Option<Group> = None;
        let mut take = |cand: Option<Group>| {
            let Some((k, vs)) = cand else { return };
            if let Some((bk, bvs)) = &mut best {
                if *bk == k {
                    bvs.extend(vs);
                    return;
                }
            }
            let closer = match (&best, dir) {
                (None, _) => true,
                (Some((bk, _)), Dir::Forward) => k < *bk,
                (Some((bk, _)), Dir::Backward) => k > *bk,
            };
            if closer {
                best = Some((k, vs));
            }
        };

        for m in self.version.memtables() {
            take(match dir {
                Dir::Forward => m.next_versions(from),
                Dir::Backward => m.prev_versions(from),
            });
        }
        for t in &self.version.tables {
            take(match dir {
                Dir::Forward => t.next_versions(from, cancel)?,
                Dir::Backward => t.prev_versions(from, cancel)?,
            });
        }
        Ok(best)
    }

    fn seek(
        &self,
        dir: Dir,
        from: Bound<&[u8]>,
        stop: Option<&[u8]>,
        cancel: &CancelToken,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut cur: Option<Vec<u8>> = None;
        loop {
            cancel.check()?;
            let bound = match &cur {
                Some(k) => Bound::Excluded(k.as_slice()),
                None => from,
            };
            let Some((key, vs)) = self.step(dir, bound, cancel)? else {
                return Ok(None);
            };
            let past_stop = match (dir, stop) {
                (Dir::Forward, Some(upper)) => key.as_slice() >= upper,
                (Dir::Backward, Some(lower)) => key.as_slice() < lower,
                (_, None) => false,
            };
            if past_stop {
                return Ok(None);
            }
            if let Some(v) = self.resolve_group(&key, vs)? {
                return Ok(Some((key, v)));
            }
            cur = Some(key);
        }
    }

    /// First visible entry with key in `from`.. and below `upper`.
    pub(crate) fn next_visible(
        &self,
        from: Bound<&[u8]>,
        upper: Option<&[u8]>,
        cancel: &CancelToken,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.seek(Dir::Forward, from, upper, cancel)
    }

    /// Last visible entry with key in ..`from` and at or above `lower`.
    pub(crate) fn prev_visible(
        &self,
        from: Bound<&[u8]>,
        lower: Option<&[u8]>,
        cancel: &CancelToken,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.seek(Dir::Backward, from, lower, cancel)
    }
}
