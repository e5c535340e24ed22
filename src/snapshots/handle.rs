//! Snapshot lease: a read-only view pinned at one sequence number.
//!
//! - Created under the commit mutex at `last_seq` (no storage I/O).
//! - Reads see exactly the mutations with seq <= the snapshot's seq.
//! - `close()` unregisters it (the GC horizon may rise). Any second close and
//!   any read after close fail with `LsmError::Closed`; the same holds once
//!   the owning Db is closed.
//! - Dropping an unclosed snapshot unregisters it and logs a warning.

use anyhow::Result;
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::db::core::DbInner;
use crate::db::Db;
use crate::error::LsmError;
use crate::iterator::{DbIterator, IterOptions};
use crate::keys::SeqNum;
use crate::metrics::{
    record_snapshot_closed, record_snapshot_created, record_snapshot_leaked, record_snapshot_misuse,
};

use super::registry::SnapshotId;

pub struct Snapshot {
    db: Arc<DbInner>,
    seq: SeqNum,
    id: SnapshotId,
    closed: AtomicBool,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("seq", &self.seq)
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Snapshot {
    pub fn seq(&self) -> SeqNum {
        self.seq
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<()> {
        if self.is_closed() {
            record_snapshot_misuse();
            return Err(LsmError::Closed.into());
        }
        self.db.check_open()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_with_cancel(key, &CancelToken::new())
    }

    /// Point lookup; storage reads abort with `Cancelled` once `cancel` fires.
    pub fn get_with_cancel(&self, key: &[u8], cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.db.view(Some(self.seq)).get(key, cancel)
    }

    /// The iterator owns its view and stays usable after the snapshot closes.
    pub fn new_iter(&self, opts: &IterOptions) -> Result<DbIterator> {
        self.check()?;
        Ok(DbIterator::new(self.db.view(Some(self.seq)), opts))
    }

    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut it = self.new_iter(&IterOptions::prefix(prefix))?;
        it.first();
        it.collect_remaining()
    }

    pub fn scan_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut it = self.new_iter(&IterOptions::default())?;
        it.first();
        it.collect_remaining()
    }

    /// Release the lease. Fails with `Closed` when already released.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            record_snapshot_misuse();
            return Err(LsmError::Closed.into());
        }
        self.release()?;
        record_snapshot_closed();
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let seq = self.db.lock_state().snapshots.remove(self.id)?;
        debug!("snapshot at seq {} released", seq);
        Ok(())
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!("snapshot at seq {} dropped without close(); releasing", self.seq);
        record_snapshot_leaked();
        if let Err(e) = self.release() {
            warn!("snapshot at seq {}: release on drop failed: {:#}", self.seq, e);
        }
    }
}

impl Db {
    /// Pin the last committed sequence number.
    pub fn new_snapshot(&self) -> Result<Snapshot> {
        let (seq, id) = {
            let mut st = self.inner.lock_state();
            self.inner.check_open()?;
            let seq = st.last_seq;
            (seq, st.snapshots.push_back(seq))
        };
        record_snapshot_created();
        debug!("snapshot created at seq {}", seq);
        Ok(Snapshot {
            db: self.inner.clone(),
            seq,
            id,
            closed: AtomicBool::new(false),
        })
    }

    /// Pin an explicit, already committed sequence number.
    ///
    /// Accepted only when no history it needs can have been collected:
    /// `seq <= last_seq`, and `seq >=` the oldest open snapshot (with no open
    /// snapshot only `seq == last_seq` qualifies).
    pub fn new_snapshot_at(&self, seq: SeqNum) -> Result<Snapshot> {
        let id = {
            let mut st = self.inner.lock_state();
            self.inner.check_open()?;
            if seq > st.last_seq {
                return Err(LsmError::InvalidSnapshotSeq {
                    seq,
                    reason: "not yet committed",
                }
                .into());
            }
            match st.snapshots.oldest() {
                Some(oldest) if seq < oldest => {
                    return Err(LsmError::InvalidSnapshotSeq {
                        seq,
                        reason: "below the GC horizon",
                    }
                    .into());
                }
                None if seq != st.last_seq => {
                    return Err(LsmError::InvalidSnapshotSeq {
                        seq,
                        reason: "history may already be collected",
                    }
                    .into());
                }
                _ => {}
            }
            st.snapshots.insert_ordered(seq)
        };
        record_snapshot_created();
        debug!("snapshot created at explicit seq {}", seq);
        Ok(Snapshot {
            db: self.inner.clone(),
            seq,
            id,
            closed: AtomicBool::new(false),
        })
    }

    /// Sequence numbers of open snapshots, oldest first.
    pub fn snapshot_seqs(&self) -> Vec<SeqNum> {
        self.inner.lock_state().snapshots.to_vec()
    }
}
