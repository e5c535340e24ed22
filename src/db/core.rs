//! db/core - ядро движка: Db, внутреннее состояние, версии, close/Drop.
//!
//! Модель:
//! - DbState (last_seq, текущая Version, реестр снапшотов) живёт под одним Mutex -
//!   это единственная точка сериализации: выдача seq, применение записи в memtable,
//!   регистрация/удаление снапшотов и подмена Version происходят только под ним.
//! - Version неизменяема и разделяется через Arc: читатели берут Arc<Version> и
//!   дальше работают без блокировок; flush/compaction устанавливают новую Version.
//! - Таблица, вытесненная компакцией, помечается obsolete и удаляет свой объект,
//!   когда исчезает последняя ссылка на неё (старые Version у итераторов).

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cancel::CancelToken;
use crate::config::LsmConfig;
use crate::error::LsmError;
use crate::iterator::{DbIterator, IterOptions};
use crate::keys::SeqNum;
use crate::manifest::{self, Manifest};
use crate::memtable::Memtable;
use crate::objstorage::Provider;
use crate::snapshots::SnapshotRegistry;
use crate::sstable::{BlockCache, Table};

use super::gc::GcHorizon;
use super::view::ReadView;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Immutable set of sources a reader sees.
#[derive(Debug)]
pub(crate) struct Version {
    pub mem: Arc<Memtable>,
    /// Rotated memtables awaiting flush, oldest first.
    pub imm: Vec<Arc<Memtable>>,
    pub tables: Vec<Arc<Table>>,
}

impl Version {
    pub(crate) fn empty(mem_id: u64, tables: Vec<Arc<Table>>) -> Self {
        Self {
            mem: Arc::new(Memtable::new(mem_id)),
            imm: Vec::new(),
            tables,
        }
    }

    pub(crate) fn memtables(&self) -> impl Iterator<Item = &Arc<Memtable>> {
        std::iter::once(&self.mem).chain(self.imm.iter())
    }
}

/// Table-set change produced by a flush or a compaction.
#[derive(Default)]
pub(crate) struct VersionEdit {
    pub flushed_mem: Option<u64>,
    pub added: Vec<Arc<Table>>,
    pub removed: Vec<u64>,
}

pub(crate) struct DbState {
    pub last_seq: SeqNum,
    pub version: Arc<Version>,
    pub snapshots: SnapshotRegistry,
    pub next_file_num: u64,
    pub next_mem_id: u64,
    pub manifest_num: u64,
}

impl DbState {
    pub(crate) fn alloc_file_num(&mut self) -> u64 {
        let n = self.next_file_num;
        self.next_file_num += 1;
        n
    }

    /// Move a non-empty mutable memtable to the immutable list.
    pub(crate) fn rotate_memtable(&mut self) -> bool {
        if self.version.mem.is_empty() {
            return false;
        }
        let id = self.next_mem_id;
        self.next_mem_id += 1;
        let mut imm = self.version.imm.clone();
        imm.push(self.version.mem.clone());
        self.version = Arc::new(Version {
            mem: Arc::new(Memtable::new(id)),
            imm,
            tables: self.version.tables.clone(),
        });
        true
    }
}

pub(crate) struct DbInner {
    pub cfg: LsmConfig,
    pub provider: Arc<dyn Provider>,
    pub cache: Arc<BlockCache>,
    pub state: Mutex<DbState>,
    pub flush_mu: Mutex<()>,
    pub compact_mu: Mutex<()>,
    pub install_mu: Mutex<()>,
    pub close_mu: Mutex<()>,
    pub closed: AtomicBool,
}

impl DbInner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, DbState> {
        lock(&self.state)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(LsmError::Closed.into());
        }
        Ok(())
    }

    /// View of the current version at `horizon` (None = last committed seq).
    pub(crate) fn view(&self, horizon: Option<SeqNum>) -> ReadView {
        let (version, h) = {
            let st = self.lock_state();
            (st.version.clone(), horizon.unwrap_or(st.last_seq))
        };
        ReadView::new(version, h, self.cfg.merger.clone())
    }

    /// Persist the edited table set, then publish it as the current Version.
    pub(crate) fn install(&self, edit: VersionEdit) -> Result<()> {
        let _g = lock(&self.install_mu);

        let (num, m, tables, removed) = {
            let st = self.lock_state();
            let (removed, mut tables): (Vec<Arc<Table>>, Vec<Arc<Table>>) = st
                .version
                .tables
                .iter()
                .cloned()
                .partition(|t| edit.removed.contains(&t.file_num()));
            tables.extend(edit.added.iter().cloned());
            let m = Manifest::new(
                st.next_file_num,
                st.last_seq,
                tables.iter().map(|t| t.file_num()).collect(),
            );
            (st.manifest_num + 1, m, tables, removed)
        };

        if let Err(e) = manifest::write(self.provider.as_ref(), num, &m) {
            for t in &edit.added {
                t.mark_obsolete();
            }
            return Err(e.context("install version"));
        }

        {
            let mut st = self.lock_state();
            st.manifest_num = num;
            let imm = st
                .version
                .imm
                .iter()
                .filter(|mt| Some(mt.id()) != edit.flushed_mem)
                .cloned()
                .collect();
            st.version = Arc::new(Version {
                mem: st.version.mem.clone(),
                imm,
                tables,
            });
        }

        for t in removed {
            t.mark_obsolete();
        }
        Ok(())
    }
}

/// Point-in-time counters for `status`.
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub last_seq: SeqNum,
    pub memtable_bytes: usize,
    pub immutable_memtables: usize,
    pub tables: usize,
    pub table_bytes: u64,
    pub open_snapshots: usize,
    pub gc_horizon: GcHorizon,
}

/// Embedded LSM store.
///
/// All methods take `&self`; share a `Db` across threads with `Arc<Db>` or
/// scoped borrows. Snapshots and iterators keep the engine state they need
/// alive on their own.
pub struct Db {
    pub(crate) inner: Arc<DbInner>,
}

impl Db {
    pub(crate) fn from_inner(inner: DbInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &LsmConfig {
        &self.inner.cfg
    }

    /// Sequence number of the last committed mutation (0 for an empty store).
    pub fn last_seq(&self) -> SeqNum {
        self.inner.lock_state().last_seq
    }

    /// Latest committed value of `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_with_cancel(key, &CancelToken::new())
    }

    pub fn get_with_cancel(&self, key: &[u8], cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
        self.inner.check_open()?;
        self.inner.view(None).get(key, cancel)
    }

    /// Iterator over the latest committed state (fixed at creation).
    pub fn new_iter(&self, opts: &IterOptions) -> Result<DbIterator> {
        self.inner.check_open()?;
        Ok(DbIterator::new(self.inner.view(None), opts))
    }

    pub fn stats(&self) -> DbStats {
        let st = self.inner.lock_state();
        DbStats {
            last_seq: st.last_seq,
            memtable_bytes: st.version.memtables().map(|m| m.approximate_size()).sum(),
            immutable_memtables: st.version.imm.len(),
            tables: st.version.tables.len(),
            table_bytes: st.version.tables.iter().map(|t| t.size()).sum(),
            open_snapshots: st.snapshots.len(),
            gc_horizon: GcHorizon::from_registry(&st.snapshots),
        }
    }

    /// Flush memtables (if configured), close the engine and release the store.
    ///
    /// Later operations, including reads through still-open snapshots, fail
    /// with `LsmError::Closed`. A second close also fails with `Closed`.
    /// If the final flush fails the engine stays open with the memtables
    /// queued, so `close()` can be retried.
    pub fn close(&self) -> Result<()> {
        let _c = lock(&self.inner.close_mu);
        let open_snapshots = {
            let mut st = self.inner.lock_state();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return Err(LsmError::Closed.into());
            }
            if self.inner.cfg.flush_on_close {
                st.rotate_memtable();
            }
            st.snapshots.len()
        };

        if self.inner.cfg.flush_on_close {
            if let Err(e) = self.inner.flush_immutables() {
                self.inner.closed.store(false, Ordering::Release);
                return Err(e.context("flush on close"));
            }
        }

        if open_snapshots > 0 {
            warn!("close: {} snapshot(s) still open; their reads will fail", open_snapshots);
        }

        // A running compaction may still write objects.
        drop(lock(&self.inner.compact_mu));
        self.inner.provider.release();

        let st = self.inner.lock_state();
        info!(
            "close: last_seq={}, tables={}, manifest={}",
            st.last_seq,
            st.version.tables.len(),
            st.manifest_num
        );
        Ok(())
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if self.inner.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!("close on drop failed, unflushed writes are lost: {:#}", e);
        }
    }
}
