//! db/flush - запись immutable memtables в таблицы.
//!
//! - Memtables сбрасываются строго от старой к новой (flush_mu), поэтому
//!   данные в memtables всегда новее любых данных в таблицах.
//! - Таблица пишется вне DbState-мьютекса; установка новой Version идёт через install().
//! - После flush, если таблиц >= l0_compaction_threshold, запускается полная компакция
//!   (если другая компакция уже идёт - пропускаем).

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::TryLockError;

use crate::metrics::record_flush;
use crate::sstable::{build_table, WriterOptions};

use super::core::{lock, Db, DbInner, VersionEdit};

impl DbInner {
    /// Flush every immutable memtable; returns how many were written.
    pub(crate) fn flush_immutables(&self) -> Result<usize> {
        let _g = lock(&self.flush_mu);
        let mut flushed = 0usize;

        loop {
            let (mem, file_num) = {
                let mut st = self.lock_state();
                let Some(m) = st.version.imm.first().cloned() else {
                    break;
                };
                (m, st.alloc_file_num())
            };

            let (entries, tombstones) = mem.sorted_contents();
            let table = build_table(
                &self.provider,
                &self.cache,
                file_num,
                WriterOptions::from_config(&self.cfg),
                &entries,
                &tombstones,
            )
            .with_context(|| format!("flush memtable {}", mem.id()))?;

            record_flush(table.size());
            info!(
                "flush: memtable {} -> table {:06} ({} entries, {} range-dels, {} B, seq<={})",
                mem.id(),
                file_num,
                entries.len(),
                tombstones.len(),
                table.size(),
                table.largest_seq()
            );

            self.install(VersionEdit {
                flushed_mem: Some(mem.id()),
                added: vec![table],
                removed: Vec::new(),
            })?;
            flushed += 1;
        }
        Ok(flushed)
    }

    /// Flush and auto-compaction following a rotation on the write path.
    /// Failures are logged; unflushed memtables stay queued for the next flush.
    pub(crate) fn flush_after_rotation(&self) {
        if let Err(e) = self.flush_immutables() {
            warn!("flush after rotation failed, memtable stays queued: {:#}", e);
            return;
        }
        if let Err(e) = self.maybe_auto_compact() {
            warn!("auto compaction failed: {:#}", e);
        }
    }

    /// Full compaction once the table count reaches the configured threshold.
    pub(crate) fn maybe_auto_compact(&self) -> Result<()> {
        let threshold = self.cfg.l0_compaction_threshold;
        if threshold == 0 || self.is_closed() {
            return Ok(());
        }
        let n = self.lock_state().version.tables.len();
        if n < threshold {
            return Ok(());
        }
        let _g = match self.compact_mu.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("auto compaction skipped: another compaction is running");
                return Ok(());
            }
        };
        debug!("auto compaction: {} tables >= threshold {}", n, threshold);
        self.compact_locked(None)?;
        Ok(())
    }
}

impl Db {
    /// Flush the mutable memtable and everything queued behind it.
    pub fn flush(&self) -> Result<()> {
        self.inner.check_open()?;
        self.inner.lock_state().rotate_memtable();
        self.inner.flush_immutables()?;
        self.inner.maybe_auto_compact()
    }
}
