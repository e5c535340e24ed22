//! db/write - запись: set/delete/merge/delete_range.
//!
//! Каждая мутация под DbState-мьютексом получает следующий seq и сразу
//! применяется в mutable memtable; снапшот, созданный после возврата вызова,
//! гарантированно её видит. Переполненная memtable ротируется под тем же
//! мьютексом, а flush выполняется уже после его освобождения.
//! Ошибка такого flush не меняет результат записи: она уже закоммичена,
//! ошибка логируется, а memtable остаётся в очереди до следующего flush()/close().

use anyhow::Result;

use crate::error::LsmError;
use crate::keys::{Kind, SeqNum, SEQ_MAX};
use crate::memtable::Memtable;

use super::core::Db;

impl Db {
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<SeqNum> {
        self.apply(|m, seq| m.add(seq, Kind::Set, key, value))
    }

    pub fn delete(&self, key: &[u8]) -> Result<SeqNum> {
        self.apply(|m, seq| m.add(seq, Kind::Delete, key, &[]))
    }

    /// Record a merge operand; it is folded with older versions on read.
    pub fn merge(&self, key: &[u8], operand: &[u8]) -> Result<SeqNum> {
        self.apply(|m, seq| m.add(seq, Kind::Merge, key, operand))
    }

    /// Delete every key in [start, end).
    pub fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<SeqNum> {
        if start >= end {
            return Err(LsmError::InvalidRange.into());
        }
        self.apply(|m, seq| m.add_range_delete(seq, start, end))
    }

    fn apply<F: FnOnce(&Memtable, SeqNum)>(&self, f: F) -> Result<SeqNum> {
        let (seq, rotated) = {
            let mut st = self.inner.lock_state();
            self.inner.check_open()?;
            let seq = st.last_seq + 1;
            if seq > SEQ_MAX {
                return Err(LsmError::SeqExhausted { last: st.last_seq }.into());
            }
            f(st.version.mem.as_ref(), seq);
            st.last_seq = seq;
            let rotated = st.version.mem.approximate_size() >= self.inner.cfg.memtable_size_bytes
                && st.rotate_memtable();
            (seq, rotated)
        };

        // Committed: background work below must not turn into the write's result.
        if rotated {
            self.inner.flush_after_rotation();
        }
        Ok(seq)
    }
}
