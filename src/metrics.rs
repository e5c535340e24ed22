//! Lightweight global metrics for QuiverLSM.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Snapshots (lifecycle + misuse)
//! - Flush / Compaction (GC horizon consumption)
//! - Block cache / Bloom filters
//! - Iterators

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Snapshots -----
static SNAPSHOTS_CREATED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_CLOSED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_ACTIVE: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_MISUSE: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_LEAKED: AtomicU64 = AtomicU64::new(0);

// ----- Flush -----
static FLUSHES: AtomicU64 = AtomicU64::new(0);
static FLUSH_BYTES: AtomicU64 = AtomicU64::new(0);

// ----- Compaction -----
static COMPACTIONS: AtomicU64 = AtomicU64::new(0);
static COMPACTION_ENTRIES_IN: AtomicU64 = AtomicU64::new(0);
static COMPACTION_ENTRIES_OUT: AtomicU64 = AtomicU64::new(0);
static COMPACTION_VERSIONS_DROPPED: AtomicU64 = AtomicU64::new(0);
static COMPACTION_TOMBSTONES_DROPPED: AtomicU64 = AtomicU64::new(0);

// ----- Block cache / Bloom -----
static BLOCK_CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static BLOCK_CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static BLOOM_SKIPS: AtomicU64 = AtomicU64::new(0);

// ----- Iterators -----
static ITERATORS_CREATED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Snapshots
    pub snapshots_created: u64,
    pub snapshots_closed: u64,
    pub snapshots_active: u64,
    pub snapshot_misuse: u64,
    pub snapshots_leaked: u64,

    // Flush
    pub flushes: u64,
    pub flush_bytes: u64,

    // Compaction
    pub compactions: u64,
    pub compaction_entries_in: u64,
    pub compaction_entries_out: u64,
    pub compaction_versions_dropped: u64,
    pub compaction_tombstones_dropped: u64,

    // Block cache / Bloom
    pub block_cache_hits: u64,
    pub block_cache_misses: u64,
    pub bloom_skips: u64,

    // Iterators
    pub iterators_created: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.block_cache_hits + self.block_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.block_cache_hits as f64 / total as f64
        }
    }
}

// ----- Recorders (Snapshots) -----
pub fn record_snapshot_created() {
    SNAPSHOTS_CREATED.fetch_add(1, Ordering::Relaxed);
    SNAPSHOTS_ACTIVE.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_closed() {
    SNAPSHOTS_CLOSED.fetch_add(1, Ordering::Relaxed);
    SNAPSHOTS_ACTIVE.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1))).ok();
}

pub fn record_snapshot_misuse() {
    SNAPSHOT_MISUSE.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_leaked() {
    SNAPSHOTS_LEAKED.fetch_add(1, Ordering::Relaxed);
    SNAPSHOTS_ACTIVE.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1))).ok();
}

// ----- Recorders (Flush) -----
pub fn record_flush(bytes: u64) {
    FLUSHES.fetch_add(1, Ordering::Relaxed);
    FLUSH_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

// ----- Recorders (Compaction) -----
pub fn record_compaction(entries_in: u64, entries_out: u64, versions_dropped: u64, tombstones_dropped: u64) {
    COMPACTIONS.fetch_add(1, Ordering::Relaxed);
    COMPACTION_ENTRIES_IN.fetch_add(entries_in, Ordering::Relaxed);
    COMPACTION_ENTRIES_OUT.fetch_add(entries_out, Ordering::Relaxed);
    COMPACTION_VERSIONS_DROPPED.fetch_add(versions_dropped, Ordering::Relaxed);
    COMPACTION_TOMBSTONES_DROPPED.fetch_add(tombstones_dropped, Ordering::Relaxed);
}

// ----- Recorders (Block cache / Bloom) -----
pub fn record_block_cache_hit() {
    BLOCK_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_block_cache_miss() {
    BLOCK_CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_bloom_skip() {
    BLOOM_SKIPS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Iterators) -----
pub fn record_iterator_created() {
    ITERATORS_CREATED.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn metrics_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        snapshots_created: SNAPSHOTS_CREATED.load(Ordering::Relaxed),
        snapshots_closed: SNAPSHOTS_CLOSED.load(Ordering::Relaxed),
        snapshots_active: SNAPSHOTS_ACTIVE.load(Ordering::Relaxed),
        snapshot_misuse: SNAPSHOT_MISUSE.load(Ordering::Relaxed),
        snapshots_leaked: SNAPSHOTS_LEAKED.load(Ordering::Relaxed),

        flushes: FLUSHES.load(Ordering::Relaxed),
        flush_bytes: FLUSH_BYTES.load(Ordering::Relaxed),

        compactions: COMPACTIONS.load(Ordering::Relaxed),
        compaction_entries_in: COMPACTION_ENTRIES_IN.load(Ordering::Relaxed),
        compaction_entries_out: COMPACTION_ENTRIES_OUT.load(Ordering::Relaxed),
        compaction_versions_dropped: COMPACTION_VERSIONS_DROPPED.load(Ordering::Relaxed),
        compaction_tombstones_dropped: COMPACTION_TOMBSTONES_DROPPED.load(Ordering::Relaxed),

        block_cache_hits: BLOCK_CACHE_HITS.load(Ordering::Relaxed),
        block_cache_misses: BLOCK_CACHE_MISSES.load(Ordering::Relaxed),
        bloom_skips: BLOOM_SKIPS.load(Ordering::Relaxed),

        iterators_created: ITERATORS_CREATED.load(Ordering::Relaxed),
    }
}

pub fn metrics_reset() {
    SNAPSHOTS_CREATED.store(0, Ordering::Relaxed);
    SNAPSHOTS_CLOSED.store(0, Ordering::Relaxed);
    SNAPSHOTS_ACTIVE.store(0, Ordering::Relaxed);
    SNAPSHOT_MISUSE.store(0, Ordering::Relaxed);
    SNAPSHOTS_LEAKED.store(0, Ordering::Relaxed);

    FLUSHES.store(0, Ordering::Relaxed);
    FLUSH_BYTES.store(0, Ordering::Relaxed);

    COMPACTIONS.store(0, Ordering::Relaxed);
    COMPACTION_ENTRIES_IN.store(0, Ordering::Relaxed);
    COMPACTION_ENTRIES_OUT.store(0, Ordering::Relaxed);
    COMPACTION_VERSIONS_DROPPED.store(0, Ordering::Relaxed);
    COMPACTION_TOMBSTONES_DROPPED.store(0, Ordering::Relaxed);

    BLOCK_CACHE_HITS.store(0, Ordering::Relaxed);
    BLOCK_CACHE_MISSES.store(0, Ordering::Relaxed);
    BLOOM_SKIPS.store(0, Ordering::Relaxed);

    ITERATORS_CREATED.store(0, Ordering::Relaxed);
}
