//! Centralized configuration and builder for QuiverLSM.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - LsmConfig::from_env() reads QLSM_* variables on top of the defaults.
//! - DbBuilder returns an LsmConfig, which Db consumes on open.
//!
//! Defaults:
//! - memtable_size_bytes = 4 MiB (rotation + flush threshold)
//! - l0_compaction_threshold = 8 tables (0 disables automatic compaction)
//! - compression = none, data_fsync = false, flush_on_close = true
//!   All of the above can be overridden via ENV or builder.

use std::fmt;
use std::sync::Arc;

use crate::merge::{default_merger, Merger};

/// Block codec for sorted tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    None,
    Zstd,
}

impl Codec {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "0" => Some(Codec::None),
            "zstd" => Some(Codec::Zstd),
            _ => None,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::None => write!(f, "none"),
            Codec::Zstd => write!(f, "zstd"),
        }
    }
}

/// Top-level configuration for the engine.
#[derive(Clone, Debug)]
pub struct LsmConfig {
    /// Mutable memtable size that triggers rotation and flush.
    /// Env: QLSM_MEMTABLE_BYTES (default 4 MiB)
    pub memtable_size_bytes: usize,

    /// Table count that triggers an automatic full compaction after flush (0 = off).
    /// Env: QLSM_L0_COMPACTION_THRESHOLD (default 8)
    pub l0_compaction_threshold: usize,

    /// Upper bound for a compaction output table.
    /// Env: QLSM_TARGET_FILE_SIZE (default 8 MiB)
    pub target_file_size: usize,

    /// Uncompressed data block size target.
    /// Env: QLSM_BLOCK_SIZE (default 4096)
    pub block_size: usize,

    /// Decoded block cache capacity in blocks (0 disables).
    /// Env: QLSM_BLOCK_CACHE_BLOCKS (default 1024)
    pub block_cache_blocks: usize,

    /// Bloom filter bits per key (0 disables filters).
    /// Env: QLSM_BLOOM_BITS_PER_KEY (default 10)
    pub bloom_bits_per_key: usize,

    /// Env: QLSM_COMPRESSION = none|zstd (default none)
    pub compression: Codec,

    /// Env: QLSM_ZSTD_LEVEL (default 3)
    pub zstd_level: i32,

    /// fsync table and manifest objects on finish (directory provider only).
    /// Env: QLSM_DATA_FSYNC (default false; "1|true|on|yes" => true)
    pub data_fsync: bool,

    /// Flush the memtable on close.
    /// Env: QLSM_FLUSH_ON_CLOSE (default true)
    pub flush_on_close: bool,

    /// Merge operator used by reads and compaction.
    pub merger: Arc<dyn Merger>,
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            memtable_size_bytes: 4 << 20,
            l0_compaction_threshold: 8,
            target_file_size: 8 << 20,
            block_size: 4096,
            block_cache_blocks: 1024,
            bloom_bits_per_key: 10,
            compression: Codec::None,
            zstd_level: 3,
            data_fsync: false,
            flush_on_close: true,
            merger: default_merger(),
        }
    }
}

fn env_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "on" || s == "yes"
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl LsmConfig {
    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(n) = env_parse::<usize>("QLSM_MEMTABLE_BYTES") {
            cfg.memtable_size_bytes = n;
        }
        if let Some(n) = env_parse::<usize>("QLSM_L0_COMPACTION_THRESHOLD") {
            cfg.l0_compaction_threshold = n;
        }
        if let Some(n) = env_parse::<usize>("QLSM_TARGET_FILE_SIZE") {
            cfg.target_file_size = n;
        }
        if let Some(n) = env_parse::<usize>("QLSM_BLOCK_SIZE") {
            cfg.block_size = n;
        }
        if let Some(n) = env_parse::<usize>("QLSM_BLOCK_CACHE_BLOCKS") {
            cfg.block_cache_blocks = n;
        }
        if let Some(n) = env_parse::<usize>("QLSM_BLOOM_BITS_PER_KEY") {
            cfg.bloom_bits_per_key = n;
        }
        if let Ok(v) = std::env::var("QLSM_COMPRESSION") {
            if let Some(c) = Codec::parse(&v) {
                cfg.compression = c;
            }
        }
        if let Some(n) = env_parse::<i32>("QLSM_ZSTD_LEVEL") {
            cfg.zstd_level = n;
        }
        if let Ok(v) = std::env::var("QLSM_DATA_FSYNC") {
            cfg.data_fsync = env_flag(&v);
        }
        if let Ok(v) = std::env::var("QLSM_FLUSH_ON_CLOSE") {
            cfg.flush_on_close = env_flag(&v);
        }

        cfg
    }

    pub fn with_memtable_size_bytes(mut self, n: usize) -> Self {
        self.memtable_size_bytes = n;
        self
    }

    pub fn with_l0_compaction_threshold(mut self, n: usize) -> Self {
        self.l0_compaction_threshold = n;
        self
    }

    pub fn with_target_file_size(mut self, n: usize) -> Self {
        self.target_file_size = n;
        self
    }

    pub fn with_block_size(mut self, n: usize) -> Self {
        self.block_size = n;
        self
    }

    pub fn with_block_cache_blocks(mut self, n: usize) -> Self {
        self.block_cache_blocks = n;
        self
    }

    pub fn with_bloom_bits_per_key(mut self, n: usize) -> Self {
        self.bloom_bits_per_key = n;
        self
    }

    pub fn with_compression(mut self, c: Codec) -> Self {
        self.compression = c;
        self
    }

    pub fn with_data_fsync(mut self, on: bool) -> Self {
        self.data_fsync = on;
        self
    }

    pub fn with_flush_on_close(mut self, on: bool) -> Self {
        self.flush_on_close = on;
        self
    }

    pub fn with_merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.merger = merger;
        self
    }

    /// Clamp values that would make the engine misbehave.
    pub(crate) fn sanitized(mut self) -> Self {
        self.block_size = self.block_size.max(64);
        self.memtable_size_bytes = self.memtable_size_bytes.max(1024);
        self.target_file_size = self.target_file_size.max(self.block_size);
        self
    }
}

impl fmt::Display for LsmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LsmConfig {{ \
             memtable_size_bytes: {}, \
             l0_compaction_threshold: {}, \
             target_file_size: {}, \
             block_size: {}, \
             block_cache_blocks: {}, \
             bloom_bits_per_key: {}, \
             compression: {}, \
             zstd_level: {}, \
             data_fsync: {}, \
             flush_on_close: {}, \
             merger: {} \
             }}",
            self.memtable_size_bytes,
            self.l0_compaction_threshold,
            self.target_file_size,
            self.block_size,
            self.block_cache_blocks,
            self.bloom_bits_per_key,
            self.compression,
            self.zstd_level,
            self.data_fsync,
            self.flush_on_close,
            self.merger.name(),
        )
    }
}

/// Lightweight builder that produces an LsmConfig.
#[derive(Clone, Debug)]
pub struct DbBuilder {
    cfg: LsmConfig,
}

impl Default for DbBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: LsmConfig::from_env(),
        }
    }
}

impl DbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: LsmConfig::default(),
        }
    }

    pub fn memtable_size_bytes(mut self, n: usize) -> Self {
        self.cfg.memtable_size_bytes = n;
        self
    }

    pub fn l0_compaction_threshold(mut self, n: usize) -> Self {
        self.cfg.l0_compaction_threshold = n;
        self
    }

    pub fn target_file_size(mut self, n: usize) -> Self {
        self.cfg.target_file_size = n;
        self
    }

    pub fn block_size(mut self, n: usize) -> Self {
        self.cfg.block_size = n;
        self
    }

    pub fn block_cache_blocks(mut self, n: usize) -> Self {
        self.cfg.block_cache_blocks = n;
        self
    }

    pub fn bloom_bits_per_key(mut self, n: usize) -> Self {
        self.cfg.bloom_bits_per_key = n;
        self
    }

    pub fn compression(mut self, c: Codec) -> Self {
        self.cfg.compression = c;
        self
    }

    pub fn data_fsync(mut self, on: bool) -> Self {
        self.cfg.data_fsync = on;
        self
    }

    pub fn flush_on_close(mut self, on: bool) -> Self {
        self.cfg.flush_on_close = on;
        self
    }

    pub fn merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.cfg.merger = merger;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> LsmConfig {
        self.cfg
    }
}
