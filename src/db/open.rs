//! db/open - открытие Db поверх провайдера объектов.
//!
//! - FsProvider (каталог + LOCK) или MemProvider (всё в памяти).
//! - Загружается последний MANIFEST, открываются его таблицы; .sst-объекты,
//!   которых нет в манифесте (недописанные flush/компакции), удаляются.
//! - last_seq продолжается после максимального сохранённого seq.

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::config::{DbBuilder, LsmConfig};
use crate::manifest::{self, Manifest};
use crate::objstorage::{parse_table_object_name, FsProvider, MemProvider, Provider};
use crate::snapshots::SnapshotRegistry;
use crate::sstable::{BlockCache, Table};

use super::core::{Db, DbInner, DbState, Version};

impl Db {
    /// Open (or create) a directory-backed store with configuration from env.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_with_config(root, LsmConfig::from_env())
    }

    pub fn open_with_config(root: &Path, cfg: LsmConfig) -> Result<Self> {
        let provider = FsProvider::open(root, cfg.data_fsync)
            .with_context(|| format!("open store at {}", root.display()))?;
        Self::open_with_provider(Arc::new(provider), cfg)
    }

    /// Fresh store that lives only in memory.
    pub fn open_in_memory(cfg: LsmConfig) -> Result<Self> {
        Self::open_with_provider(Arc::new(MemProvider::new()), cfg)
    }

    pub fn builder() -> DbBuilder {
        DbBuilder::new()
    }

    pub fn open_with_provider(provider: Arc<dyn Provider>, cfg: LsmConfig) -> Result<Self> {
        let cfg = cfg.sanitized();
        let cache = Arc::new(BlockCache::new(cfg.block_cache_blocks));

        let (manifest_num, m) = manifest::load_latest(provider.as_ref())?
            .unwrap_or_else(|| (0, Manifest::new(1, 0, Vec::new())));

        let mut tables = Vec::with_capacity(m.tables.len());
        for &n in &m.tables {
            let t = Table::open(provider.clone(), cache.clone(), n)
                .with_context(|| format!("open table {:06} listed in manifest {}", n, manifest_num))?;
            tables.push(Arc::new(t));
        }

        let mut next_file_num = m.next_file_num.max(1);
        for name in provider.list()? {
            let Some(n) = parse_table_object_name(&name) else {
                continue;
            };
            next_file_num = next_file_num.max(n + 1);
            if !m.tables.contains(&n) {
                warn!("open: removing unreferenced table {}", provider.path(&name));
                if let Err(e) = provider.remove(&name) {
                    warn!("open: failed to remove {}: {:#}", name, e);
                }
            }
        }

        let last_seq = tables
            .iter()
            .map(|t| t.largest_seq())
            .fold(m.last_seq, u64::max);

        info!(
            "open: {} table(s), last_seq={}, next_file_num={}, manifest={}; {}",
            tables.len(),
            last_seq,
            next_file_num,
            manifest_num,
            cfg
        );

        let state = DbState {
            last_seq,
            version: Arc::new(Version::empty(1, tables)),
            snapshots: SnapshotRegistry::new(),
            next_file_num,
            next_mem_id: 2,
            manifest_num,
        };

        Ok(Db::from_inner(DbInner {
            cfg,
            provider,
            cache,
            state: Mutex::new(state),
            flush_mu: Mutex::new(()),
            compact_mu: Mutex::new(()),
            install_mu: Mutex::new(()),
            close_mu: Mutex::new(()),
            closed: AtomicBool::new(false),
        }))
    }
}

impl DbBuilder {
    /// Open a directory-backed store with the built configuration.
    pub fn open(self, root: &Path) -> Result<Db> {
        Db::open_with_config(root, self.build())
    }

    pub fn open_in_memory(self) -> Result<Db> {
        Db::open_in_memory(self.build())
    }
}
