//! Persisted table set.
//!
//! Object: MANIFEST-NNNNNN (JSON)
//! {
//!   "version": 1,
//!   "next_file_num": 12,
//!   "last_seq": 4096,
//!   "tables": [3, 7, 11]
//! }
//!
//! Замечания:
//! - Каждая установка новой версии пишет новый манифест (tmp+rename в провайдере),
//!   затем удаляет предыдущие. При открытии берётся манифест с наибольшим номером.
//! - Состояние снапшотов не сохраняется: снапшоты живут только в процессе.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::consts::MANIFEST_VERSION;
use crate::error::LsmError;
use crate::keys::SeqNum;
use crate::objstorage::{manifest_object_name, parse_manifest_object_name, Provider};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub next_file_num: u64,
    pub last_seq: SeqNum,
    pub tables: Vec<u64>,
}

impl Manifest {
    pub fn new(next_file_num: u64, last_seq: SeqNum, tables: Vec<u64>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            next_file_num,
            last_seq,
            tables,
        }
    }
}

/// Newest manifest in the store, with its object number.
pub fn load_latest(provider: &dyn Provider) -> Result<Option<(u64, Manifest)>> {
    let newest = provider
        .list()?
        .iter()
        .filter_map(|n| parse_manifest_object_name(n))
        .max();
    let Some(num) = newest else {
        return Ok(None);
    };
    let name = manifest_object_name(num);
    let bytes = provider.read_all(&name)?;
    let m: Manifest =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", provider.path(&name)))?;
    if m.version != MANIFEST_VERSION {
        return Err(LsmError::Corruption(format!(
            "{}: unsupported manifest version {} (expected {})",
            name, m.version, MANIFEST_VERSION
        ))
        .into());
    }
    debug!(
        "manifest {} loaded: {} tables, next_file_num={}, last_seq={}",
        name,
        m.tables.len(),
        m.next_file_num,
        m.last_seq
    );
    Ok(Some((num, m)))
}

/// Publish manifest `num`, then drop every older one (best-effort).
pub fn write(provider: &dyn Provider, num: u64, m: &Manifest) -> Result<()> {
    let name = manifest_object_name(num);
    let data = serde_json::to_vec_pretty(m).context("serialize manifest")?;
    let mut w = provider.create(&name)?;
    if let Err(e) = w.write(&data) {
        w.abort();
        return Err(e);
    }
    w.finish().with_context(|| format!("publish {}", provider.path(&name)))?;
    provider.sync()?;

    for old in provider.list()? {
        if let Some(n) = parse_manifest_object_name(&old) {
            if n < num {
                if let Err(e) = provider.remove(&old) {
                    warn!("manifest: failed to remove {}: {:#}", old, e);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objstorage::MemProvider;

    #[test]
    fn newest_manifest_wins_and_old_ones_go() {
        let p = MemProvider::new();
        assert!(load_latest(&p).unwrap().is_none());

        write(&p, 1, &Manifest::new(3, 10, vec![1, 2])).unwrap();
        write(&p, 4, &Manifest::new(6, 25, vec![2, 5])).unwrap();

        let (num, m) = load_latest(&p).unwrap().unwrap();
        assert_eq!(num, 4);
        assert_eq!(m.tables, vec![2, 5]);
        assert_eq!(m.last_seq, 25);
        assert_eq!(p.list().unwrap(), vec!["MANIFEST-000004".to_string()]);
    }

    #[test]
    fn unknown_version_is_corruption() {
        let p = MemProvider::new();
        let mut m = Manifest::new(1, 0, vec![]);
        m.version = 99;
        write(&p, 1, &m).unwrap();
        assert!(load_latest(&p).is_err());
    }
}
