//! Immutable sorted tables.

pub mod bloom;
pub mod cache;
pub mod format;
pub mod reader;
pub mod writer;

pub use cache::{Block, BlockCache};
pub use format::Props;
pub use reader::{Table, TableScan};
pub use writer::{TableWriter, WriterOptions};

use anyhow::Result;
use std::sync::Arc;

use crate::keys::InternalKey;
use crate::objstorage::{table_object_name, Provider};
use crate::rangedel::RangeTombstone;

/// Write a whole table from sorted entries and open it for reading.
/// The partial object is aborted on error.
pub fn build_table(
    provider: &Arc<dyn Provider>,
    cache: &Arc<BlockCache>,
    file_num: u64,
    opts: WriterOptions,
    entries: &[(InternalKey, Vec<u8>)],
    tombstones: &[RangeTombstone],
) -> Result<Arc<Table>> {
    let mut w = TableWriter::new(provider.create(&table_object_name(file_num))?, opts);
    for (k, v) in entries {
        if let Err(e) = w.add(k, v) {
            w.abort();
            return Err(e);
        }
    }
    for t in tombstones {
        w.add_range_tombstone(t);
    }
    w.finish()?;
    Ok(Arc::new(Table::open(provider.clone(), cache.clone(), file_num)?))
}
