//! Merge operator capability.
//!
//! Merge operands are folded oldest to newest on top of an optional base value
//! (the nearest older `Set`, or nothing when a `Delete`, a covering range
//! tombstone or the end of history was reached first).

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

pub trait Merger: Send + Sync + fmt::Debug {
    /// Stable name, recorded in logs.
    fn name(&self) -> &str;

    /// Fold one operand into the accumulated value.
    fn merge(&self, key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Result<Vec<u8>>;
}

/// Default merger: byte concatenation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatMerger;

impl Merger for ConcatMerger {
    fn name(&self) -> &str {
        "quiverlsm.concatenate"
    }

    fn merge(&self, _key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(existing.map(|e| e.len()).unwrap_or(0) + operand.len());
        if let Some(e) = existing {
            out.extend_from_slice(e);
        }
        out.extend_from_slice(operand);
        Ok(out)
    }
}

pub fn default_merger() -> Arc<dyn Merger> {
    Arc::new(ConcatMerger)
}

/// Fold `operands` (newest first, as collected while walking versions) on top of `base`.
pub fn fold_operands(
    merger: &dyn Merger,
    key: &[u8],
    base: Option<&[u8]>,
    operands_newest_first: &[&[u8]],
) -> Result<Vec<u8>> {
    let mut acc: Option<Vec<u8>> = base.map(|b| b.to_vec());
    for op in operands_newest_first.iter().rev() {
        acc = Some(merger.merge(key, acc.as_deref(), op)?);
    }
    Ok(acc.unwrap_or_default())
}
