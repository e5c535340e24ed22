//! Kinded error causes.
//!
//! Public API returns `anyhow::Result`; the root cause of every failure that a
//! caller may want to branch on is an `LsmError`. Use `kind_of` / `is_closed`
//! to inspect it through the anyhow chain.

use thiserror::Error;

use crate::keys::SeqNum;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LsmError {
    /// Operation on a released snapshot or a closed engine.
    #[error("quiverlsm: closed")]
    Closed,

    /// Key range with start >= end.
    #[error("invalid key range: start must be < end")]
    InvalidRange,

    /// Explicit-sequence snapshot that would not be consistent.
    #[error("invalid snapshot sequence number {seq}: {reason}")]
    InvalidSnapshotSeq { seq: SeqNum, reason: &'static str },

    /// Registry handle is stale or was never registered.
    #[error("snapshot is not registered")]
    NotRegistered,

    /// No sequence number left to assign.
    #[error("sequence number space exhausted at {last}")]
    SeqExhausted { last: SeqNum },

    /// Storage read aborted by a cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Checksum or format violation in a stored object.
    #[error("corruption: {0}")]
    Corruption(String),
}

/// Root `LsmError` of an anyhow chain, if any.
pub fn kind_of(err: &anyhow::Error) -> Option<&LsmError> {
    err.chain().find_map(|e| e.downcast_ref::<LsmError>())
}

/// True when the error is the closed sentinel.
pub fn is_closed(err: &anyhow::Error) -> bool {
    matches!(kind_of(err), Some(LsmError::Closed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_context() {
        let r: anyhow::Result<()> = Err(LsmError::Closed.into());
        let err = r.context("snapshot get").unwrap_err();
        assert!(is_closed(&err));
        assert_eq!(kind_of(&err), Some(&LsmError::Closed));
    }

    #[test]
    fn other_errors_have_no_kind() {
        let err = anyhow::anyhow!("plain");
        assert!(kind_of(&err).is_none());
        assert!(!is_closed(&err));
    }
}
