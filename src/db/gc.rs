//! GC horizon: the oldest sequence number an open snapshot still reads at.

use serde::Serialize;
use std::fmt;

use crate::keys::{SeqNum, SEQ_MAX};
use crate::snapshots::SnapshotRegistry;

use super::core::Db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GcHorizon {
    /// Versions needed at or above this seq must be kept.
    Bounded(SeqNum),
    /// No open snapshot: only the newest state has to survive.
    Unbounded,
}

impl GcHorizon {
    pub fn from_registry(reg: &SnapshotRegistry) -> Self {
        match reg.oldest() {
            Some(s) => GcHorizon::Bounded(s),
            None => GcHorizon::Unbounded,
        }
    }

    pub fn bound(self) -> Option<SeqNum> {
        match self {
            GcHorizon::Bounded(s) => Some(s),
            GcHorizon::Unbounded => None,
        }
    }

    /// Exclusive limit G: history strictly below G is collectable.
    pub(crate) fn limit(self) -> SeqNum {
        match self {
            GcHorizon::Bounded(s) => s,
            GcHorizon::Unbounded => SEQ_MAX + 1,
        }
    }
}

impl fmt::Display for GcHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcHorizon::Bounded(s) => write!(f, "{}", s),
            GcHorizon::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl Db {
    /// Minimum seq over open snapshots, or Unbounded when none is open.
    pub fn current_gc_horizon(&self) -> GcHorizon {
        GcHorizon::from_registry(&self.inner.lock_state().snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_tracks_oldest_registration() {
        let mut r = SnapshotRegistry::new();
        assert_eq!(GcHorizon::from_registry(&r), GcHorizon::Unbounded);
        let a = r.push_back(4);
        let b = r.push_back(4);
        let c = r.push_back(9);
        assert_eq!(GcHorizon::from_registry(&r), GcHorizon::Bounded(4));
        r.remove(a).unwrap();
        assert_eq!(GcHorizon::from_registry(&r), GcHorizon::Bounded(4));
        r.remove(b).unwrap();
        assert_eq!(GcHorizon::from_registry(&r).bound(), Some(9));
        r.remove(c).unwrap();
        assert_eq!(GcHorizon::from_registry(&r).limit(), SEQ_MAX + 1);
        assert_eq!(GcHorizon::Unbounded.to_string(), "unbounded");
    }
}
