//! Snapshots module split into submodules:
//! - registry.rs: SnapshotRegistry (ordered slot-map of open snapshot seqs) and SnapshotId.
//! - handle.rs: Snapshot lease (get/iter/scan/close) and Db::new_snapshot*.

mod handle;
mod registry;

pub use handle::Snapshot;
pub use registry::{SnapshotId, SnapshotRegistry};
