//! db - движок поверх memtables и таблиц.
//!
//! Разделение по подмодулям:
//! - core.rs       - Db, DbInner/DbState (точка сериализации), Version, install(), close/Drop
//! - open.rs       - открытие (Fs/Mem провайдер), загрузка манифеста, чистка сирот
//! - write.rs      - set/delete/merge/delete_range
//! - view.rs       - ReadView: слияние источников + правило видимости
//! - flush.rs      - flush immutable memtables, авто-компакция
//! - compaction.rs - компакция с учётом GC-горизонта
//! - gc.rs         - GcHorizon

pub mod compaction;
pub mod core;
pub mod flush;
pub mod gc;
pub mod open;
pub(crate) mod view;
pub mod write;

pub use compaction::CompactReport;
pub use self::core::{Db, DbStats};
pub use gc::GcHorizon;
