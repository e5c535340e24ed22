#![allow(non_snake_case)]

// Базовые типы и окружение
pub mod consts;
pub mod error;
pub mod config;
pub mod metrics;
pub mod lock;
pub mod cancel;

// Ключи, версии и правило видимости
pub mod keys;     // SeqNum, Kind, InternalKey, Entry
pub mod merge;    // Merger (pluggable fold), ConcatMerger
pub mod rangedel; // RangeTombstone, Fragments
pub mod visibility;

// Хранилище: memtable, объекты, sorted tables
pub mod memtable;
pub mod objstorage; // src/objstorage/{mod,mem,fs}.rs
pub mod sstable;    // src/sstable/{mod,format,writer,reader,bloom,cache}.rs
pub mod manifest;

// Снапшоты и движок
pub mod snapshots; // src/snapshots/{mod,registry,handle}.rs
pub mod iterator;
pub mod db;        // src/db/{mod,core,open,write,view,flush,compaction,gc}.rs

// Удобные реэкспорты
pub use cancel::CancelToken;
pub use config::{Codec, DbBuilder, LsmConfig};
pub use db::{CompactReport, Db, DbStats, GcHorizon};
pub use error::{is_closed, kind_of, LsmError};
pub use iterator::{DbIterator, IterOptions};
pub use keys::{Kind, SeqNum, SEQ_MAX};
pub use merge::{ConcatMerger, Merger};
pub use snapshots::{Snapshot, SnapshotId, SnapshotRegistry};
