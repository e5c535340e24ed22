use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use QuiverLSM::metrics::{metrics_snapshot, MetricsSnapshot};
use QuiverLSM::{Db, DbStats};

#[derive(Serialize)]
struct Status<'a> {
    path: String,
    config: String,
    db: &'a DbStats,
    metrics: &'a MetricsSnapshot,
}

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let db = Db::open(&path)?;
    let stats = db.stats();
    let config = db.config().to_string();
    let ms = metrics_snapshot();
    db.close()?;

    if json {
        let st = Status {
            path: path.display().to_string(),
            config,
            db: &stats,
            metrics: &ms,
        };
        println!("{}", serde_json::to_string(&st)?);
        return Ok(());
    }

    println!("path:               {}", path.display());
    println!("config:             {}", config);
    println!("last_seq:           {}", stats.last_seq);
    println!("tables:             {} ({} B)", stats.tables, stats.table_bytes);
    println!(
        "memtables:          {} B ({} immutable)",
        stats.memtable_bytes, stats.immutable_memtables
    );
    println!("open snapshots:     {}", stats.open_snapshots);
    println!("gc horizon:         {}", stats.gc_horizon);
    println!(
        "block cache:        hits={} misses={} ratio={:.2}",
        ms.block_cache_hits,
        ms.block_cache_misses,
        ms.cache_hit_ratio()
    );
    println!("bloom skips:        {}", ms.bloom_skips);
    Ok(())
}
