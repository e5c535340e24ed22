use anyhow::Result;
use std::path::PathBuf;

use QuiverLSM::Db;

pub fn exec(path: PathBuf, start: Option<String>, end: Option<String>, json: bool) -> Result<()> {
    let db = Db::open(&path)?;
    let report = match (&start, &end) {
        (Some(s), Some(e)) => db.compact(s.as_bytes(), e.as_bytes())?,
        _ => db.compact_all()?,
    };
    db.close()?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!("Compaction (horizon {}):", report.horizon);
    println!("  tables:      {:?} -> {:?}", report.inputs, report.outputs);
    println!("  bytes:       {} -> {}", report.bytes_in, report.bytes_out);
    println!("  entries:     {} -> {}", report.entries_in, report.entries_out);
    println!("  versions dropped:   {}", report.versions_dropped);
    println!(
        "  range tombstones:   {} ({} dropped)",
        report.tombstones_in, report.tombstones_dropped
    );
    Ok(())
}
