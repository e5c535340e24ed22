use anyhow::Result;
use std::path::PathBuf;

use QuiverLSM::Db;

pub fn exec(path: PathBuf, start: String, end: String) -> Result<()> {
    let db = Db::open(&path)?;
    let seq = db.delete_range(start.as_bytes(), end.as_bytes())?;
    db.close()?;
    println!("DELETED RANGE ['{}', '{}') (seq={})", start, end, seq);
    Ok(())
}
