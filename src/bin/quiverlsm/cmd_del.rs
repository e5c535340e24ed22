use anyhow::Result;
use std::path::PathBuf;

use QuiverLSM::Db;

pub fn exec(path: PathBuf, key: String) -> Result<()> {
    let db = Db::open(&path)?;
    let seq = db.delete(key.as_bytes())?;
    db.close()?;
    println!("DELETED '{}' (seq={})", key, seq);
    Ok(())
}
