use anyhow::Result;
use std::path::PathBuf;

use QuiverLSM::Db;

use super::util::{decode_value_arg, display_text};

pub fn exec(path: PathBuf, key: String, operand: String) -> Result<()> {
    let op = decode_value_arg(&operand)?;
    let db = Db::open(&path)?;
    let seq = db.merge(key.as_bytes(), &op)?;
    let merged = db.get(key.as_bytes())?;
    db.close()?;
    println!("OK merge: key='{}', operand={} B, seq={}", key, op.len(), seq);
    if let Some(v) = merged {
        println!("now: {}", display_text(&v));
    }
    Ok(())
}
