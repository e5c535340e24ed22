use anyhow::{anyhow, Result};
use std::path::PathBuf;

use QuiverLSM::Db;

use super::util::{decode_value_arg, read_all};

pub fn exec(path: PathBuf, key: String, value: Option<String>, value_file: Option<PathBuf>) -> Result<()> {
    let val = match (value, value_file) {
        (_, Some(p)) => read_all(&p)?,
        (Some(s), None) => decode_value_arg(&s)?,
        (None, None) => return Err(anyhow!("either --value or --value-file must be provided")),
    };

    let db = Db::open(&path)?;
    let seq = db.set(key.as_bytes(), &val)?;
    db.close()?;
    println!("OK set: key='{}' ({} B), value={} B, seq={}", key, key.len(), val.len(), seq);
    Ok(())
}
