use anyhow::{Context, Result};
use std::path::PathBuf;

use QuiverLSM::Db;

use super::util::{display_text, to_hex};

pub fn exec(path: PathBuf, key: String, out: Option<PathBuf>) -> Result<()> {
    let db = Db::open(&path)?;
    let found = db.get(key.as_bytes())?;
    db.close()?;

    match found {
        Some(v) => match out {
            Some(out_path) => {
                if let Some(parent) = out_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                std::fs::write(&out_path, &v)
                    .with_context(|| format!("write {}", out_path.display()))?;
                println!("FOUND '{}': {} B -> wrote to {}", key, v.len(), out_path.display());
            }
            None => {
                println!("FOUND '{}': {} B", key, v.len());
                println!("text: {}", display_text(&v));
                println!("hex:  {}", to_hex(&v[..v.len().min(64)]));
            }
        },
        None => println!("NOT FOUND '{}'", key),
    }
    Ok(())
}
