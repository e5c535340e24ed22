use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use QuiverLSM::{Db, IterOptions};

use super::util::{display_text, to_hex};

#[derive(Serialize)]
struct Item {
    key_hex: String,
    value_hex: String,
    key_len: usize,
    value_len: usize,
}

pub fn exec(path: PathBuf, prefix: Option<String>, json: bool) -> Result<()> {
    let db = Db::open(&path)?;
    let opts = match &prefix {
        Some(p) => IterOptions::prefix(p.as_bytes()),
        None => IterOptions::new(),
    };
    let mut it = db.new_iter(&opts)?;
    it.first();
    let acc = it.collect_remaining()?;
    it.close()?;
    db.close()?;

    if json {
        let items: Vec<Item> = acc
            .iter()
            .map(|(k, v)| Item {
                key_hex: to_hex(k),
                value_hex: to_hex(v),
                key_len: k.len(),
                value_len: v.len(),
            })
            .collect();
        println!("{}", serde_json::to_string(&items)?);
    } else if acc.is_empty() {
        println!("(no items)");
    } else {
        for (k, v) in acc {
            println!(
                "key='{}' ({} B) -> value '{}' ({} B)",
                display_text(&k),
                k.len(),
                display_text(&v),
                v.len()
            );
        }
    }
    Ok(())
}
