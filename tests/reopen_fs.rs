// tests/reopen_fs.rs
//
// Хранилище в каталоге: данные и last_seq переживают close/open,
// LOCK не даёт открыть каталог дважды, недописанные .sst удаляются.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use QuiverLSM::{is_closed, Codec, Db, DbBuilder, IterOptions};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qlsmtest-{prefix}-{pid}-{t}-{id}"))
}

#[test]
fn data_and_seq_survive_reopen() -> Result<()> {
    let root = unique_root("reopen");
    let last = {
        let db = DbBuilder::from_default().compression(Codec::Zstd).open(&root)?;
        for i in 0..500u32 {
            db.set(format!("k{:04}", i).as_bytes(), format!("v{}", i).as_bytes())?;
        }
        db.delete_range(b"k0100", b"k0200")?;
        db.merge(b"k0001", b"+")?;
        let last = db.last_seq();
        db.close()?;
        last
    };

    let db = DbBuilder::from_default().open(&root)?;
    assert_eq!(db.last_seq(), last);
    assert_eq!(db.get(b"k0001")?, Some(b"v1+".to_vec()));
    assert_eq!(db.get(b"k0150")?, None);
    assert_eq!(db.get(b"k0499")?, Some(b"v499".to_vec()));

    let seq = db.set(b"new", b"x")?;
    assert_eq!(seq, last + 1);

    let report = db.compact_all()?;
    assert_eq!(report.tombstones_dropped, 1);
    db.close()?;

    let db = Db::open(&root)?;
    assert_eq!(db.get(b"new")?, Some(b"x".to_vec()));
    assert_eq!(db.get(b"k0150")?, None);
    assert_eq!(db.stats().tables, 1);
    db.close()?;
    drop(db);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn directory_is_locked_while_open() -> Result<()> {
    let root = unique_root("lock");
    let db = DbBuilder::from_default().open(&root)?;
    assert!(DbBuilder::from_default().open(&root).is_err());
    db.close()?;
    drop(db);

    let db = DbBuilder::from_default().open(&root)?;
    db.close()?;
    drop(db);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn unreferenced_tables_are_removed_on_open() -> Result<()> {
    let root = unique_root("orphan");
    {
        let db = DbBuilder::from_default().open(&root)?;
        db.set(b"a", b"1")?;
        db.close()?;
    }
    let orphan = root.join("999999.sst");
    fs::write(&orphan, b"partial table")?;

    let db = DbBuilder::from_default().open(&root)?;
    assert!(!orphan.exists());
    assert_eq!(db.get(b"a")?, Some(b"1".to_vec()));
    assert!(db.set(b"b", b"2")? > 1);
    db.close()?;
    drop(db);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn close_releases_lock_while_handles_survive() -> Result<()> {
    let root = unique_root("release");
    let db = DbBuilder::from_default().open(&root)?;
    db.set(b"a", b"1")?;
    let snap = db.new_snapshot()?;
    let mut it = db.new_iter(&IterOptions::default())?;
    db.close()?;

    // db, snap and it are all still alive here
    let db2 = DbBuilder::from_default().open(&root)?;
    assert_eq!(db2.get(b"a")?, Some(b"1".to_vec()));
    assert!(is_closed(&snap.get(b"a").unwrap_err()));

    assert!(it.first());
    assert_eq!(it.key(), b"a");

    snap.close()?;
    drop(it);
    drop(db);
    db2.close()?;
    drop(db2);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}
