// tests/compaction_gc.rs
//
// Компакция и GC-горизонт:
// - версии, нужные открытым снапшотам, переживают компакцию;
// - после закрытия снапшотов история схлопывается до одной записи;
// - range-tombstones ниже горизонта удаляются вместе с тем, что они скрывают;
// - merge-операнды сворачиваются в Set без изменения видимого значения.

use anyhow::Result;

use QuiverLSM::{kind_of, DbBuilder, GcHorizon, LsmError};

#[test]
fn snapshots_pin_history_through_compaction() -> Result<()> {
    let db = DbBuilder::from_default().open_in_memory()?;

    db.set(b"k", b"v1")?;
    let s1 = db.new_snapshot()?;
    db.set(b"k", b"v2")?;
    db.delete(b"k")?;
    let s2 = db.new_snapshot()?;
    db.set(b"k", b"v3")?;

    let report = db.compact_all()?;
    assert_eq!(report.horizon, GcHorizon::Bounded(s1.seq()));
    assert_eq!(report.entries_in, 4);
    assert_eq!(report.entries_out, 4);

    assert_eq!(s1.get(b"k")?, Some(b"v1".to_vec()));
    assert_eq!(s2.get(b"k")?, None);
    assert_eq!(db.get(b"k")?, Some(b"v3".to_vec()));

    // with s1 gone, v1 is shadowed by v2 below the horizon
    s1.close()?;
    let report = db.compact_all()?;
    assert_eq!(report.horizon, GcHorizon::Bounded(s2.seq()));
    assert_eq!(report.entries_out, 3);
    assert_eq!(report.versions_dropped, 1);
    assert_eq!(s2.get(b"k")?, None);

    s2.close()?;
    let report = db.compact_all()?;
    assert_eq!(report.horizon, GcHorizon::Unbounded);
    assert_eq!(report.entries_in, 3);
    assert_eq!(report.entries_out, 1);
    assert_eq!(report.versions_dropped, 2);
    assert_eq!(db.get(b"k")?, Some(b"v3".to_vec()));
    assert_eq!(db.stats().tables, 1);
    db.close()?;
    Ok(())
}

#[test]
fn range_tombstones_dropped_below_horizon() -> Result<()> {
    let db = DbBuilder::from_default().open_in_memory()?;
    for i in 0..100u32 {
        db.set(format!("k{:03}", i).as_bytes(), b"v")?;
    }
    db.flush()?;
    db.delete_range(b"k010", b"k090")?;
    let s = db.new_snapshot()?;

    let report = db.compact_all()?;
    assert_eq!(report.tombstones_in, 1);
    assert_eq!(report.tombstones_dropped, 0, "tombstone at the horizon must stay");
    assert_eq!(db.get(b"k050")?, None);
    assert_eq!(s.scan_all()?.len(), 20);
    s.close()?;

    let report = db.compact_all()?;
    assert_eq!(report.tombstones_in, 1);
    assert_eq!(report.tombstones_dropped, 1);
    assert_eq!(report.entries_out, 20);
    assert_eq!(db.get(b"k050")?, None);
    assert_eq!(db.get(b"k005")?, Some(b"v".to_vec()));
    assert_eq!(db.get(b"k095")?, Some(b"v".to_vec()));

    // a later write into the deleted range is visible again
    db.set(b"k050", b"back")?;
    assert_eq!(db.get(b"k050")?, Some(b"back".to_vec()));
    db.close()?;
    Ok(())
}

#[test]
fn merges_across_tables_fold_into_one_value() -> Result<()> {
    let db = DbBuilder::from_default().open_in_memory()?;
    db.set(b"m", b"a")?;
    db.flush()?;
    db.merge(b"m", b"b")?;
    db.flush()?;
    let s = db.new_snapshot()?;
    db.merge(b"m", b"c")?;
    assert_eq!(db.get(b"m")?, Some(b"abc".to_vec()));
    assert_eq!(s.get(b"m")?, Some(b"ab".to_vec()));

    db.compact_all()?;
    assert_eq!(db.get(b"m")?, Some(b"abc".to_vec()));
    assert_eq!(s.get(b"m")?, Some(b"ab".to_vec()));
    s.close()?;

    let report = db.compact_all()?;
    assert_eq!(report.entries_out, 1);
    assert_eq!(db.get(b"m")?, Some(b"abc".to_vec()));

    // merge after a delete starts from scratch
    db.delete(b"m")?;
    db.merge(b"m", b"z")?;
    assert_eq!(db.get(b"m")?, Some(b"z".to_vec()));
    db.compact_all()?;
    assert_eq!(db.get(b"m")?, Some(b"z".to_vec()));
    db.close()?;
    Ok(())
}

#[test]
fn partial_compaction_keeps_other_tables() -> Result<()> {
    let db = DbBuilder::from_default()
        .l0_compaction_threshold(0)
        .open_in_memory()?;
    db.set(b"a1", b"x")?;
    db.set(b"a2", b"x")?;
    db.flush()?;
    db.set(b"z1", b"y")?;
    db.flush()?;
    db.set(b"a1", b"x2")?;
    db.flush()?;
    assert_eq!(db.stats().tables, 3);

    let report = db.compact(b"a0", b"a9")?;
    assert_eq!(report.inputs.len(), 2);
    assert_eq!(db.stats().tables, 2);
    assert_eq!(db.get(b"a1")?, Some(b"x2".to_vec()));
    assert_eq!(db.get(b"z1")?, Some(b"y".to_vec()));

    let err = db.compact(b"b", b"a").unwrap_err();
    assert_eq!(kind_of(&err), Some(&LsmError::InvalidRange));
    db.close()?;
    Ok(())
}

#[test]
fn auto_compaction_bounds_table_count() -> Result<()> {
    let db = DbBuilder::from_default()
        .l0_compaction_threshold(4)
        .open_in_memory()?;
    for round in 0..10u32 {
        for i in 0..20u32 {
            db.set(format!("k{:02}", i).as_bytes(), format!("r{}", round).as_bytes())?;
        }
        db.flush()?;
    }
    assert!(db.stats().tables < 4, "tables: {}", db.stats().tables);
    for i in 0..20u32 {
        assert_eq!(db.get(format!("k{:02}", i).as_bytes())?, Some(b"r9".to_vec()));
    }
    db.close()?;
    Ok(())
}
