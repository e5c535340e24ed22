// tests/rangedel_stress.rs
//
// Каждый раунд r пишет 2*runs ключей (runs*i + r), удаляет диапазон
// [mid - runs*r, mid + runs*r) и снимает снапшот. Диапазоны вложены и растут,
// поэтому снапшот раунда r должен видеть ровно
//   (r+1)*2*runs - 2*r*(r+1)
// ключей, даже когда все снапшоты читаются параллельно.
//
// Второй сценарий меньше, но с мелкой memtable: данные уходят в таблицы и
// компактуются под открытыми снапшотами.

use anyhow::Result;

use QuiverLSM::{Db, DbBuilder, IterOptions, Snapshot};

fn key(n: u64) -> Vec<u8> {
    format!("{:08}", n).into_bytes()
}

fn expected(runs: u64, r: u64) -> u64 {
    (r + 1) * 2 * runs - 2 * r * (r + 1)
}

fn count(s: &Snapshot) -> Result<u64> {
    let mut it = s.new_iter(&IterOptions::default())?;
    let mut n = 0u64;
    let mut ok = it.first();
    while ok {
        n += 1;
        ok = it.next();
    }
    it.close()?;
    Ok(n)
}

/// Write all rounds, returning one snapshot per round.
fn fill(db: &Db, runs: u64) -> Result<Vec<Snapshot>> {
    let mid = runs * runs;
    let mut snaps = Vec::with_capacity(runs as usize);
    for r in 0..runs {
        for i in 0..2 * runs {
            db.set(&key(runs * i + r), format!("v{}", r).as_bytes())?;
        }
        // round 0 deletes the empty range [mid, mid)
        if r > 0 {
            db.delete_range(&key(mid - runs * r), &key(mid + runs * r))?;
        }
        snaps.push(db.new_snapshot()?);
    }
    Ok(snaps)
}

fn count_concurrently(runs: u64, snaps: &[Snapshot]) -> Result<()> {
    std::thread::scope(|scope| -> Result<()> {
        let workers: Vec<_> = snaps
            .iter()
            .enumerate()
            .map(|(r, s)| scope.spawn(move || count(s).map(|n| (r as u64, n))))
            .collect();
        for w in workers {
            let (r, n) = w
                .join()
                .map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
            assert_eq!(n, expected(runs, r), "snapshot of round {}", r);
        }
        Ok(())
    })
}

#[test]
fn range_deletion_count_200_concurrent_snapshots() -> Result<()> {
    const RUNS: u64 = 200;
    let db = DbBuilder::from_default()
        .memtable_size_bytes(64 << 20)
        .open_in_memory()?;

    let snaps = fill(&db, RUNS)?;
    assert_eq!(db.snapshot_seqs().len(), RUNS as usize);
    count_concurrently(RUNS, &snaps)?;

    for s in &snaps {
        s.close()?;
    }
    db.close()?;
    Ok(())
}

#[test]
fn range_deletion_count_survives_flush_and_compaction() -> Result<()> {
    const RUNS: u64 = 40;
    let db = DbBuilder::from_default()
        .memtable_size_bytes(16 << 10)
        .l0_compaction_threshold(4)
        .block_size(512)
        .open_in_memory()?;

    let snaps = fill(&db, RUNS)?;
    assert!(db.stats().tables > 0, "expected some flushed tables");
    count_concurrently(RUNS, &snaps)?;

    db.compact_all()?;
    count_concurrently(RUNS, &snaps)?;

    for s in &snaps {
        s.close()?;
    }
    let report = db.compact_all()?;
    assert_eq!(report.tombstones_dropped, report.tombstones_in);

    let mut it = db.new_iter(&IterOptions::default())?;
    it.first();
    let n = it.collect_remaining()?.len() as u64;
    assert_eq!(n, expected(RUNS, RUNS - 1));
    db.close()?;
    Ok(())
}
