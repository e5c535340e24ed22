// tests/cli_json.rs
//
// Бинарь quiverlsm: put/merge/delrange/scan/compact/status, JSON-вывод
// разбирается serde_json.

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qlsmtest-cli-{prefix}-{pid}-{t}-{id}"))
}

fn cli(root: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new(env!("CARGO_BIN_EXE_quiverlsm"))
        .arg(args[0])
        .arg("--path")
        .arg(root)
        .args(&args[1..])
        .env("RUST_LOG", "off")
        .output()?;
    if !out.status.success() {
        return Err(anyhow!(
            "quiverlsm {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(String::from_utf8(out.stdout)?)
}

#[test]
fn commands_round_trip_through_store() -> Result<()> {
    let root = unique_root("basic");

    cli(&root, &["put", "--key", "alpha", "--value", "1"])?;
    cli(&root, &["put", "--key", "beta", "--value", "hex:6869"])?;
    cli(&root, &["put", "--key", "gamma", "--value", "3"])?;
    cli(&root, &["merge", "--key", "alpha", "--operand", "+"])?;
    cli(&root, &["del-range", "--start", "gamma", "--end", "gz"])?;

    let got = cli(&root, &["get", "--key", "alpha"])?;
    assert!(got.contains("FOUND 'alpha': 2 B"), "{}", got);
    let got = cli(&root, &["get", "--key", "gamma"])?;
    assert!(got.contains("NOT FOUND"), "{}", got);

    let scan: serde_json::Value = serde_json::from_str(&cli(&root, &["scan", "--json"])?)?;
    let items = scan.as_array().ok_or_else(|| anyhow!("scan output is not an array"))?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["key_hex"], "616c706861");
    assert_eq!(items[0]["value_hex"], "312b");
    assert_eq!(items[1]["value_hex"], "6869");

    let report: serde_json::Value = serde_json::from_str(&cli(&root, &["compact", "--json"])?)?;
    assert_eq!(report["horizon"], "unbounded");
    assert_eq!(report["tombstones_dropped"], 1);

    let status: serde_json::Value = serde_json::from_str(&cli(&root, &["status", "--json"])?)?;
    assert_eq!(status["db"]["last_seq"], 5);
    assert_eq!(status["db"]["tables"], 1);
    assert_eq!(status["db"]["open_snapshots"], 0);

    cli(&root, &["del", "--key", "alpha"])?;
    let got = cli(&root, &["scan", "--prefix", "al"])?;
    assert!(got.contains("(no items)"), "{}", got);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn invalid_range_fails() -> Result<()> {
    let root = unique_root("badrange");
    assert!(cli(&root, &["del-range", "--start", "b", "--end", "a"]).is_err());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}
