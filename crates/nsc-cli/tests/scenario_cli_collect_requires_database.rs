use assert_cmd::Command;
use predicates::prelude::*;

/// A missing connection URL is fatal and reported before any input is read.
#[test]
fn collect_fails_fast_without_database_url() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("collector.yaml");
    std::fs::write(
        &cfg,
        "collector:\n  batch_size: 10\ndatabase:\n  url_env: NSC_TEST_UNSET_DB_URL\n",
    )?;
    // Input deliberately absent: the connection check must fail first.
    let input = dir.path().join("missing.jsonl");

    Command::cargo_bin("nsc")?
        .current_dir(dir.path())
        .env_remove("NSC_TEST_UNSET_DB_URL")
        .args([
            "collect",
            "--config",
            cfg.to_str().expect("utf8 path"),
            "--input",
            input.to_str().expect("utf8 path"),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing env var NSC_TEST_UNSET_DB_URL"));
    Ok(())
}

#[test]
fn zero_batch_size_override_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("collector.yaml");
    std::fs::write(&cfg, "collector:\n  batch_size: 10\n")?;

    Command::cargo_bin("nsc")?
        .current_dir(dir.path())
        .args([
            "collect",
            "--config",
            cfg.to_str().expect("utf8 path"),
            "--input",
            "unused.jsonl",
            "--batch-size",
            "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size must be > 0"));
    Ok(())
}
