use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn make_item(workdir: &Path, name: &str) {
    let dir = workdir.join(name);
    fs::create_dir_all(&dir).expect("mkdir item");
    fs::write(dir.join("HEADER"), "HyperCLaw-V1.1\n").expect("write marker");
}

#[test]
fn scan_lists_pending_items_without_transferring() {
    let tmp = tempdir().expect("tempdir");
    let workdir = tmp.path().join("run7");
    fs::create_dir_all(&workdir).expect("mkdir workdir");
    for name in ["chk00100", "chk00200", "chk00300", "plt00100", "plt00200"] {
        make_item(&workdir, name);
    }
    fs::create_dir_all(workdir.join("checkfiles")).expect("mkdir processed");
    fs::write(workdir.join("checkfiles/processed.out"), "chk00100\n").expect("write ledger");

    assert_cmd::cargo::cargo_bin_cmd!("simarchive")
        .env("SIMARCHIVE_HOME", tmp.path())
        .env("SIMARCHIVE_CONFIG_PATH", tmp.path().join("missing.toml"))
        .env("SIMARCHIVE_SSH_BIN", tmp.path().join("no-such-ssh"))
        .arg("--workdir")
        .arg(&workdir)
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("pending.checkpoints=-"))
        .stdout(predicate::str::contains("pending.plotfiles=plt00100"))
        .stdout(predicate::str::contains("pending.diagnostics=false"));

    assert!(workdir.join("chk00200").is_dir());
    assert!(!workdir.join("simarchive.lock").exists());
}

#[test]
fn scan_honors_keep_recent_from_config_file() {
    let tmp = tempdir().expect("tempdir");
    let workdir = tmp.path().join("run7");
    fs::create_dir_all(&workdir).expect("mkdir workdir");
    for name in ["chk00100", "chk00200", "chk00300"] {
        make_item(&workdir, name);
    }
    let config = tmp.path().join("simarchive.toml");
    fs::write(
        &config,
        "[checkpoints]\nprefix = \"chk\"\nprocessed_dir = \"checkfiles\"\nkeep_recent = 0\n",
    )
    .expect("write config");

    assert_cmd::cargo::cargo_bin_cmd!("simarchive")
        .env("SIMARCHIVE_HOME", tmp.path())
        .env("SIMARCHIVE_CONFIG_PATH", &config)
        .arg("--workdir")
        .arg(&workdir)
        .arg("--json")
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "pending.checkpoints=chk00100,chk00200,chk00300",
        ));
}

#[test]
fn invalid_config_is_reported() {
    let tmp = tempdir().expect("tempdir");
    let config = tmp.path().join("simarchive.toml");
    fs::write(&config, "[watcher]\npoll_interval_secs = 0\n").expect("write config");

    assert_cmd::cargo::cargo_bin_cmd!("simarchive")
        .env("SIMARCHIVE_HOME", tmp.path())
        .env("SIMARCHIVE_CONFIG_PATH", &config)
        .arg("--workdir")
        .arg(tmp.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("E002_CONFIG_INVALID"));
}
