use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn simarchive(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("simarchive");
    cmd.env("SIMARCHIVE_HOME", home)
        .env("SIMARCHIVE_CONFIG_PATH", home.join("missing.toml"));
    cmd
}

#[test]
fn status_reports_idle_workdir_and_ledger_sizes() {
    let tmp = tempdir().expect("tempdir");
    let workdir = tmp.path().join("run3");
    fs::create_dir_all(workdir.join("plotfiles")).expect("mkdir");
    fs::write(workdir.join("plotfiles/processed.out"), "plt00010\nplt00020\n").expect("ledger");

    simarchive(tmp.path())
        .arg("--workdir")
        .arg(&workdir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("daemon.lock=not_found"))
        .stdout(predicate::str::contains("ledger.plotfiles=2"))
        .stdout(predicate::str::contains("ledger.checkpoints=0"));
}

#[test]
fn status_flags_stale_lock() {
    let tmp = tempdir().expect("tempdir");
    let workdir = tmp.path().join("run3");
    fs::create_dir_all(&workdir).expect("mkdir");
    fs::write(
        workdir.join("simarchive.lock"),
        r#"{"pid":4194303,"build_uuid":"old","start_time":"2014-03-12T09:45:00+00:00","workdir":"/scratch/run3","remote_base":"/projects/sim"}"#,
    )
    .expect("write lock");

    simarchive(tmp.path())
        .arg("--workdir")
        .arg(&workdir)
        .arg("--json")
        .arg("status")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"ok\": false"))
        .stdout(predicate::str::contains("stale lock"));
}
