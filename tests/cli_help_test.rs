use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ehr(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ehr-workflows").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env("EHR_WORKFLOWS_OBSERVABILITY__JSON_LOGS", "false");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("ehr-workflows").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("expire-unlocks"))
        .stdout(predicate::str::contains("expire-offers"))
        .stdout(predicate::str::contains("resolve-attestation"))
        .stdout(predicate::str::contains("init-config"));
}

#[test]
fn test_missing_subcommand_is_an_error() {
    let mut cmd = Command::cargo_bin("ehr-workflows").unwrap();
    cmd.assert().failure();
}

#[test]
fn test_init_config_writes_file_once() {
    let dir = TempDir::new().unwrap();

    ehr(&dir)
        .arg("init-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("ehr-workflows.toml"));
    assert!(dir.path().join("ehr-workflows.toml").exists());

    ehr(&dir)
        .arg("init-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    ehr(&dir).args(["init-config", "--force"]).assert().success();
}

#[test]
fn test_sweeps_run_against_in_memory_store() {
    let dir = TempDir::new().unwrap();

    ehr(&dir)
        .args(["--in-memory", "expire-unlocks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Relocked 0 note(s)"));

    ehr(&dir)
        .args(["--in-memory", "expire-offers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Returned 0 expired offer(s)"));
}

#[test]
fn test_resolve_attestation_without_rows_fails() {
    let dir = TempDir::new().unwrap();

    ehr(&dir)
        .args([
            "--in-memory",
            "resolve-attestation",
            "--role",
            "CLINICIAN",
            "--note-type",
            "Progress Note",
            "--jurisdiction",
            "GA",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no attestation configured"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("ehr-workflows.toml"),
        "[notes]\nmax_unlock_window_hours = 0\n",
    )
    .unwrap();

    ehr(&dir)
        .args(["--in-memory", "expire-unlocks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_unlock_window_hours"));
}
