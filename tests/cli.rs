use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn archiver(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lecture-archiver").unwrap();
    cmd.current_dir(temp.path())
        .arg("--config")
        .arg(temp.path().join("config.yaml"))
        .env_remove("RUST_LOG")
        .env_remove("IA_ACCESS_KEY")
        .env_remove("IA_SECRET_KEY");
    cmd
}

#[test]
fn process_rejects_missing_folder() {
    let temp = TempDir::new().unwrap();

    archiver(&temp)
        .args(["process", "does-not-exist", "--upload-only"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Not a directory"));
}

#[test]
fn process_requires_a_folder() {
    let temp = TempDir::new().unwrap();

    archiver(&temp).arg("process").assert().failure();
}

#[test]
fn history_is_empty_on_first_run() {
    let temp = TempDir::new().unwrap();

    archiver(&temp)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No upload history yet."));

    assert!(temp.path().join("config.yaml").exists());
}

#[test]
fn dry_run_tag_only_leaves_folder_untouched() {
    let temp = TempDir::new().unwrap();
    let folder = temp.path().join("21_Kitab ul Taharat");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("01.mp3"), b"not really audio").unwrap();

    archiver(&temp)
        .args(["process", "--tag-only", "--dry-run"])
        .arg(&folder)
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN] Would tag metadata"));

    assert_eq!(std::fs::read(folder.join("01.mp3")).unwrap(), b"not really audio");
}

#[test]
fn sync_status_without_history() {
    let temp = TempDir::new().unwrap();

    archiver(&temp)
        .args(["sync", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No items in upload history."));
}
