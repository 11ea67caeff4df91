#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tagbase_core::ContentHash;
use tempfile::TempDir;

const LOCAL_KEY: &str = "6d7c1a52-3f4e-4b8a-9c1d-2e5f7a9b0c11";
const REPO_KEY: &str = "0b9e8d7c-6a5f-4e3d-8c2b-1a0f9e8d7c6b";

fn tagbasectl(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tagbasectl").unwrap();
    cmd.env_remove("TAGBASE_CONFIG")
        .env("RUST_LOG", "warn")
        .arg("--database")
        .arg(db);
    cmd
}

fn register(db: &Path, kind: &str, name: &str, key: &str) {
    tagbasectl(db)
        .args(["service", "register", "--type", kind, "--name", name, "--key", key])
        .assert()
        .success()
        .stdout(contains("Service registered"));
}

fn write_batch(dir: &Path, name: &str, json: serde_json::Value) -> String {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
    path.display().to_string()
}

#[test]
fn register_apply_and_query() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("tags.db");
    let hash = ContentHash::compute(b"metroid.png").to_hex();

    register(&db, "local-tag", "my tags", LOCAL_KEY);
    tagbasectl(&db)
        .args(["service", "list"])
        .assert()
        .success()
        .stdout(contains("my tags"))
        .stdout(contains("combined_tag"));

    let batch = write_batch(
        temp.path(),
        "batch.json",
        serde_json::json!({
            LOCAL_KEY: [
                {"kind": "mappings", "action": "add", "tag": "Series:Metroid", "hashes": [hash]}
            ]
        }),
    );
    tagbasectl(&db)
        .args(["apply", &batch])
        .assert()
        .success()
        .stdout(contains("1 mappings"));

    for service in [LOCAL_KEY, "all-tags"] {
        tagbasectl(&db)
            .args(["status", "--service", service, "--tag", "series:metroid", "--hash", &hash])
            .assert()
            .success()
            .stdout(contains("current"));
    }
    tagbasectl(&db)
        .args(["status", "--service", LOCAL_KEY, "--tag", "samus", "--hash", &hash])
        .assert()
        .success()
        .stdout(contains("absent"));

    tagbasectl(&db)
        .args(["autocomplete", "series:met"])
        .assert()
        .success()
        .stdout(contains("series:metroid"));
    tagbasectl(&db)
        .args(["tagged", "--tag-service", LOCAL_KEY])
        .assert()
        .success()
        .stdout("1\n");

    // reapplying changes nothing
    tagbasectl(&db)
        .args(["apply", &batch])
        .assert()
        .success()
        .stdout(contains("No changes."));
}

#[test]
fn apply_reads_stdin_and_lists_petitions() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("tags.db");
    let hash = ContentHash::compute(b"ridley.png").to_hex();

    register(&db, "tag-repository", "public tags", REPO_KEY);
    let batch = serde_json::json!({
        REPO_KEY: [
            {"kind": "mappings", "action": "add", "tag": "character:ridley", "hashes": [hash]},
            {"kind": "mappings", "action": "petition", "reason": "wrong character",
             "tag": "character:ridley", "hashes": [hash]}
        ]
    });
    tagbasectl(&db)
        .args(["apply", "-"])
        .write_stdin(serde_json::to_string(&batch).unwrap())
        .assert()
        .success()
        .stdout(contains("1 petitions"));

    tagbasectl(&db)
        .args(["petitions", REPO_KEY])
        .assert()
        .success()
        .stdout(contains("character:ridley"))
        .stdout(contains("wrong character"));
}

#[test]
fn precedence_show_and_set() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("tags.db");

    register(&db, "local-tag", "my tags", LOCAL_KEY);
    register(&db, "tag-repository", "public tags", REPO_KEY);

    tagbasectl(&db)
        .args(["precedence", "show"])
        .assert()
        .success()
        .stdout(contains(format!("1  {LOCAL_KEY}")))
        .stdout(contains(format!("2  {REPO_KEY}")));

    tagbasectl(&db)
        .args(["precedence", "set", REPO_KEY, LOCAL_KEY])
        .assert()
        .success();
    tagbasectl(&db)
        .args(["precedence", "show"])
        .assert()
        .success()
        .stdout(contains(format!("1  {REPO_KEY}")));

    // an incomplete order is rejected
    tagbasectl(&db)
        .args(["precedence", "set", REPO_KEY])
        .assert()
        .failure()
        .stderr(contains("precedence"));
}

#[test]
fn rebuild_commands_succeed() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("tags.db");

    tagbasectl(&db)
        .args(["rebuild", "combined"])
        .assert()
        .success()
        .stdout(contains("Combined view rebuilt"));
    tagbasectl(&db)
        .args(["rebuild", "autocomplete"])
        .assert()
        .success()
        .stdout(contains("Autocomplete cache rebuilt"));
}

#[test]
fn rejects_bad_input() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("tags.db");

    tagbasectl(&db)
        .args(["service", "remove", "not-a-key"])
        .assert()
        .failure()
        .stderr(contains("invalid service key"));
    tagbasectl(&db)
        .args(["service", "remove", "all-tags"])
        .assert()
        .failure();

    let batch = write_batch(temp.path(), "bad.json", serde_json::json!({"x": 1}));
    tagbasectl(&db)
        .args(["apply", &batch])
        .assert()
        .failure()
        .stderr(contains("invalid batch JSON"));
}

#[test]
fn config_file_sets_database_path() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("from-config.db");
    let config = temp.path().join("tagbase.toml");
    fs::write(
        &config,
        format!("[store]\npath = \"{}\"\n", db.display()),
    )
    .unwrap();

    Command::cargo_bin("tagbasectl")
        .unwrap()
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(&config)
        .args(["service", "list"])
        .assert()
        .success()
        .stdout(contains("combined_file"));
    assert!(db.exists());
}
