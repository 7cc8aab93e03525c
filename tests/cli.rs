//! End-to-end runs of the `curie` binary against a temp workspace.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn curie_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("curie");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("handbook.txt"),
        "Payroll runs on the 25th of every month.\n\nHoliday requests go through the HR portal.",
    )
    .unwrap();
    fs::write(
        files_dir.join("handbook-copy.md"),
        "payroll runs on the 25th of every month.\n\nholiday requests go through the HR portal.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/curie.sqlite"

[storage]
root = "{root}/storage"

[chunking]
max_chars = 1000

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("curie.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_curie(config: &Path, args: &[&str]) -> Output {
    Command::new(curie_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run curie")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let output = run_curie(&config, &["init"]);
    assert!(output.status.success(), "init failed: {:?}", output);
    assert!(stdout(&output).contains("Database initialized successfully."));
    assert!(tmp.path().join("data/curie.sqlite").exists());

    // Idempotent.
    let output = run_curie(&config, &["init"]);
    assert!(output.status.success());
}

#[test]
fn test_ingest_list_and_delete() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files/handbook.txt");

    let output = run_curie(
        &config,
        &["ingest", file.to_str().unwrap(), "--uploader", "alice"],
    );
    assert!(output.status.success(), "ingest failed: {:?}", output);
    let out = stdout(&output);
    assert!(out.contains("ingest handbook.txt"));
    assert!(out.contains("content type: text/plain"));
    assert!(out.contains("chunks: 1"));
    assert!(out.contains("embedded: false"));
    assert!(tmp.path().join("storage/rag_documents/handbook.txt").exists());

    let doc_id = out
        .lines()
        .find_map(|l| l.trim().strip_prefix("document: "))
        .unwrap()
        .to_string();

    let output = run_curie(&config, &["documents", "list"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains(&doc_id));
    assert!(out.contains("uploaded by alice"));

    let output = run_curie(&config, &["documents", "delete", &doc_id]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(&format!("deleted: {}", doc_id)));

    let output = run_curie(&config, &["documents", "list"]);
    assert!(stdout(&output).contains("none"));

    let output = run_curie(&config, &["documents", "delete", &doc_id]);
    assert!(!output.status.success());
}

#[test]
fn test_duplicate_ingest_fails() {
    let (tmp, config) = setup_test_env();
    let first = tmp.path().join("files/handbook.txt");
    let copy = tmp.path().join("files/handbook-copy.md");

    let output = run_curie(&config, &["ingest", first.to_str().unwrap(), "--uploader", "alice"]);
    assert!(output.status.success());

    let output = run_curie(&config, &["ingest", copy.to_str().unwrap(), "--uploader", "bob"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("exact duplicate"), "stderr: {}", stderr);
}

#[test]
fn test_ask_without_matches_skips_the_model() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files/handbook.txt");
    run_curie(&config, &["ingest", file.to_str().unwrap(), "--uploader", "alice"]);

    // The model is disabled; a question with no matching chunk never reaches it.
    let output = run_curie(&config, &["ask", "quantum chromodynamics"]);
    assert!(output.status.success(), "ask failed: {:?}", output);
    assert_eq!(stdout(&output).trim(), "No relevant documents found.");

    // A matching question needs the model and reports the upstream failure.
    let output = run_curie(&config, &["ask", "payroll"]);
    assert!(!output.status.success());
}

#[test]
fn test_set_role() {
    let (_tmp, config) = setup_test_env();

    let output = run_curie(&config, &["accounts", "set-role", "alice", "admin"]);
    assert!(output.status.success(), "set-role failed: {:?}", output);
    let out = stdout(&output);
    assert!(out.contains("account: alice"));
    assert!(out.contains("role: admin"));

    let output = run_curie(&config, &["accounts", "set-role", "alice", "overlord"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown role"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let output = run_curie(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!output.status.success());
}
