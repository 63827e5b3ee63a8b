use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rvn_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rvn"))
}

fn setup_vault() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    fs::create_dir_all(root.join("people")).unwrap();
    fs::create_dir_all(root.join("projects")).unwrap();
    fs::write(
        root.join("people/freya.md"),
        "---\ntype: person\nname: Freya\n---\n# Freya\n\nWorks on the launch plan.\n",
    )
    .unwrap();
    fs::write(
        root.join("projects/website.md"),
        "---\ntype: project\nowner: people/freya\n---\n# Website\n\n- @due(2025-03-01) ship it, ask [[people/freya]]\n- @priority(high) fix the header\n",
    )
    .unwrap();
    fs::write(
        root.join("notes.md"),
        "# Notes\n\nMet [[freya]] about the website.\n\n```\n[[people/freya]]\n```\n",
    )
    .unwrap();

    tmp
}

fn run_rvn(vault: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rvn_binary();
    let output = Command::new(&binary)
        .arg("--vault")
        .arg(vault)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rvn binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn initialized_vault() -> TempDir {
    let tmp = setup_vault();
    let (stdout, stderr, success) = run_rvn(tmp.path(), &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    let (stdout, stderr, success) = run_rvn(tmp.path(), &["reindex"]);
    assert!(success, "reindex failed: stdout={}, stderr={}", stdout, stderr);
    tmp
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({e}): {stdout}"))
}

#[test]
fn test_init_writes_starter_files() {
    let tmp = setup_vault();
    let (stdout, stderr, success) = run_rvn(tmp.path(), &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("schema.yaml").exists());
    assert!(tmp.path().join("raven.toml").exists());
    assert!(tmp.path().join(".raven/index.db").exists());
}

#[test]
fn test_init_keeps_existing_schema() {
    let tmp = setup_vault();
    fs::write(tmp.path().join("schema.yaml"), "types: {}\n").unwrap();

    let (stdout, _, success) = run_rvn(tmp.path(), &["init"]);
    assert!(success);
    assert!(stdout.contains("kept schema.yaml"));
    assert_eq!(
        fs::read_to_string(tmp.path().join("schema.yaml")).unwrap(),
        "types: {}\n"
    );

    let (_, _, again) = run_rvn(tmp.path(), &["init"]);
    assert!(again, "second init failed");
}

#[test]
fn test_reindex_is_incremental() {
    let tmp = initialized_vault();

    let (stdout, _, success) = run_rvn(tmp.path(), &["reindex", "--json"]);
    assert!(success);
    let out = json(&stdout);
    assert_eq!(out["report"]["summary"]["applied"], 0);
    assert_eq!(out["report"]["summary"]["skipped"], 3);

    let (stdout, _, success) = run_rvn(tmp.path(), &["reindex", "--full", "--json"]);
    assert!(success);
    assert_eq!(json(&stdout)["report"]["summary"]["applied"], 3);
}

#[test]
fn test_search_finds_body_text() {
    let tmp = initialized_vault();

    let (stdout, stderr, success) = run_rvn(tmp.path(), &["search", "launch", "--json"]);
    assert!(success, "search failed: {}", stderr);
    let hits = json(&stdout);
    let hits = hits.as_array().unwrap();
    assert!(hits.iter().any(|h| h["object_id"] == "people/freya"));
    assert!(hits.iter().all(|h| h["file_path"] == "people/freya.md"));
    assert!(hits[0]["snippet"].as_str().unwrap().contains("»launch«"));

    let (stdout, _, success) = run_rvn(tmp.path(), &["search", "zebra"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_backlinks_skip_code_blocks() {
    let tmp = initialized_vault();

    let (stdout, stderr, success) = run_rvn(tmp.path(), &["backlinks", "freya", "--json"]);
    assert!(success, "backlinks failed: {}", stderr);
    let links = json(&stdout);
    let mut files: Vec<&str> = links
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["file_path"].as_str().unwrap())
        .collect();
    files.sort();
    files.dedup();
    assert_eq!(files, vec!["notes.md", "projects/website.md"]);
}

#[test]
fn test_resolve_unknown_reference_fails() {
    let tmp = initialized_vault();

    let (stdout, _, success) = run_rvn(tmp.path(), &["resolve", "freya"]);
    assert!(success);
    assert_eq!(stdout.trim(), "people/freya");

    let (_, stderr, success) = run_rvn(tmp.path(), &["resolve", "odin"]);
    assert!(!success);
    assert!(stderr.contains("does not resolve"));
}

#[test]
fn test_traits_value_filter() {
    let tmp = initialized_vault();

    let (stdout, _, success) =
        run_rvn(tmp.path(), &["traits", "due", "--value", "<2025-04-01", "--json"]);
    assert!(success);
    assert_eq!(json(&stdout).as_array().unwrap().len(), 1);

    let (stdout, _, success) =
        run_rvn(tmp.path(), &["traits", "due", "--value", ">2025-04-01", "--json"]);
    assert!(success);
    assert!(json(&stdout).as_array().unwrap().is_empty());
}

#[test]
fn test_dates_lists_dated_traits() {
    let tmp = initialized_vault();

    let (stdout, stderr, success) = run_rvn(tmp.path(), &["dates", "2025-03-01", "--json"]);
    assert!(success, "dates failed: {}", stderr);
    let entries = json(&stdout);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["source_type"], "trait");
    assert_eq!(entries[0]["file_path"], "projects/website.md");

    let (_, stderr, success) = run_rvn(tmp.path(), &["dates", "someday"]);
    assert!(!success);
    assert!(stderr.contains("is not a date"));
}

#[test]
fn test_set_validates_before_writing() {
    let tmp = initialized_vault();
    let path = tmp.path().join("projects/website.md");
    let before = fs::read_to_string(&path).unwrap();

    let (_, stderr, success) = run_rvn(tmp.path(), &["set", "website", "status=someday"]);
    assert!(!success);
    assert!(stderr.contains("nothing written"));
    assert_eq!(fs::read_to_string(&path).unwrap(), before);

    let (stdout, stderr, success) = run_rvn(tmp.path(), &["set", "website", "status=done"]);
    assert!(success, "set failed: {}", stderr);
    assert!(stdout.contains("updated"));
    assert!(fs::read_to_string(&path).unwrap().contains("status: done\n"));

    let (stdout, _, success) = run_rvn(tmp.path(), &["objects", "project", "--json"]);
    assert!(success);
    assert_eq!(json(&stdout)[0]["fields"]["status"], "done");
}

#[test]
fn test_move_rewrites_references() {
    let tmp = initialized_vault();

    let (stdout, stderr, success) =
        run_rvn(tmp.path(), &["move", "people/freya", "people/freyja"]);
    assert!(success, "move failed: stdout={}, stderr={}", stdout, stderr);

    assert!(!tmp.path().join("people/freya.md").exists());
    assert!(tmp.path().join("people/freyja.md").exists());

    let website = fs::read_to_string(tmp.path().join("projects/website.md")).unwrap();
    assert!(website.contains("owner: people/freyja\n"));
    assert!(website.contains("[[people/freyja]]"));

    let notes = fs::read_to_string(tmp.path().join("notes.md")).unwrap();
    assert!(notes.contains("Met [[freyja]]"));
    assert!(notes.contains("```\n[[people/freya]]\n```"));

    let (stdout, _, success) = run_rvn(tmp.path(), &["backlinks", "freyja", "--json"]);
    assert!(success);
    assert!(!json(&stdout).as_array().unwrap().is_empty());
}

#[test]
fn test_move_reports_errors_per_item() {
    let tmp = initialized_vault();
    let batch = tmp.path().join("moves.txt");
    fs::write(
        &batch,
        "# renames\nnotes archive/notes\nodin people/odin\n",
    )
    .unwrap();

    let (stdout, _, success) = run_rvn(
        tmp.path(),
        &["move", "--batch", batch.to_str().unwrap(), "--json"],
    );
    assert!(!success);
    let report = json(&stdout);
    assert_eq!(report["summary"]["errors"], 1);
    assert!(tmp.path().join("archive/notes.md").exists());
    let reasons: Vec<&str> = report["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["reason"].as_str().unwrap())
        .collect();
    assert!(reasons.contains(&"not_found"));
}

#[test]
fn test_check_flags_invalid_fields() {
    let tmp = initialized_vault();

    let (stdout, stderr, success) = run_rvn(tmp.path(), &["check"]);
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok"));

    fs::write(
        tmp.path().join("projects/broken.md"),
        "---\ntype: project\nstatus: someday\n---\n",
    )
    .unwrap();
    let (stdout, stderr, success) = run_rvn(tmp.path(), &["check"]);
    assert!(!success);
    assert!(stdout.contains("projects/broken.md"));
    assert!(stderr.contains("1 problem(s) found"));
}

#[test]
fn test_stats_counts() {
    let tmp = initialized_vault();

    let (stdout, _, success) = run_rvn(tmp.path(), &["stats", "--json"]);
    assert!(success);
    let stats = json(&stdout);
    assert_eq!(stats["files"], 3);
    assert_eq!(stats["traits"], 2);
}
