//! CLI Command Integration Tests
//!
//! Tests the file-based commands against real row-data files:
//! - inspect, migrate and check on a valid site
//! - Failure reporting for missing and malformed input
//! - Config resolution from file plus flags

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use storykeep_cli::{load_config, read_rows, run_check, run_inspect, run_migrate, CliArgs};
use storykeep_core::{
    serialize, EngineConfig, MarkdownData, Node, NodeId, NodeKind, NodeStore, PaneData, RowData,
    StoryFragmentData, TagElementData, TractStackData, SCHEMA_VERSION,
};
use tempfile::TempDir;

fn site() -> NodeStore {
    let mut store = NodeStore::with_root();
    store
        .add_nodes(vec![
            Node::new(
                &NodeId::root(),
                NodeKind::TractStack(TractStackData {
                    title: "Main".to_string(),
                    ..TractStackData::default()
                }),
            )
            .with_id("ts"),
            Node::new(
                &"ts".into(),
                NodeKind::StoryFragment(StoryFragmentData {
                    title: "Home".to_string(),
                    slug: "home".to_string(),
                    ..StoryFragmentData::default()
                }),
            )
            .with_id("home"),
            Node::new(&"home".into(), NodeKind::Pane(PaneData::default())).with_id("hero"),
            Node::new(
                &"hero".into(),
                NodeKind::Markdown(MarkdownData {
                    markdown_id: "hero-body".to_string(),
                    ..MarkdownData::default()
                }),
            )
            .with_id("md"),
            Node::new(
                &"md".into(),
                NodeKind::TagElement(TagElementData::new("h2").with_copy("Welcome")),
            )
            .with_id("h2"),
        ])
        .expect("site");
    store
}

fn write_rows(dir: &TempDir, name: &str, rows: &RowData) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, rows.to_json().expect("json")).expect("write rows");
    path
}

fn site_file(dir: &TempDir) -> PathBuf {
    write_rows(dir, "site.json", &serialize(&site()).expect("serialize"))
}

// ============================================================================
// Commands on a valid site
// ============================================================================

#[test]
fn test_inspect_prints_outline() {
    let dir = TempDir::new().expect("tempdir");
    let path = site_file(&dir);

    let outline = run_inspect(&path, &EngineConfig::default()).expect("inspect");
    let lines: Vec<&str> = outline.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Root root",
            "  TractStack ts \"Main\"",
            "    StoryFragment home \"Home\"",
            "      Pane hero",
            "        Markdown md",
            "          h2 h2",
        ]
    );
}

#[test]
fn test_check_counts_nodes() {
    let dir = TempDir::new().expect("tempdir");
    let path = site_file(&dir);

    let report = run_check(&path, &EngineConfig::default()).expect("check");
    assert_eq!(report.nodes, 6);
    assert_eq!(report.by_type.get("Pane"), Some(&1));
    assert_eq!(report.by_type.get("TagElement"), Some(&1));
    assert!(report.rows > 0);
}

#[test]
fn test_migrate_writes_stamped_snapshot() {
    let dir = TempDir::new().expect("tempdir");
    let input = site_file(&dir);
    let output = dir.path().join("migrated.json");

    let written = run_migrate(&input, &output, &EngineConfig::default()).expect("migrate");
    let rows = read_rows(&output).expect("read output");
    assert_eq!(rows.row_count(), written);
    assert!(rows.storyfragments[0].created.is_some());
    assert!(rows.panes[0].changed.is_some());

    // The snapshot is itself loadable.
    assert!(run_check(&output, &EngineConfig::default()).is_ok());
}

// ============================================================================
// Failure reporting
// ============================================================================

#[test]
fn test_missing_file_names_path() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("nope.json");
    let err = run_check(&path, &EngineConfig::default()).unwrap_err();
    assert!(err.to_string().contains("nope.json"));
}

#[test]
fn test_dangling_reference_fails_check() {
    let dir = TempDir::new().expect("tempdir");
    let mut rows = serialize(&site()).expect("serialize");
    rows.storyfragment_panes[0].pane_id = "ghost".to_string();
    let path = write_rows(&dir, "broken.json", &rows);

    let err = run_check(&path, &EngineConfig::default()).unwrap_err();
    assert!(err.to_string().contains("failed validation"));
}

#[test]
fn test_old_schema_needs_lenient() {
    let dir = TempDir::new().expect("tempdir");
    let mut rows = serialize(&site()).expect("serialize");
    rows.schema_version = 1;
    let path = write_rows(&dir, "old.json", &rows);

    assert!(run_check(&path, &EngineConfig::default()).is_err());

    let args = CliArgs::parse_from(["storykeep", "--lenient", "check", "old.json"]);
    let config = load_config(&args).expect("config");
    assert!(run_check(&path, &config).is_ok());
}

#[test]
fn test_migrate_upgrades_old_schema_without_lenient() {
    let dir = TempDir::new().expect("tempdir");
    let mut rows = serialize(&site()).expect("serialize");
    rows.schema_version = 1;
    let input = write_rows(&dir, "old.json", &rows);
    let output = dir.path().join("upgraded.json");

    run_migrate(&input, &output, &EngineConfig::default()).expect("migrate");
    let upgraded = read_rows(&output).expect("read output");
    assert_eq!(upgraded.schema_version, SCHEMA_VERSION);
    assert!(run_check(&output, &EngineConfig::default()).is_ok());
}

#[test]
fn test_migrate_rejects_newer_schema() {
    let dir = TempDir::new().expect("tempdir");
    let mut rows = serialize(&site()).expect("serialize");
    rows.schema_version = SCHEMA_VERSION + 1;
    let input = write_rows(&dir, "new.json", &rows);
    let output = dir.path().join("out.json");

    assert!(run_migrate(&input, &output, &EngineConfig::default()).is_err());
    assert!(!output.exists());
}

// ============================================================================
// Config resolution
// ============================================================================

fn config_file(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("storykeep.json");
    fs::write(&path, json).expect("write config");
    path
}

#[test]
fn test_config_file_then_flags() {
    let dir = TempDir::new().expect("tempdir");
    let path = config_file(
        dir.path(),
        r#"{"history_max_size": 9, "strict_schema_version": false}"#,
    );
    let path = path.to_str().expect("utf-8 path");

    let args = CliArgs::parse_from(["storykeep", "--config", path, "inspect", "x.json"]);
    let config = load_config(&args).expect("config");
    assert_eq!(config.history_max_size, 9);
    assert!(!config.strict_schema_version);

    let args = CliArgs::parse_from([
        "storykeep",
        "--config",
        path,
        "--history-size",
        "3",
        "inspect",
        "x.json",
    ]);
    assert_eq!(load_config(&args).expect("config").history_max_size, 3);
}

#[test]
fn test_bad_config_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let path = config_file(dir.path(), "{oops");
    let path = path.to_str().expect("utf-8 path");

    let args = CliArgs::parse_from(["storykeep", "--config", path, "inspect", "x.json"]);
    let err = load_config(&args).unwrap_err();
    assert!(err.to_string().contains("Invalid config"));
}
