//! # StoryKeep CLI
//!
//! File-based persistence caller for the StoryKeep engine. Reads and writes
//! row-data JSON; the engine itself never touches the filesystem.
//!
//! ## Usage
//!
//! ```bash
//! storykeep inspect site.json
//! storykeep migrate old.json new.json
//! storykeep --lenient check site.json
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `Command` - The subcommand to run
//! - `run_inspect` / `run_migrate` / `run_check` - One entry point per command

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use storykeep_core::{migrate_all, EngineConfig, NodeId, NodeStore, NodesContext, RowData};

/// Command-line arguments for storykeep.
#[derive(Debug, Clone, Parser)]
#[command(name = "storykeep")]
#[command(about = "Inspect, validate and migrate StoryKeep row data")]
#[command(version)]
pub struct CliArgs {
    /// Engine config file (JSON)
    #[arg(long, env = "STORYKEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum undo patches kept
    #[arg(long, env = "STORYKEEP_HISTORY_SIZE")]
    pub history_size: Option<usize>,

    /// Accept row data from older schema versions
    #[arg(long)]
    pub lenient: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print an indented outline of the loaded tree
    Inspect {
        /// Row-data JSON file
        input: PathBuf,
    },
    /// Load rows from any older schema version and write a full snapshot at
    /// the current one
    Migrate {
        /// Row-data JSON file to read
        input: PathBuf,
        /// Destination file
        output: PathBuf,
    },
    /// Validate rows and report node counts
    Check {
        /// Row-data JSON file
        input: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl CliArgs {
    /// Apply command-line overrides on top of a base config.
    #[must_use]
    pub fn apply(&self, mut base: EngineConfig) -> EngineConfig {
        if let Some(size) = self.history_size {
            base.history_max_size = size;
        }
        if self.lenient {
            base.strict_schema_version = false;
        }
        base
    }
}

impl From<&CliArgs> for EngineConfig {
    fn from(args: &CliArgs) -> Self {
        args.apply(EngineConfig::default())
    }
}

/// Resolve the engine config: the config file if given, then overrides.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub fn load_config(args: &CliArgs) -> anyhow::Result<EngineConfig> {
    let Some(path) = &args.config else {
        return Ok(args.into());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let base = EngineConfig::from_json(&json)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(args.apply(base))
}

/// Read and parse a row-data file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not row-data JSON.
pub fn read_rows(path: &Path) -> anyhow::Result<RowData> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    RowData::from_json(&json).with_context(|| format!("Invalid row data in {}", path.display()))
}

/// Load a row-data file into a fresh editing session.
///
/// # Errors
///
/// Returns an error if reading fails or the rows do not form a valid tree.
pub fn load_session(path: &Path, config: &EngineConfig) -> anyhow::Result<NodesContext> {
    let rows = read_rows(path)?;
    let mut ctx = NodesContext::new(config.clone());
    let count = ctx
        .load_rows(&rows)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::info!(path = %path.display(), nodes = count, "Loaded row data");
    Ok(ctx)
}

/// Indented outline of the tree, one node per line.
#[must_use]
pub fn outline(store: &NodeStore) -> String {
    let mut out = String::new();
    if store.root().is_some() {
        outline_into(store, &NodeId::root(), 0, &mut out);
    }
    out
}

fn outline_into(store: &NodeStore, id: &NodeId, depth: usize, out: &mut String) {
    let Some(node) = store.get_by_id(id) else {
        return;
    };
    out.push_str(&"  ".repeat(depth));
    match node.tag_name() {
        Some(tag) => out.push_str(tag.as_str()),
        None => out.push_str(&node.node_type().to_string()),
    }
    out.push(' ');
    out.push_str(id.as_str());
    if let Some(title) = node.title().filter(|t| !t.is_empty()) {
        out.push_str(&format!(" \"{title}\""));
    }
    out.push('\n');
    for child in store.get_child_ids(id).unwrap_or_default() {
        outline_into(store, child, depth + 1, out);
    }
}

/// Run `inspect`, returning the outline.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded.
pub fn run_inspect(input: &Path, config: &EngineConfig) -> anyhow::Result<String> {
    let ctx = load_session(input, config)?;
    Ok(outline(ctx.store()))
}

/// Run `migrate`, returning the number of rows written.
///
/// Older schema versions are always accepted here, whatever the config
/// says; rows from a newer version are still rejected.
///
/// # Errors
///
/// Returns an error if loading, snapshotting or writing fails.
pub fn run_migrate(input: &Path, output: &Path, config: &EngineConfig) -> anyhow::Result<usize> {
    let config = EngineConfig {
        strict_schema_version: false,
        ..config.clone()
    };
    let ctx = load_session(input, &config)?;
    let rows = migrate_all(ctx.store()).context("Failed to build migration snapshot")?;
    let json = rows.to_json().context("Failed to encode row data")?;
    fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!(output = %output.display(), rows = rows.row_count(), "Wrote snapshot");
    Ok(rows.row_count())
}

/// Node counts for a validated file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Rows in the file.
    pub rows: usize,
    /// Nodes loaded, root included.
    pub nodes: usize,
    /// Nodes per kind.
    pub by_type: BTreeMap<String, usize>,
}

impl CheckReport {
    /// Report as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "rows": self.rows,
            "nodes": self.nodes,
            "byType": self.by_type,
        })
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ok: {} rows, {} nodes", self.rows, self.nodes)?;
        for (kind, count) in &self.by_type {
            writeln!(f, "  {kind}: {count}")?;
        }
        Ok(())
    }
}

/// Run `check`.
///
/// # Errors
///
/// Returns an error describing the first problem found in the file.
pub fn run_check(input: &Path, config: &EngineConfig) -> anyhow::Result<CheckReport> {
    let rows = read_rows(input)?;
    let mut ctx = NodesContext::new(config.clone());
    ctx.load_rows(&rows)
        .with_context(|| format!("{} failed validation", input.display()))?;

    let mut by_type = BTreeMap::new();
    for node in ctx.store().nodes() {
        *by_type.entry(node.node_type().to_string()).or_insert(0) += 1;
    }
    Ok(CheckReport {
        rows: rows.row_count(),
        nodes: ctx.store().len(),
        by_type,
    })
}
