//! # StoryKeep CLI
//!
//! Command-line entry point for row-data inspection and migration.

use clap::Parser;
use storykeep_cli::{load_config, run_check, run_inspect, run_migrate, CliArgs, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,storykeep_core=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,storykeep_core=debug"));

    // Logs go to stderr so command output stays pipeable.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    tracing::debug!(?config, "Engine config resolved");

    match &args.command {
        Command::Inspect { input } => {
            print!("{}", run_inspect(input, &config)?);
        }
        Command::Migrate { input, output } => {
            let rows = run_migrate(input, output, &config)?;
            println!("wrote {rows} rows to {}", output.display());
        }
        Command::Check { input, json } => {
            let report = run_check(input, &config)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                print!("{report}");
            }
        }
    }
    Ok(())
}
