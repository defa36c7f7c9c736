//! # fce
//!
//! Push marker-annotated local code to a Frappe site, run console blocks,
//! and pull remote code fields into local files.
//!
//! ## Usage
//!
//! ```bash
//! # push every matching file once
//! fce
//!
//! # only SQL files, then keep watching
//! fce "**/*.sql" --watch
//!
//! # mirror [[pull]] targets from fce.toml into local files
//! fce pull
//! ```
//!
//! A header line looks like this; everything after the marker is arguments:
//!
//! ```text
//! # FCE-EDITOR --doctype "Server Script" --docname daily_report --docfield script
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fce_bridge::config;
use fce_bridge::pull;
use fce_bridge::report::OutputFormat;
use fce_bridge::sync;

const DEFAULT_CONFIG: &str = "./fce.toml";

/// Sync marker-annotated local code files with fields on Frappe documents.
///
/// Connection settings come from `fce.toml` and/or the `FRAPPE_SITE_URL`,
/// `FRAPPE_API_KEY`, `FRAPPE_API_SECRET` and `FRAPPE_CODE_PATH` variables.
#[derive(Parser)]
#[command(name = "fce", version)]
struct Cli {
    /// Glob of files to push, relative to the code root.
    ///
    /// Defaults to `code.pattern` (`**/*.{py,sql,html,css,scss,jinja-html}`).
    #[arg(value_name = "PATTERN")]
    pattern_arg: Option<String>,

    /// Same as the positional PATTERN; wins when both are given.
    #[arg(long = "pattern", value_name = "GLOB")]
    pattern: Option<String>,

    /// Keep running and push files again whenever they change.
    #[arg(short, long)]
    watch: bool,

    /// Header marker; overrides `code.sentinel`.
    #[arg(long, global = true)]
    sentinel: Option<String>,

    /// Path to configuration file (TOML). Optional when the environment
    /// provides the connection settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// How to print progress.
    #[arg(long, global = true, value_enum, default_value = "human")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the code fields of `[[pull]]` targets into local files.
    ///
    /// New documents become new files; existing files keep their header
    /// lines and get the remote code as the text of their first block.
    Pull,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let (path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let mut cfg = config::load_config(&path, required)?;
    if let Some(sentinel) = cli.sentinel.filter(|s| !s.trim().is_empty()) {
        cfg.code.sentinel = sentinel;
    }

    match cli.command {
        Some(Commands::Pull) => pull::run_pull(&cfg, cli.format).await?,
        None => {
            let pattern = cli.pattern.or(cli.pattern_arg);
            sync::run_push(&cfg, pattern.as_deref(), cli.watch, cli.format).await?
        }
    }

    Ok(())
}
