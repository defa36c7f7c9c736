//! Push orchestration.
//!
//! For every discovered file: read it, split it into blocks at the sentinel,
//! and hand each block to the gateway one at a time:
//!
//! - blocks with `doctype` are compared with the remote field and pushed
//!   when they differ;
//! - blocks with `console` are sent to the System Console and their output
//!   is reported.
//!
//! Failures are reported per block and never stop the run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::args::{ArgValue, Arguments};
use crate::blocks::{parse_blocks, Block, NoHeaderPolicy};
use crate::config::Config;
use crate::discover::discover_files;
use crate::gateway::{ConsoleRequest, DocumentGateway, FrappeClient};
use crate::report::{FieldTarget, OutputFormat, SyncEvent, SyncReporter};
use crate::watch;

/// Console type used when a console block has no `type` argument.
const DEFAULT_CONSOLE_TYPE: &str = "Python";

/// Counters for one or more processed files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub files: u64,
    pub files_failed: u64,
    pub pushed: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub consoles: u64,
}

impl SyncSummary {
    pub fn merge(&mut self, other: SyncSummary) {
        self.files += other.files;
        self.files_failed += other.files_failed;
        self.pushed += other.pushed;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.consoles += other.consoles;
    }
}

/// Whether a header argument is switched on.
///
/// A bare flag counts, as does any value other than `0`, `false` or `no`.
fn truthy(args: &Arguments, key: &str) -> bool {
    match args.get(key) {
        None => false,
        Some(ArgValue::Flag) => true,
        Some(ArgValue::Text(v)) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"),
    }
}

/// Processes files under a code root against one gateway.
pub struct Syncer {
    gateway: Arc<dyn DocumentGateway>,
    reporter: Arc<dyn SyncReporter>,
    root: PathBuf,
    sentinel: String,
}

impl Syncer {
    pub fn new(
        gateway: Arc<dyn DocumentGateway>,
        reporter: Arc<dyn SyncReporter>,
        root: impl Into<PathBuf>,
        sentinel: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            reporter,
            root: root.into(),
            sentinel: sentinel.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reporter(&self) -> &dyn SyncReporter {
        self.reporter.as_ref()
    }

    /// Process `files` (relative to the root) strictly in order.
    pub async fn run_once(&self, files: &[String]) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for file in files {
            summary.merge(self.process_file(file).await);
        }
        summary
    }

    /// Read, parse and dispatch every block of one file.
    pub async fn process_file(&self, relative: &str) -> SyncSummary {
        let mut summary = SyncSummary {
            files: 1,
            ..Default::default()
        };
        let path = self.root.join(relative);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = relative, error = %e, "Failed to read file");
                summary.files_failed += 1;
                return summary;
            }
        };

        if !content.contains(&self.sentinel) {
            debug!(path = relative, "no header lines");
            return summary;
        }

        let blocks = match parse_blocks(&content, &self.sentinel, NoHeaderPolicy::Empty) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(path = relative, error = %e, "Failed to parse file");
                summary.files_failed += 1;
                return summary;
            }
        };

        for block in &blocks {
            let mut dispatched = false;
            if block.arguments.flag("doctype") {
                dispatched = true;
                self.process_code_block(relative, block, &mut summary).await;
            }
            if block.arguments.flag("console") {
                dispatched = true;
                self.process_console_block(block, &mut summary).await;
            }
            if !dispatched {
                warn!(
                    path = relative,
                    header = block.header.as_deref().unwrap_or_default(),
                    "block has neither doctype nor console"
                );
                summary.skipped += 1;
            }
        }

        summary
    }

    async fn process_code_block(&self, relative: &str, block: &Block, summary: &mut SyncSummary) {
        let args = &block.arguments;
        let (Some(doctype), Some(docname), Some(docfield)) = (
            args.get_str("doctype"),
            args.get_str("docname"),
            args.get_str("docfield"),
        ) else {
            warn!(
                path = relative,
                header = block.header.as_deref().unwrap_or_default(),
                "code block needs doctype, docname and docfield values"
            );
            summary.skipped += 1;
            return;
        };

        let target = FieldTarget {
            doctype: doctype.to_string(),
            docname: docname.to_string(),
            docfield: docfield.to_string(),
        };

        self.reporter.report(SyncEvent::Fetching(target.clone()));
        let current = match self.gateway.fetch_field(doctype, docname, docfield).await {
            Ok(current) => current,
            Err(e) => {
                self.reporter.report(SyncEvent::FetchFailed {
                    target,
                    error: e.to_string(),
                });
                summary.failed += 1;
                return;
            }
        };

        if current.as_deref().unwrap_or_default() == block.text {
            self.reporter.report(SyncEvent::Unchanged(target));
            summary.unchanged += 1;
            return;
        }

        self.reporter.report(SyncEvent::Pushing(target.clone()));
        match self
            .gateway
            .update_field(doctype, docname, docfield, &block.text)
            .await
        {
            Ok(_) => {
                self.reporter.report(SyncEvent::Updated(target));
                summary.pushed += 1;
            }
            Err(e) => {
                self.reporter.report(SyncEvent::UpdateFailed {
                    target,
                    error: e.to_string(),
                });
                summary.failed += 1;
            }
        }
    }

    async fn process_console_block(&self, block: &Block, summary: &mut SyncSummary) {
        let args = &block.arguments;
        if truthy(args, "clear") {
            self.reporter.report(SyncEvent::ConsoleClear);
        }
        self.reporter.report(SyncEvent::ConsoleStarted);
        let started = Instant::now();

        let request = ConsoleRequest {
            kind: args
                .get_str("type")
                .unwrap_or(DEFAULT_CONSOLE_TYPE)
                .to_string(),
            commit: truthy(args, "commit"),
            source: block.text.clone(),
        };

        match self.gateway.execute_remote_code(&request).await {
            Ok(lines) if lines.is_empty() => {
                self.reporter.report(SyncEvent::ConsoleNoOutput);
                summary.consoles += 1;
            }
            Ok(lines) => {
                for line in lines {
                    self.reporter.report(SyncEvent::ConsoleOutput(line));
                }
                summary.consoles += 1;
            }
            Err(e) => {
                self.reporter.report(SyncEvent::ConsoleFailed(e.to_string()));
                summary.failed += 1;
            }
        }

        self.reporter
            .report(SyncEvent::ConsoleFinished(started.elapsed()));
    }
}

fn print_summary(format: OutputFormat, summary: &SyncSummary) {
    match format {
        OutputFormat::Human => {
            println!("push");
            println!("  files: {}", summary.files);
            println!("  pushed: {}", summary.pushed);
            println!("  unchanged: {}", summary.unchanged);
            println!("  consoles run: {}", summary.consoles);
            if summary.skipped > 0 {
                println!("  skipped blocks: {}", summary.skipped);
            }
            if summary.failed > 0 || summary.files_failed > 0 {
                println!("  failed blocks: {}", summary.failed);
                println!("  failed files: {}", summary.files_failed);
            }
        }
        OutputFormat::Json => {
            let line = serde_json::json!({ "event": "summary", "summary": summary });
            println!("{}", line);
        }
    }
}

/// `fce [PATTERN] [--watch]`: push every matching file, then optionally watch.
pub async fn run_push(
    config: &Config,
    pattern: Option<&str>,
    watch_mode: bool,
    format: OutputFormat,
) -> Result<()> {
    let pattern = pattern.unwrap_or(&config.code.pattern);
    let files = discover_files(&config.code.root, pattern, &config.code.exclude_globs)
        .with_context(|| format!("Failed to discover files matching '{}'", pattern))?;
    info!(count = files.len(), pattern, root = %config.code.root.display(), "discovered files");

    let gateway = FrappeClient::new(&config.site).context("Failed to build HTTP client")?;
    let syncer = Arc::new(Syncer::new(
        Arc::new(gateway),
        Arc::from(format.reporter()),
        config.code.root.clone(),
        config.code.sentinel.clone(),
    ));

    let summary = syncer.run_once(&files).await;
    print_summary(format, &summary);

    if !watch_mode {
        return Ok(());
    }

    watch::watch_files(syncer, &files, &config.watch).await
}
