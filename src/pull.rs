//! Pull remote code fields down into local files.
//!
//! Each `[[pull]]` target names a doctype and the field holding its code.
//! Every matching document becomes one file under the target's `path`
//! (resolved against `code.root`):
//!
//! ```text
//! {name}.{code_field}.{extension}            when name and title normalize alike
//! {title}.{name}.{code_field}.{extension}    otherwise
//! ```
//!
//! New files get the remote code verbatim. Existing files keep their header
//! lines: the text of their first block is replaced with the remote code.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::blocks::{parse_blocks, render_blocks, NoHeaderPolicy};
use crate::config::{Config, PullTarget};
use crate::error::ParseError;
use crate::gateway::{DocumentGateway, FrappeClient, RemoteDocument};
use crate::normalize::normalize_name;
use crate::report::{OutputFormat, SyncEvent, SyncReporter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    pub documents: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
}

impl PullSummary {
    fn merge(&mut self, other: PullSummary) {
        self.documents += other.documents;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

/// Local file name for a remote document; `None` when the name has no
/// characters left after normalizing.
pub fn file_name(name: &str, title: &str, code_field: &str, extension: &str) -> Option<String> {
    let name = normalize_name(name);
    if name.is_empty() {
        return None;
    }
    let title = normalize_name(title);
    if name == title || title.is_empty() {
        Some(format!("{}.{}.{}", name, code_field, extension))
    } else {
        Some(format!("{}.{}.{}.{}", title, name, code_field, extension))
    }
}

/// Lines before the first header (with their newlines), or `""` when
/// there is no header.
fn preamble<'a>(content: &'a str, sentinel: &str) -> &'a str {
    let mut offset = 0;
    for line in content.split('\n') {
        if line.contains(sentinel) {
            return &content[..offset];
        }
        offset += line.len() + 1;
    }
    ""
}

/// Replace the first block of `local` with `remote`, keeping headers.
///
/// A file without any header is replaced by `remote` verbatim, the same
/// content a freshly created file gets.
pub fn merge_remote_code(local: &str, remote: &str, sentinel: &str) -> Result<String, ParseError> {
    let mut blocks = parse_blocks(local, sentinel, NoHeaderPolicy::WholeFile)?;
    if blocks.first().is_some_and(|b| b.header.is_none()) {
        return Ok(remote.to_string());
    }
    if let Some(first) = blocks.first_mut() {
        first.text = remote.trim().to_string();
    }
    let body = render_blocks(&blocks);
    Ok(format!("{}{}", preamble(local, sentinel), body))
}

fn text_field(doc: &RemoteDocument, field: &str) -> Option<String> {
    match doc.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Mirror one target's documents into `dir`.
pub async fn pull_target(
    gateway: &dyn DocumentGateway,
    reporter: &dyn SyncReporter,
    target: &PullTarget,
    dir: &Path,
    sentinel: &str,
) -> Result<PullSummary> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut fields = vec!["name".to_string()];
    for field in [&target.title_field, &target.code_field] {
        if !fields.contains(field) {
            fields.push(field.clone());
        }
    }
    fields.push("modified".to_string());

    let docs = gateway
        .list_documents(&target.doctype, &target.filters, &fields)
        .await
        .with_context(|| format!("Failed to list {}", target.doctype))?;

    let mut summary = PullSummary::default();
    let mut claimed: HashMap<String, String> = HashMap::new();

    for doc in &docs {
        summary.documents += 1;
        let Some(name) = text_field(doc, "name") else {
            warn!(doctype = %target.doctype, "document without a name");
            summary.skipped += 1;
            continue;
        };
        let title = text_field(doc, &target.title_field).unwrap_or_else(|| name.clone());
        let code = text_field(doc, &target.code_field).unwrap_or_default();

        let Some(file) = file_name(&name, &title, &target.code_field, &target.extension) else {
            warn!(doctype = %target.doctype, docname = %name, "name has no usable characters; skipping");
            summary.skipped += 1;
            continue;
        };
        if let Some(first) = claimed.get(&file) {
            warn!(
                doctype = %target.doctype,
                docname = %name,
                other = %first,
                file = %file,
                "file name already taken by another document; skipping"
            );
            summary.skipped += 1;
            continue;
        }
        claimed.insert(file.clone(), name.clone());

        let path = dir.join(&file);
        let shown = path.display().to_string();

        if !path.exists() {
            tokio::fs::write(&path, &code)
                .await
                .with_context(|| format!("Failed to write {}", shown))?;
            reporter.report(SyncEvent::Pulled {
                path: shown,
                created: true,
            });
            summary.created += 1;
            continue;
        }

        let local = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", shown))?;
        let merged = match merge_remote_code(&local, &code, sentinel) {
            Ok(merged) => merged,
            Err(e) => {
                warn!(path = %shown, error = %e, "Failed to parse local file; leaving it alone");
                summary.skipped += 1;
                continue;
            }
        };

        if merged == local {
            summary.unchanged += 1;
            continue;
        }

        tokio::fs::write(&path, &merged)
            .await
            .with_context(|| format!("Failed to write {}", shown))?;
        reporter.report(SyncEvent::Pulled {
            path: shown,
            created: false,
        });
        summary.updated += 1;
    }

    Ok(summary)
}

/// `fce pull`: mirror every configured target.
pub async fn run_pull(config: &Config, format: OutputFormat) -> Result<()> {
    if config.pull.is_empty() {
        info!("no [[pull]] targets configured");
        return Ok(());
    }

    let gateway = FrappeClient::new(&config.site).context("Failed to build HTTP client")?;
    let reporter = format.reporter();
    let mut total = PullSummary::default();

    for target in &config.pull {
        let dir = config.code.root.join(&target.path);
        match pull_target(
            &gateway,
            reporter.as_ref(),
            target,
            &dir,
            config.sentinel_for(target),
        )
        .await
        {
            Ok(summary) => total.merge(summary),
            Err(e) => warn!(doctype = %target.doctype, error = ?e, "pull failed"),
        }
    }

    match format {
        OutputFormat::Human => {
            println!("pull");
            println!("  documents: {}", total.documents);
            println!("  created: {}", total.created);
            println!("  updated: {}", total.updated);
            println!("  unchanged: {}", total.unchanged);
            if total.skipped > 0 {
                println!("  skipped: {}", total.skipped);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "event": "summary", "summary": total }));
        }
    }

    Ok(())
}
