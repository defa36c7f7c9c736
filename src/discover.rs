use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

/// Relative paths (with `/` separators) under `root` that match `pattern`,
/// sorted for deterministic processing order.
///
/// VCS, build and dependency directories are always skipped, on top of
/// `exclude_globs`.
pub fn discover_files(root: &Path, pattern: &str, exclude_globs: &[String]) -> Result<Vec<String>> {
    if !root.is_dir() {
        bail!("Code root does not exist: {}", root.display());
    }

    let include_set = build_globset(&[pattern.to_string()])?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/target/**".to_string(),
    ];
    default_excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(rel_str);
    }

    files.sort();
    Ok(files)
}

/// `*` and `?` stop at `/`; only `**` crosses directories.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok(builder.build()?)
}
