//! Configuration loading.
//!
//! Settings come from an optional TOML file (default `./fce.toml`) and are
//! then overridden by the environment, read once at startup. A `.env` file
//! in the working directory is layered over the process environment, its
//! values winning:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FRAPPE_SITE_URL` | `site.url` |
//! | `FRAPPE_API_KEY` | `site.api_key` |
//! | `FRAPPE_API_SECRET` | `site.api_secret` |
//! | `FRAPPE_CODE_PATH` | `code.root` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Marker that identifies header lines unless configured otherwise.
pub const DEFAULT_SENTINEL: &str = "FCE-EDITOR";

/// Files considered when no pattern is given on the command line.
pub const DEFAULT_PATTERN: &str = "**/*.{py,sql,html,css,scss,jinja-html}";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub code: CodeConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub pull: Vec<PullTarget>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CodeConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            sentinel: default_sentinel(),
            pattern: default_pattern(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_sentinel() -> String {
    DEFAULT_SENTINEL.to_string()
}
fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_interval_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_interval_ms(),
            poll_interval_ms: default_interval_ms(),
        }
    }
}

fn default_interval_ms() -> u64 {
    1000
}

/// One `[[pull]]` entry: a doctype whose code field is mirrored into files.
#[derive(Debug, Deserialize, Clone)]
pub struct PullTarget {
    pub doctype: String,
    /// Frappe list filters, passed through as JSON.
    #[serde(default = "default_filters")]
    pub filters: serde_json::Value,
    #[serde(default = "default_title_field")]
    pub title_field: String,
    pub code_field: String,
    pub extension: String,
    pub path: PathBuf,
    /// Overrides `code.sentinel` when re-reading existing files.
    #[serde(default)]
    pub sentinel: Option<String>,
}

fn default_filters() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}
fn default_title_field() -> String {
    "name".to_string()
}

impl Config {
    /// Sentinel to use for a pull target.
    pub fn sentinel_for<'a>(&'a self, target: &'a PullTarget) -> &'a str {
        target.sentinel.as_deref().unwrap_or(&self.code.sentinel)
    }
}

/// Load `path` (if it exists) and apply environment overrides.
///
/// A missing file is only an error when `required` is set, i.e. the user
/// passed `--config` explicitly.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    overlay_dotenv(&mut env, Path::new(DOTENV_FILE))?;
    load_config_with_env(path, required, &env)
}

/// Environment file read from the working directory.
pub const DOTENV_FILE: &str = ".env";

/// Copy the variables of a dotenv file over `env`. A missing file is fine.
pub fn overlay_dotenv(env: &mut HashMap<String, String>, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    for entry in entries {
        let (key, value) =
            entry.with_context(|| format!("Failed to parse {}", path.display()))?;
        env.insert(key, value);
    }
    Ok(())
}

/// [`load_config`] with an explicit environment, for tests.
pub fn load_config_with_env(
    path: &Path,
    required: bool,
    env: &HashMap<String, String>,
) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else if required {
        bail!("Config file not found: {}", path.display());
    } else {
        Config::default()
    };

    apply_env(&mut config, env);
    validate(&config)?;
    Ok(config)
}

fn apply_env(config: &mut Config, env: &HashMap<String, String>) {
    let lookup = |key: &str| env.get(key).filter(|v| !v.is_empty()).cloned();

    if let Some(url) = lookup("FRAPPE_SITE_URL") {
        config.site.url = url;
    }
    if let Some(key) = lookup("FRAPPE_API_KEY") {
        config.site.api_key = key;
    }
    if let Some(secret) = lookup("FRAPPE_API_SECRET") {
        config.site.api_secret = secret;
    }
    if let Some(root) = lookup("FRAPPE_CODE_PATH") {
        config.code.root = PathBuf::from(root);
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.site.url.trim().is_empty() {
        bail!("site.url must be set (or FRAPPE_SITE_URL)");
    }
    reqwest::Url::parse(&config.site.url)
        .with_context(|| format!("site.url is not a valid URL: '{}'", config.site.url))?;

    if config.site.api_key.is_empty() || config.site.api_secret.is_empty() {
        bail!("site.api_key and site.api_secret must be set (or FRAPPE_API_KEY / FRAPPE_API_SECRET)");
    }

    if config.code.sentinel.trim().is_empty() {
        bail!("code.sentinel must not be empty");
    }

    globset::Glob::new(&config.code.pattern)
        .with_context(|| format!("code.pattern is not a valid glob: '{}'", config.code.pattern))?;

    if config.watch.debounce_ms == 0 {
        bail!("watch.debounce_ms must be > 0");
    }
    if config.watch.poll_interval_ms == 0 {
        bail!("watch.poll_interval_ms must be > 0");
    }

    for target in &config.pull {
        if target.extension.is_empty() || target.code_field.is_empty() {
            bail!(
                "pull target '{}' needs both code_field and extension",
                target.doctype
            );
        }
    }

    Ok(())
}
