//! Site configuration module.
//!
//! Handles loading, validating, and merging `sitepipe.toml`. User values are
//! layered over stock defaults, so a config file only names what it changes.
//!
//! ## Config File Location
//!
//! `sitepipe.toml` lives in the project root, next to the source directory:
//!
//! ```text
//! project/
//! ├── sitepipe.toml
//! ├── src/                 # source root
//! │   ├── _includes/       # excluded by default
//! │   ├── public/          # copied verbatim by default
//! │   ├── index.md
//! │   └── index.css
//! └── _site/               # destination
//! ```
//!
//! Relative `source` and `destination` paths are resolved against the
//! directory containing the config file.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! source = "src"
//! destination = "_site"
//! exclude = ["_*"]
//! passthrough = ["public"]
//! transformers = ["markdown", "layout", "css-minify"]
//! artifact_manifest = false
//!
//! [layout]                  # omit to leave page bodies unwrapped
//! title = "My Site"
//! lang = "en"
//! stylesheets = ["index.css"]
//!
//! [processing]
//! max_threads = 4           # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::engine::BuildConfig;
use crate::rules::PathRules;
use crate::transformers::BUILTIN_NAMES;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name.
pub const CONFIG_FILE: &str = "sitepipe.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `sitepipe.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Source root, relative to the config file's directory.
    pub source: String,
    /// Output root, relative to the config file's directory.
    pub destination: String,
    /// Paths never scanned. Globs, or plain prefixes matching a subtree.
    pub exclude: Vec<String>,
    /// Paths copied verbatim, skipping every transformer.
    pub passthrough: Vec<String>,
    /// Built-in transformers to register, in precedence order.
    pub transformers: Vec<String>,
    /// Write `artifact-manifest.json` next to the output.
    pub artifact_manifest: bool,
    pub layout: Option<LayoutConfig>,
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            source: "src".to_string(),
            destination: "_site".to_string(),
            exclude: vec!["_*".to_string()],
            passthrough: vec!["public".to_string()],
            transformers: vec![
                "markdown".to_string(),
                "layout".to_string(),
                "css-minify".to_string(),
            ],
            artifact_manifest: false,
            layout: None,
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Validation("source must not be empty".into()));
        }
        if self.destination.trim().is_empty() {
            return Err(ConfigError::Validation(
                "destination must not be empty".into(),
            ));
        }
        if normalize_dir(&self.source) == normalize_dir(&self.destination) {
            return Err(ConfigError::Validation(
                "source and destination must differ".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for name in &self.transformers {
            if !BUILTIN_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "unknown transformer '{name}' (known: {})",
                    BUILTIN_NAMES.join(", ")
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "transformer '{name}' listed twice"
                )));
            }
        }

        compile_rules(&self.exclude)?;
        compile_rules(&self.passthrough)?;

        if let Some(layout) = &self.layout {
            if layout.lang.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "layout.lang must not be empty".into(),
                ));
            }
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve paths against `base_dir` and compile pattern rules.
    pub fn build_config(&self, base_dir: &Path) -> Result<BuildConfig, ConfigError> {
        Ok(BuildConfig::new(
            resolve_path(base_dir, &self.source),
            resolve_path(base_dir, &self.destination),
        )
        .with_exclude(compile_rules(&self.exclude)?)
        .with_passthrough(compile_rules(&self.passthrough)?)
        .with_artifact_manifest(self.artifact_manifest))
    }
}

fn normalize_dir(path: &str) -> String {
    path.trim()
        .trim_start_matches("./")
        .trim_end_matches('/')
        .to_string()
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn compile_rules(patterns: &[String]) -> Result<PathRules, ConfigError> {
    for pattern in patterns {
        if let Err(source) = glob::Pattern::new(pattern) {
            return Err(ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            });
        }
    }
    PathRules::new(patterns).map_err(|source| ConfigError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// Document shell settings for the `layout` transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Site title, appended to each page's own heading.
    pub title: String,
    pub lang: String,
    /// Source-relative stylesheets linked from every page.
    pub stylesheets: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            lang: "en".to_string(),
            stylesheets: Vec::new(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of worker threads for transforming and writing.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, arrays included.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`, falling back to stock defaults when
/// it does not exist.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `sitepipe.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitepipe configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Source root, relative to this file.
source = "src"

# Output directory, relative to this file. Existing files are overwritten;
# nothing is ever deleted from it.
destination = "_site"

# Paths that are never scanned. A pattern with * ? or [ is a glob matched
# against the source-relative path; anything else matches that path and
# everything below it. Hidden files (.name) are always skipped.
exclude = ["_*"]

# Paths copied to the output byte-for-byte, skipping every transformer.
passthrough = ["public"]

# Built-in transformers, in precedence order. A file runs through every
# listed transformer that accepts it, earlier entries first.
# Available: markdown, layout, css-minify, fingerprint
transformers = ["markdown", "layout", "css-minify"]

# Also write artifact-manifest.json (source path -> output path).
artifact_manifest = false

# ---------------------------------------------------------------------------
# Layout
# ---------------------------------------------------------------------------
# Wraps HTML pages in a document shell. Without this section pages are
# written as bare fragments.
# [layout]
# title = "My Site"
# lang = "en"
# stylesheets = ["index.css"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum worker threads.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_threads = 4
"##
}
