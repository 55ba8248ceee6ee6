//! `config.toml` for a site.
//!
//! The file lives in the input root and is optional. Every key has a stock
//! default, so a site config names only what it changes:
//!
//! ```toml
//! title = "Notes on Machines"
//! author = "Ada Example"
//! base_url = "/blog"           # permalinks become /blog/<slug>.html
//! permalinks = "pretty"        # <slug>/index.html instead of <slug>.html
//! asset_fields = ["image", "banner"]
//!
//! [render]
//! smart_punctuation = true
//!
//! [processing]
//! max_processes = 4            # omit for one worker per core
//! ```
//!
//! Run `folio gen-config` for the full list with comments. A misspelled key is
//! an error rather than a silently ignored setting.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file looked up in the input root.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {CONFIG_FILENAME}: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid {CONFIG_FILENAME}: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid {CONFIG_FILENAME}: {0}")]
    Validation(String),
}

/// Site-wide settings. See the module docs for the file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site title shown on the index page and in every page `<title>`.
    pub title: String,
    /// One-line site description for the index page.
    pub description: String,
    /// Author used when a document's front-matter names none.
    pub author: String,
    /// Path prefix prepended to every permalink (`""` or `/something`).
    pub base_url: String,
    /// Output layout for rendered pages.
    pub permalinks: PermalinkStyle,
    /// Front-matter fields whose values are local asset paths.
    pub asset_fields: Vec<String>,
    /// Directory (relative to the input root) holding include snippets.
    pub includes_dir: String,
    /// Entry names skipped while scanning the input directory.
    pub exclude: Vec<String>,
    /// Markdown rendering switches.
    pub render: RenderConfig,
    /// Worker pool sizing.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Essays".to_string(),
            description: String::new(),
            author: String::new(),
            base_url: String::new(),
            permalinks: PermalinkStyle::File,
            asset_fields: vec!["image".to_string()],
            includes_dir: "_includes".to_string(),
            exclude: vec!["README.md".to_string(), "_site".to_string()],
            render: RenderConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Reject values that would produce broken links or an unscannable tree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.is_empty()
            && (!self.base_url.starts_with('/') || self.base_url.ends_with('/'))
        {
            return Err(ConfigError::Validation(
                "base_url must be empty or start with '/' and not end with '/'".into(),
            ));
        }
        if self.includes_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "includes_dir must not be empty".into(),
            ));
        }
        if self.asset_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "asset_fields entries must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Permalink for a slug under the configured style and base URL.
    pub fn permalink(&self, slug: &str) -> String {
        match self.permalinks {
            PermalinkStyle::File => format!("{}/{}.html", self.base_url, slug),
            PermalinkStyle::Pretty => format!("{}/{}/", self.base_url, slug),
        }
    }

    /// Output file, relative to the output directory, for a slug.
    pub fn output_path(&self, slug: &str) -> String {
        match self.permalinks {
            PermalinkStyle::File => format!("{slug}.html"),
            PermalinkStyle::Pretty => format!("{slug}/index.html"),
        }
    }
}

/// How rendered pages are laid out in the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermalinkStyle {
    /// `slug.html`, linked as `/slug.html`.
    File,
    /// `slug/index.html`, linked as `/slug/`.
    Pretty,
}

/// Markdown rendering switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Give every heading a deterministic `id` anchor.
    pub heading_anchors: bool,
    /// Convert straight quotes and `--` into typographic punctuation.
    pub smart_punctuation: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            heading_anchors: true,
            smart_punctuation: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Upper bound on document workers. `None` means one per core.
    pub max_processes: Option<usize>,
}

/// Worker count for the render pool: `max_processes` clamped to
/// `1..=cores`, or every core when unset.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    match config.max_processes {
        Some(n) => n.clamp(1, cores),
        None => cores,
    }
}

/// Read and validate `config.toml` from the input root.
///
/// A missing file yields the stock defaults.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let path = root.join(CONFIG_FILENAME);
    if !path.is_file() {
        return Ok(SiteConfig::default());
    }
    let text = fs::read_to_string(&path)?;
    parse_config(&text)
}

/// Parse config text. Absent keys keep their defaults.
pub fn parse_config(text: &str) -> Result<SiteConfig, ConfigError> {
    let config: SiteConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Commented `config.toml` listing every key at its default, printed by
/// `folio gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Folio Configuration
# ===================
# Every key is optional and shown at its default. Delete what you don't
# change. A misspelled key is an error.

# Site title, shown on the index page and in every page <title>.
title = "Essays"

# One-line description shown under the title on the index page.
description = ""

# Author used when a document's front-matter does not name one.
author = ""

# Path prefix for every permalink. Empty, or "/something" without a trailing slash.
base_url = ""

# Output layout for pages:
#   "file"   -> <slug>.html,       linked as /<slug>.html
#   "pretty" -> <slug>/index.html, linked as /<slug>/
permalinks = "file"

# Front-matter fields whose values are local asset paths. Each one is checked
# to exist at build time.
asset_fields = ["image"]

# Directory holding snippets for {% include name %}.
includes_dir = "_includes"

# Entry names skipped while scanning the input directory.
exclude = ["README.md", "_site"]

# ---------------------------------------------------------------------------
# Markdown rendering
# ---------------------------------------------------------------------------
[render]
# Give every heading a deterministic id anchor.
heading_anchors = true

# Convert straight quotes and -- into typographic punctuation.
smart_punctuation = false

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel document workers.
# Leave unset for one worker per CPU core.
# max_processes = 4
"##
}
