//! Input directory discovery.
//!
//! The first step of every build. Walks the input directory once, in sorted
//! order, and sorts every file into one of four buckets:
//!
//! ```text
//! essays/                               # Input root
//! ├── config.toml                       # Site configuration (optional)
//! ├── _includes/                        # Snippets for {% include name %}
//! │   └── cpu-table.html
//! ├── _posts/
//! │   ├── 2026-01-20-virtual-dispatch.md   # Source document
//! │   └── 2026-01-24-x86-tso.md            # Source document
//! ├── about.md                          # Source document (undated)
//! └── assets/
//!     ├── vtable.png                    # Asset
//!     └── store-buffer.svg              # Asset
//! ```
//!
//! Hidden entries, names listed in `exclude`, and the output directory (when
//! it lives inside the input) are skipped entirely.
//!
//! Scanning only reads; it never parses documents. That is the loader's job.

use crate::config::{self, SiteConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Input is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Everything found in the input directory.
#[derive(Debug)]
pub struct Discovery {
    /// Absolute input root.
    pub root: PathBuf,
    /// Source documents, relative to the root, sorted.
    pub sources: Vec<PathBuf>,
    /// Asset files as root-relative `/`-joined paths (`assets/vtable.png`).
    pub assets: BTreeSet<String>,
    /// Snippet name (relative to the includes dir) → contents.
    pub snippets: BTreeMap<String, String>,
    pub config: SiteConfig,
}

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Scan `root`, skipping `output_dir` if it is nested inside it.
pub fn scan(root: &Path, output_dir: Option<&Path>) -> Result<Discovery, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let root = std::path::absolute(root)?;
    let output_dir = output_dir.map(std::path::absolute).transpose()?;

    // Load site config (uses defaults if config.toml doesn't exist)
    let config = config::load_config(&root)?;
    let includes_dir = root.join(&config.includes_dir);

    let mut sources = Vec::new();
    let mut assets = BTreeSet::new();
    let mut snippets = BTreeMap::new();

    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e, &root, output_dir.as_deref(), &config));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(&root).unwrap_or(path);

        if rel == Path::new(config::CONFIG_FILENAME) {
            continue;
        }
        if let Ok(snippet_rel) = path.strip_prefix(&includes_dir) {
            let name = to_slash(snippet_rel);
            snippets.insert(name, fs::read_to_string(path)?);
        } else if is_document(path) {
            sources.push(rel.to_path_buf());
        } else {
            assets.insert(to_slash(rel));
        }
    }

    tracing::debug!(
        sources = sources.len(),
        assets = assets.len(),
        snippets = snippets.len(),
        "scanned {}",
        root.display()
    );

    Ok(Discovery {
        root,
        sources,
        assets,
        snippets,
        config,
    })
}

fn is_skipped(entry: &DirEntry, root: &Path, output_dir: Option<&Path>, config: &SiteConfig) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    if output_dir.is_some_and(|out| out != root && entry.path().starts_with(out)) {
        return true;
    }
    config.exclude.iter().any(|ex| ex.as_str() == name)
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
}

/// Render a relative path with `/` separators on every platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
