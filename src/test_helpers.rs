//! Shared test utilities for the folio test suite.
//!
//! Provides fixture setup, in-memory document builders, and lookup helpers
//! that panic with the list of available items on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let report = build(&options(tmp.path())).unwrap();
//!
//! let tso = find_report(&report, "_posts/2026-01-24-x86-tso.md");
//! assert!(matches!(tso.outcome, Outcome::Rendered { .. }));
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::config::SiteConfig;
use crate::load;
use crate::pipeline::{BuildReport, DocumentReport};
use crate::render::RenderedPage;
use crate::types::Document;
use chrono::NaiveDate;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/essays/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/essays");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

// =========================================================================
// In-memory builders
// =========================================================================

/// A document with no front-matter, parsed under the default config.
pub fn document(source: &str, body: &str) -> Document {
    load::parse_document(Path::new(source), body, &SiteConfig::default())
        .unwrap_or_else(|e| panic!("fixture document {source} failed to parse: {e}"))
}

/// A document with a YAML front-matter block. `yaml` must end in a newline.
pub fn document_with(source: &str, yaml: &str, body: &str) -> Document {
    document(source, &format!("---\n{yaml}---\n{body}"))
}

/// A minimal rendered page for publisher and output tests.
pub fn rendered_page(slug: &str, date: Option<NaiveDate>) -> RenderedPage {
    RenderedPage {
        source: format!("{slug}.md").into(),
        slug: slug.to_string(),
        title: slug.replace('-', " "),
        date,
        permalink: format!("/{slug}.html"),
        output_path: format!("{slug}.html"),
        html: format!("<p>{slug}</p>\n"),
        summary: format!("About {slug}."),
        author: None,
        image: None,
        tags: Vec::new(),
    }
}

// =========================================================================
// Report lookups (panic with a clear message on a miss)
// =========================================================================

/// Find a document report by source path. Panics if not found.
pub fn find_report<'a>(report: &'a BuildReport, source: &str) -> &'a DocumentReport {
    report
        .documents
        .iter()
        .find(|d| d.source == Path::new(source))
        .unwrap_or_else(|| {
            let sources: Vec<String> = report
                .documents
                .iter()
                .map(|d| d.source.display().to_string())
                .collect();
            panic!("document '{source}' not found. Available: {sources:?}")
        })
}

/// Slugs of every rendered page in report order.
pub fn page_slugs(report: &BuildReport) -> Vec<&str> {
    report.pages().map(|p| p.slug.as_str()).collect()
}
