//! Site publishing.
//!
//! The last stage. Takes every successfully rendered page and writes the
//! static site:
//!
//! ```text
//! public/
//! ├── index.html              # Site index, newest first
//! ├── style.css               # Embedded stylesheet
//! ├── x86-tso.html            # One page per document ({slug}.html)
//! ├── virtual-dispatch.html   #   or {slug}/index.html with pretty permalinks
//! ├── assets/
//! │   └── vtable.png          # Assets copied at their input paths
//! └── .folio-manifest.json    # Content hashes for the next build
//! ```
//!
//! Output is deterministic: the index order is a total order, maps are
//! sorted, and nothing reads the clock. Unchanged artifacts are not
//! rewritten (see [`crate::cache`]).
//!
//! ## HTML Generation
//!
//! Uses [maud](https://maud.lambda.xyz/) for compile-time HTML templating.
//! Titles, summaries and other front-matter text are escaped by maud; the
//! rendered body is inserted as-is.

use crate::cache::{self, OutputManifest, OutputStats};
use crate::config::SiteConfig;
use crate::render::RenderedPage;
use chrono::NaiveDate;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CSS: &str = include_str!("../static/style.css");

/// Generated artifacts besides the pages themselves.
const INDEX_FILE: &str = "index.html";
const STYLESHEET_FILE: &str = "style.css";

/// Output paths no document page may take.
pub const GENERATED_FILES: &[&str] = &[INDEX_FILE, STYLESHEET_FILE];

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to copy asset {asset}: {source}")]
    Asset { asset: String, source: io::Error },
}

/// Read-only site inputs for the publisher.
#[derive(Debug, Clone, Copy)]
pub struct Site<'a> {
    pub config: &'a SiteConfig,
    /// Absolute input root, for copying assets.
    pub root: &'a Path,
    pub assets: &'a BTreeSet<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PublishOptions {
    /// Skip artifacts whose content matches the previous manifest.
    pub use_cache: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// One row of the site index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub title: String,
    pub permalink: String,
    pub date: Option<NaiveDate>,
    pub slug: String,
    pub summary: String,
}

/// Build the site index: date descending, undated last, ties by slug.
pub fn site_index(pages: &[RenderedPage]) -> Vec<IndexEntry> {
    let mut entries: Vec<IndexEntry> = pages
        .iter()
        .map(|page| IndexEntry {
            title: page.title.clone(),
            permalink: page.permalink.clone(),
            date: page.date,
            slug: page.slug.clone(),
            summary: page.summary.clone(),
        })
        .collect();
    entries.sort_by(index_order);
    entries
}

fn index_order(a: &IndexEntry, b: &IndexEntry) -> Ordering {
    let by_date = match (a.date, b.date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date.then_with(|| a.slug.cmp(&b.slug))
}

/// Write every page, the index, the stylesheet and all assets to
/// `output_dir`, then prune artifacts the previous build left behind.
pub fn publish(
    pages: &[RenderedPage],
    site: &Site<'_>,
    output_dir: &Path,
    options: &PublishOptions,
) -> Result<OutputStats, PublishError> {
    fs::create_dir_all(output_dir)?;

    let recorded = OutputManifest::load(output_dir);
    let previous = if options.use_cache {
        recorded.clone()
    } else {
        OutputManifest::empty()
    };
    let mut writer = ArtifactWriter::new(output_dir, previous);

    for page in pages {
        let markup = render_page(page, site.config);
        writer.write(&page.output_path, markup.into_string().as_bytes())?;
    }

    let index = site_index(pages);
    writer.write(INDEX_FILE, render_index(&index, site.config).into_string().as_bytes())?;
    writer.write(STYLESHEET_FILE, CSS.as_bytes())?;

    for asset in site.assets {
        if writer.produced(asset) {
            tracing::warn!("asset {asset} collides with a generated file; skipped");
            continue;
        }
        writer.copy(asset, &site.root.join(asset))?;
    }

    let stats = writer.finish(&recorded)?;
    tracing::info!(%stats, "published {}", output_dir.display());
    Ok(stats)
}

/// Writes artifacts and keeps the manifest for this build.
struct ArtifactWriter<'a> {
    output_dir: &'a Path,
    previous: OutputManifest,
    current: OutputManifest,
    stats: OutputStats,
}

impl<'a> ArtifactWriter<'a> {
    fn new(output_dir: &'a Path, previous: OutputManifest) -> Self {
        Self {
            output_dir,
            previous,
            current: OutputManifest::empty(),
            stats: OutputStats::default(),
        }
    }

    fn produced(&self, rel: &str) -> bool {
        self.current.entries.contains_key(rel)
    }

    fn write(&mut self, rel: &str, bytes: &[u8]) -> Result<(), PublishError> {
        let hash = cache::hash_bytes(bytes);
        if self.previous.is_current(rel, &hash, self.output_dir) {
            self.stats.keep();
        } else {
            let path = self.output_dir.join(rel);
            write_file(&path, bytes).map_err(|source| PublishError::Write { path, source })?;
            tracing::debug!("wrote {rel}");
            self.stats.write();
        }
        self.current.insert(rel.to_string(), hash);
        Ok(())
    }

    fn copy(&mut self, rel: &str, source: &Path) -> Result<(), PublishError> {
        let asset_error = |source| PublishError::Asset {
            asset: rel.to_string(),
            source,
        };
        let hash = cache::hash_file(source).map_err(asset_error)?;
        if self.previous.is_current(rel, &hash, self.output_dir) {
            self.stats.keep();
        } else {
            let dest = self.output_dir.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(asset_error)?;
            }
            fs::copy(source, &dest).map_err(asset_error)?;
            self.stats.write();
        }
        self.current.insert(rel.to_string(), hash);
        Ok(())
    }

    /// Remove stale artifacts, save the manifest, return the counts.
    fn finish(mut self, recorded: &OutputManifest) -> Result<OutputStats, PublishError> {
        for stale in recorded.stale_paths(&self.current) {
            let path = self.output_dir.join(stale);
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("removed stale {stale}");
                    self.stats.remove();
                    remove_empty_parents(&path, self.output_dir);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.current.save(self.output_dir)?;
        Ok(self.stats)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}

/// Remove directories emptied by pruning, up to (not including) `stop`.
fn remove_empty_parents(path: &Path, stop: &Path) {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == stop || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}

// ============================================================================
// HTML Components
// ============================================================================

/// Renders the base HTML document structure
fn base_document(title: &str, description: &str, config: &SiteConfig, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                @if !description.is_empty() {
                    meta name="description" content=(description);
                }
                title { (title) }
                link rel="stylesheet" href={ (config.base_url) "/" (STYLESHEET_FILE) };
            }
            body {
                (site_header(config))
                (content)
            }
        }
    }
}

/// Renders the site header linking back to the index
fn site_header(config: &SiteConfig) -> Markup {
    html! {
        header.site-header {
            a.site-title href={ (config.base_url) "/" } { (config.title) }
        }
    }
}

fn date_markup(date: Option<NaiveDate>) -> Markup {
    html! {
        @if let Some(date) = date {
            time datetime=(date.format("%Y-%m-%d")) { (date.format("%B %-d, %Y")) }
        }
    }
}

// ============================================================================
// Page Renderers
// ============================================================================

/// Renders one essay page.
fn render_page(page: &RenderedPage, config: &SiteConfig) -> Markup {
    let title = if config.title.is_empty() {
        page.title.clone()
    } else {
        format!("{} · {}", page.title, config.title)
    };
    let content = html! {
        main.essay {
            article {
                header.essay-header {
                    h1 { (page.title) }
                    p.byline {
                        @if let Some(author) = &page.author {
                            span.author { (author) }
                        }
                        (date_markup(page.date))
                    }
                    @if let Some(image) = &page.image {
                        img.header-image src=(image) alt="";
                    }
                }
                div.essay-body {
                    (PreEscaped(&page.html))
                }
                @if !page.tags.is_empty() {
                    footer.essay-tags {
                        @for tag in &page.tags {
                            span.tag { (tag) }
                        }
                    }
                }
            }
        }
    };
    base_document(&title, &page.summary, config, content)
}

/// Renders the index page listing every essay.
fn render_index(entries: &[IndexEntry], config: &SiteConfig) -> Markup {
    let content = html! {
        main.index-page {
            @if !config.description.is_empty() {
                p.site-description { (config.description) }
            }
            ol.essay-list {
                @for entry in entries {
                    li {
                        (date_markup(entry.date))
                        a href=(entry.permalink) { (entry.title) }
                        @if !entry.summary.is_empty() {
                            p.summary { (entry.summary) }
                        }
                    }
                }
            }
        }
    };
    base_document(&config.title, &config.description, config, content)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{rendered_page, write_file as write_input};
    use tempfile::TempDir;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn slugs(entries: &[IndexEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.slug.as_str()).collect()
    }

    // =========================================================================
    // Site index
    // =========================================================================

    #[test]
    fn index_is_newest_first() {
        let pages = vec![
            rendered_page("virtual-dispatch", ymd(2026, 1, 20)),
            rendered_page("x86-tso", ymd(2026, 1, 24)),
        ];
        assert_eq!(slugs(&site_index(&pages)), vec!["x86-tso", "virtual-dispatch"]);
    }

    #[test]
    fn undated_entries_come_last() {
        let pages = vec![
            rendered_page("about", None),
            rendered_page("old", ymd(2001, 1, 1)),
            rendered_page("colophon", None),
        ];
        assert_eq!(slugs(&site_index(&pages)), vec!["old", "about", "colophon"]);
    }

    #[test]
    fn same_date_ties_break_by_slug() {
        let pages = vec![
            rendered_page("zeta", ymd(2026, 1, 1)),
            rendered_page("alpha", ymd(2026, 1, 1)),
        ];
        assert_eq!(slugs(&site_index(&pages)), vec!["alpha", "zeta"]);
    }

    // =========================================================================
    // Templates
    // =========================================================================

    #[test]
    fn page_template_shows_fields() {
        let mut page = rendered_page("x86-tso", ymd(2026, 1, 24));
        page.title = "Store Buffers & TSO".into();
        page.author = Some("Ada".into());
        page.image = Some("/assets/cover.png".into());
        page.html = "<p>Body <em>text</em></p>\n".into();
        let html = render_page(&page, &SiteConfig::default()).into_string();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Store Buffers &amp; TSO</h1>"));
        assert!(html.contains("Ada"));
        assert!(html.contains("datetime=\"2026-01-24\""));
        assert!(html.contains("January 24, 2026"));
        assert!(html.contains("src=\"/assets/cover.png\""));
        assert!(html.contains("<p>Body <em>text</em></p>"));
    }

    #[test]
    fn index_template_links_entries() {
        let entries = site_index(&[rendered_page("x86-tso", ymd(2026, 1, 24))]);
        let html = render_index(&entries, &SiteConfig::default()).into_string();
        assert!(html.contains("href=\"/x86-tso.html\""));
        assert!(html.contains("href=\"/style.css\""));
    }

    #[test]
    fn front_matter_text_is_escaped() {
        let mut page = rendered_page("x", None);
        page.title = "<script>alert('xss')</script>".into();
        let html = render_page(&page, &SiteConfig::default()).into_string();
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }

    // =========================================================================
    // Writing and the manifest
    // =========================================================================

    struct Fixture {
        input: TempDir,
        output: TempDir,
        config: SiteConfig,
        assets: BTreeSet<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let input = TempDir::new().unwrap();
            write_input(input.path(), "assets/vtable.png", "png-bytes");
            Self {
                input,
                output: TempDir::new().unwrap(),
                config: SiteConfig::default(),
                assets: ["assets/vtable.png".to_string()].into(),
            }
        }

        fn publish(&self, pages: &[RenderedPage], use_cache: bool) -> OutputStats {
            let site = Site {
                config: &self.config,
                root: self.input.path(),
                assets: &self.assets,
            };
            publish(pages, &site, self.output.path(), &PublishOptions { use_cache }).unwrap()
        }
    }

    #[test]
    fn publish_writes_pages_index_css_and_assets() {
        let fx = Fixture::new();
        let stats = fx.publish(&[rendered_page("x86-tso", ymd(2026, 1, 24))], true);
        let out = fx.output.path();

        assert!(out.join("x86-tso.html").exists());
        assert!(out.join("index.html").exists());
        assert!(out.join("style.css").exists());
        assert_eq!(fs::read_to_string(out.join("assets/vtable.png")).unwrap(), "png-bytes");
        assert!(cache::manifest_path(out).exists());
        assert_eq!(stats.written, 4);
    }

    #[test]
    fn second_publish_rewrites_nothing() {
        let fx = Fixture::new();
        let pages = [rendered_page("x86-tso", ymd(2026, 1, 24))];
        fx.publish(&pages, true);
        let stats = fx.publish(&pages, true);
        assert_eq!(stats.written, 0);
        assert_eq!(stats.unchanged, 4);
    }

    #[test]
    fn no_cache_rewrites_everything() {
        let fx = Fixture::new();
        let pages = [rendered_page("x86-tso", ymd(2026, 1, 24))];
        fx.publish(&pages, true);
        let stats = fx.publish(&pages, false);
        assert_eq!(stats.written, 4);
    }

    #[test]
    fn removed_documents_are_pruned() {
        let fx = Fixture::new();
        fx.publish(
            &[
                rendered_page("x86-tso", ymd(2026, 1, 24)),
                rendered_page("vtables", ymd(2026, 1, 20)),
            ],
            true,
        );
        fs::write(fx.output.path().join("CNAME"), "example.com").unwrap();

        let stats = fx.publish(&[rendered_page("x86-tso", ymd(2026, 1, 24))], true);
        assert_eq!(stats.removed, 1);
        assert!(!fx.output.path().join("vtables.html").exists());
        // Files the build never wrote are left alone.
        assert!(fx.output.path().join("CNAME").exists());
    }

    #[test]
    fn pretty_pages_are_pruned_with_their_directory() {
        let mut fx = Fixture::new();
        fx.config.permalinks = crate::config::PermalinkStyle::Pretty;
        let mut page = rendered_page("vtables", None);
        page.output_path = fx.config.output_path("vtables");
        fx.publish(&[page], true);
        assert!(fx.output.path().join("vtables/index.html").exists());

        fx.publish(&[], true);
        assert!(!fx.output.path().join("vtables").exists());
    }
}
