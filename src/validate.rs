//! Reference validation.
//!
//! Every local path a document mentions must exist at build time. The
//! validator collects references from two places:
//!
//! - **Front-matter**: each field listed in `asset_fields` (default `image`).
//! - **Body**: Markdown image and link destinations, `src`/`href`/`poster`
//!   attributes in raw HTML, `{% include %}` snippets and `{% post_url %}`
//!   cross-references. Code blocks and inline code are never inspected.
//!
//! ## Resolution
//!
//! | Target | Outcome |
//! |--------|---------|
//! | `https://…`, `mailto:…`, `//cdn/…`, `#section`, `""` | ignored |
//! | `/assets/vtable.png` | root-relative, must be a scanned asset |
//! | `img/figure.svg` | relative to the document's directory |
//! | `/x86-tso.html`, `/x86-tso/` | must be some document's permalink |
//! | `2026-01-20-virtual-dispatch.md` | must be a source document |
//!
//! Validation never fails: it returns one [`UnresolvedReference`] per broken
//! reference and leaves the decision (skip or warn) to the pipeline.

use crate::config::SiteConfig;
use crate::tags::{self, TagKind};
use crate::types::Document;
use pulldown_cmark::{Event, LinkType, Parser, Tag};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What kind of thing a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Image or other media file.
    Asset,
    /// Hyperlink to an asset or another page.
    Link,
    /// `{% include %}` snippet.
    Include,
    /// `{% post_url %}` cross-reference.
    PostUrl,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferenceKind::Asset => "asset",
            ReferenceKind::Link => "link",
            ReferenceKind::Include => "include",
            ReferenceKind::PostUrl => "post_url",
        })
    }
}

/// Where in the document a reference was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceLocation {
    FrontMatter(String),
    /// 1-based line of the source file (front-matter lines included).
    Line(usize),
}

impl fmt::Display for ReferenceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceLocation::FrontMatter(field) => write!(f, "front-matter `{field}`"),
            ReferenceLocation::Line(line) => write!(f, "line {line}"),
        }
    }
}

/// A reference that does not resolve to anything in the build.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}: unresolved {kind} reference `{target}` ({location})", .document.display())]
pub struct UnresolvedReference {
    pub document: PathBuf,
    /// The path exactly as written in the document.
    pub target: String,
    pub kind: ReferenceKind,
    pub location: ReferenceLocation,
}

/// How a written target resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// External or fragment-only; not ours to check.
    Ignored,
    /// A scanned asset, as its root-relative path.
    Asset(String),
    /// A source document, as its permalink.
    Document(String),
    /// A generated page (a permalink or the site index).
    Page,
    Unresolved,
}

/// Everything a reference can resolve to, built once per build and shared
/// read-only by all workers.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    assets: BTreeSet<String>,
    snippets: BTreeSet<String>,
    /// Source path → permalink.
    sources: BTreeMap<String, String>,
    /// Filename stem → permalink.
    stems: BTreeMap<String, String>,
    /// Normalised permalink keys (see [`page_key`]); `""` is the site index.
    pages: BTreeSet<String>,
    base_url: String,
    asset_fields: Vec<String>,
}

impl ReferenceIndex {
    pub fn new<'a>(
        documents: impl IntoIterator<Item = &'a Document>,
        assets: &BTreeSet<String>,
        snippet_names: impl IntoIterator<Item = &'a String>,
        config: &SiteConfig,
    ) -> Self {
        let mut index = Self {
            assets: assets.clone(),
            snippets: snippet_names.into_iter().cloned().collect(),
            base_url: config.base_url.clone(),
            asset_fields: config.asset_fields.clone(),
            ..Self::default()
        };
        index.pages.insert(String::new());
        for doc in documents {
            index.sources.insert(doc.source_str(), doc.permalink.clone());
            index.stems.insert(doc.stem.clone(), doc.permalink.clone());
            let local = strip_base(&doc.permalink, &index.base_url).unwrap_or(&doc.permalink);
            index.pages.insert(page_key(local.trim_start_matches('/')));
        }
        index
    }

    /// Permalink of the document with this filename stem.
    pub fn post_url(&self, stem: &str) -> Option<&str> {
        self.stems.get(stem).map(String::as_str)
    }

    pub fn has_snippet(&self, name: &str) -> bool {
        self.snippets.contains(name)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `target` as written in a document living in `from_dir`
    /// (root-relative, `""` for the root).
    pub fn resolve(&self, from_dir: &str, target: &str) -> Resolution {
        let target = target.trim();
        if is_external(target) {
            return Resolution::Ignored;
        }
        let path = target
            .split(['#', '?'])
            .next()
            .unwrap_or_default();
        let path = percent_decode(path);

        let joined = if let Some(absolute) = path.strip_prefix('/') {
            match strip_base(&path, &self.base_url) {
                Some(rest) => rest.trim_start_matches('/').to_string(),
                None => absolute.to_string(),
            }
        } else if from_dir.is_empty() {
            path.clone()
        } else {
            format!("{from_dir}/{path}")
        };

        let Some(normalized) = normalize(&joined) else {
            return Resolution::Unresolved;
        };
        let file = normalized.trim_end_matches('/');

        if self.assets.contains(file) {
            Resolution::Asset(file.to_string())
        } else if let Some(permalink) = self.sources.get(file) {
            Resolution::Document(permalink.clone())
        } else if self.pages.contains(&page_key(&normalized)) {
            Resolution::Page
        } else {
            Resolution::Unresolved
        }
    }
}

/// Collapse `a/./b/../c` to `a/c`, keeping a trailing slash. `None` when the
/// path climbs above the root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    let mut out = parts.join("/");
    if path.ends_with('/') && !out.is_empty() {
        out.push('/');
    }
    Some(out)
}

/// Key under which permalinks compare equal: `x.html`, `x/`, `x/index.html`
/// and `x` map to the same entry as their siblings.
fn page_key(path: &str) -> String {
    let path = path.trim_end_matches('/');
    let path = if path == "index.html" {
        ""
    } else {
        path.strip_suffix("/index.html").unwrap_or(path)
    };
    path.to_string()
}

fn strip_base<'a>(path: &'a str, base_url: &str) -> Option<&'a str> {
    if base_url.is_empty() {
        return None;
    }
    let rest = path.strip_prefix(base_url)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

fn is_external(target: &str) -> bool {
    if target.is_empty() || target.starts_with('#') || target.starts_with("//") {
        return true;
    }
    if target.contains("{%") || target.contains("{{") {
        return true;
    }
    // URI scheme: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"
    match target.find(':') {
        Some(colon) => {
            let scheme = &target[..colon];
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// `%20` and friends decoded; invalid UTF-8 keeps the target as written.
fn percent_decode(path: &str) -> String {
    urlencoding::decode(path)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| path.to_string())
}

/// A reference found in a document, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundReference {
    pub target: String,
    pub kind: ReferenceKind,
    pub location: ReferenceLocation,
}

/// Collect every reference a document makes, front-matter first, then body
/// references in source order.
pub fn collect_references(doc: &Document, asset_fields: &[String]) -> Vec<FoundReference> {
    let mut found = Vec::new();
    for field in asset_fields {
        if let Some(value) = doc.front_matter.get(field) {
            for target in value.strings() {
                found.push(FoundReference {
                    target: target.to_string(),
                    kind: ReferenceKind::Asset,
                    location: ReferenceLocation::FrontMatter(field.clone()),
                });
            }
        }
    }

    let body = doc.body.as_str();
    let line = |offset: usize| ReferenceLocation::Line(tags::line_at(body, offset) + doc.body_line - 1);
    let mut body_refs: Vec<(usize, FoundReference)> = Vec::new();

    let parser = Parser::new_ext(body, crate::render::markdown_options(false));
    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => body_refs.push((
                range.start,
                FoundReference {
                    target: dest_url.to_string(),
                    kind: ReferenceKind::Asset,
                    location: line(range.start),
                },
            )),
            Event::Start(Tag::Link {
                link_type, dest_url, ..
            }) if link_type != LinkType::Email => body_refs.push((
                range.start,
                FoundReference {
                    target: dest_url.to_string(),
                    kind: ReferenceKind::Link,
                    location: line(range.start),
                },
            )),
            Event::Html(html) | Event::InlineHtml(html) => {
                for (offset, attr, value) in html_references(&html) {
                    let kind = if attr == "href" {
                        ReferenceKind::Link
                    } else {
                        ReferenceKind::Asset
                    };
                    let at = range.start + offset;
                    body_refs.push((
                        at,
                        FoundReference {
                            target: value.to_string(),
                            kind,
                            location: line(at),
                        },
                    ));
                }
            }
            _ => {}
        }
    }

    for tag in tags::find_tags(body) {
        let kind = match tag.kind {
            TagKind::Include => ReferenceKind::Include,
            TagKind::PostUrl => ReferenceKind::PostUrl,
        };
        body_refs.push((
            tag.range.start,
            FoundReference {
                target: tag.argument.to_string(),
                kind,
                location: line(tag.range.start),
            },
        ));
    }

    body_refs.sort_by_key(|(offset, _)| *offset);
    found.extend(body_refs.into_iter().map(|(_, r)| r));
    found
}

/// Attributes in raw HTML that point at local files.
const URL_ATTRIBUTES: &[&str] = &["src", "href", "poster"];

/// `(offset, attribute, value)` for every URL-bearing attribute in an HTML
/// fragment. Offsets are relative to the fragment.
fn html_references(html: &str) -> Vec<(usize, &'static str, &str)> {
    let mut refs = Vec::new();
    let lower = html.to_ascii_lowercase();
    for &attr in URL_ATTRIBUTES {
        let mut pos = 0;
        while let Some(found) = lower[pos..].find(attr) {
            let start = pos + found;
            pos = start + attr.len();
            let preceded_ok = start == 0
                || lower.as_bytes()[start - 1].is_ascii_whitespace();
            if !preceded_ok {
                continue;
            }
            let rest = &html[pos..];
            let after_name = rest.trim_start();
            let Some(after_eq) = after_name.strip_prefix('=') else {
                continue;
            };
            let after_eq = after_eq.trim_start();
            let value_start = html.len() - after_eq.len();
            let (value, offset) = match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &after_eq[1..];
                    let end = inner.find(q).unwrap_or(inner.len());
                    (&inner[..end], value_start + 1)
                }
                Some(_) => {
                    let end = after_eq
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], value_start)
                }
                None => continue,
            };
            refs.push((offset, attr, value));
        }
    }
    refs.sort_by_key(|(offset, _, _)| *offset);
    refs
}

/// Validate one document against the index.
pub fn validate(doc: &Document, index: &ReferenceIndex) -> Vec<UnresolvedReference> {
    let from_dir = doc.source_dir();
    collect_references(doc, &index.asset_fields)
        .into_iter()
        .filter(|r| match r.kind {
            ReferenceKind::Include => !index.has_snippet(&r.target),
            ReferenceKind::PostUrl => index.post_url(&r.target).is_none(),
            ReferenceKind::Asset | ReferenceKind::Link => {
                index.resolve(&from_dir, &r.target) == Resolution::Unresolved
            }
        })
        .map(|r| UnresolvedReference {
            document: doc.source.clone(),
            target: r.target,
            kind: r.kind,
            location: r.location,
        })
        .collect()
}
