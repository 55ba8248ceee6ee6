//! Liquid-style template tags embedded in essay bodies.
//!
//! Two tags are understood:
//!
//! - `{% post_url 2026-01-20-virtual-dispatch %}`: the permalink of another
//!   document, keyed by its filename stem.
//! - `{% include cpu-table.html %}`: a snippet from the includes directory,
//!   inserted verbatim.
//!
//! Tags inside fenced/indented code blocks and inline code spans are content,
//! not tags, and are never touched. Anything else between `{%` and `%}` is
//! left exactly as written.

use pulldown_cmark::{Event, Parser, Tag};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Include,
    PostUrl,
}

/// A recognised tag occurrence in a body.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateTag<'a> {
    pub kind: TagKind,
    /// First argument (`cpu-table.html`, `2026-01-20-virtual-dispatch`).
    pub argument: &'a str,
    /// Byte range of the whole `{% … %}` in the body.
    pub range: Range<usize>,
}

/// Byte ranges of code blocks and inline code spans.
fn code_ranges(body: &str) -> Vec<Range<usize>> {
    Parser::new_ext(body, crate::render::markdown_options(false))
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(_)) | Event::Code(_) => Some(range),
            _ => None,
        })
        .collect()
}

/// Every recognised tag outside code, in source order.
pub fn find_tags(body: &str) -> Vec<TemplateTag<'_>> {
    let protected = code_ranges(body);
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(found) = body[pos..].find("{%") {
        let start = pos + found;
        let Some(close) = body[start + 2..].find("%}") else {
            break;
        };
        let end = start + 2 + close + 2;
        pos = end;

        if protected.iter().any(|r| r.contains(&start)) {
            continue;
        }
        let inner = body[start + 2..end - 2]
            .trim_start_matches('-')
            .trim_end_matches('-')
            .trim();
        let mut words = inner.split_whitespace();
        let kind = match words.next() {
            Some("include") => TagKind::Include,
            Some("post_url") => TagKind::PostUrl,
            _ => continue,
        };
        let Some(argument) = words.next() else {
            continue;
        };
        tags.push(TemplateTag {
            kind,
            argument,
            range: start..end,
        });
    }
    tags
}

/// Replace recognised tags using `resolve`. Tags it returns `None` for stay
/// as written.
pub fn expand_tags(body: &str, mut resolve: impl FnMut(&TemplateTag<'_>) -> Option<String>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for tag in find_tags(body) {
        if let Some(replacement) = resolve(&tag) {
            out.push_str(&body[last..tag.range.start]);
            out.push_str(&replacement);
            last = tag.range.end;
        }
    }
    out.push_str(&body[last..]);
    out
}

/// 1-based line number of a byte offset.
pub fn line_at(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text.as_bytes()[..offset].iter().filter(|&&b| b == b'\n').count() + 1
}
