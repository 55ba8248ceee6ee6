//! Markdown rendering.
//!
//! Turns one validated [`Document`] into a [`RenderedPage`]: an HTML body
//! fragment plus the fields the page template needs. Rendering is a pure
//! function of the document and the shared [`RenderContext`], so the same
//! inputs always produce byte-identical output.
//!
//! ## Steps
//!
//! 1. **Structure check** on the body before tag expansion. An unclosed code
//!    fence or unbalanced raw HTML would silently swallow the rest of the
//!    essay, so both are errors that exclude the document.
//! 2. **Tag expansion**: `{% post_url %}` and `{% include %}` outside code.
//! 3. **Markdown → HTML** with pulldown-cmark, with a few adjustments to the
//!    event stream:
//!    - fenced code is emitted as `<pre><code class="language-X">`, content
//!      escaped and otherwise untouched;
//!    - raw HTML passes through unmodified;
//!    - kramdown attribute-block paragraphs (`{: .note }`) are kept verbatim
//!      instead of being wrapped in `<p>`;
//!    - headings get stable `id` anchors;
//!    - local link and image targets are rewritten to their output URLs.
//! 4. **Summary**: `description`/`excerpt` front-matter, else the first
//!    paragraph trimmed to a word boundary.

use crate::config::SiteConfig;
use crate::naming::slugify;
use crate::tags::{self, TagKind};
use crate::types::Document;
use crate::validate::{ReferenceIndex, Resolution};
use chrono::NaiveDate;
use maud::html;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html as md_html};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::PathBuf;
use thiserror::Error;

/// Longest summary, in characters, including the trailing ellipsis.
pub const SUMMARY_LENGTH: usize = 200;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("unterminated code fence `{fence}` opened on line {line}")]
    UnterminatedFence { line: usize, fence: String },
    #[error("unbalanced HTML on line {line}: {detail}")]
    UnbalancedHtml { line: usize, detail: String },
}

/// Markdown extensions enabled for every document.
pub fn markdown_options(smart_punctuation: bool) -> Options {
    let mut options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES;
    if smart_punctuation {
        options |= Options::ENABLE_SMART_PUNCTUATION;
    }
    options
}

/// Read-only inputs shared by every render worker.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub config: &'a SiteConfig,
    pub references: &'a ReferenceIndex,
    /// Snippet name → contents.
    pub snippets: &'a BTreeMap<String, String>,
}

/// A rendered document, ready for the page template.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub source: PathBuf,
    pub slug: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub permalink: String,
    /// Relative to the output directory.
    pub output_path: String,
    /// Body HTML fragment.
    pub html: String,
    pub summary: String,
    pub author: Option<String>,
    /// Header image URL, already rewritten for the output tree.
    pub image: Option<String>,
    pub tags: Vec<String>,
}

/// Render one document.
pub fn render(doc: &Document, ctx: &RenderContext<'_>) -> Result<RenderedPage, RenderError> {
    check_structure(&doc.body, doc.body_line)?;

    let expanded = tags::expand_tags(&doc.body, |tag| match tag.kind {
        TagKind::PostUrl => ctx.references.post_url(tag.argument).map(str::to_string),
        TagKind::Include => ctx.snippets.get(tag.argument).cloned(),
    });

    let from_dir = doc.source_dir();
    let (html, first_paragraph) = render_markdown(&expanded, ctx, &from_dir);

    let summary = doc
        .front_matter
        .get_str("description")
        .or_else(|| doc.front_matter.get_str("excerpt"))
        .map(str::to_string)
        .unwrap_or_else(|| first_paragraph.unwrap_or_default());

    let author = doc
        .front_matter
        .get_str("author")
        .or(Some(ctx.config.author.as_str()).filter(|a| !a.trim().is_empty()))
        .map(str::to_string);

    let image = doc
        .front_matter
        .get_str("image")
        .map(|target| rewrite_url(ctx.references, &from_dir, target).unwrap_or_else(|| target.to_string()));

    let tags = doc
        .front_matter
        .get("tags")
        .map(|v| v.strings().into_iter().map(str::to_string).collect())
        .unwrap_or_default();

    Ok(RenderedPage {
        source: doc.source.clone(),
        slug: doc.slug.clone(),
        title: doc.title.clone(),
        date: doc.date,
        permalink: doc.permalink.clone(),
        output_path: ctx.config.output_path(&doc.slug),
        html,
        summary: truncate_summary(&summary),
        author,
        image,
        tags,
    })
}

// ============================================================================
// Event stream
// ============================================================================

/// Render Markdown to HTML. Also returns the plain text of the first
/// ordinary paragraph, for the summary.
fn render_markdown(source: &str, ctx: &RenderContext<'_>, from_dir: &str) -> (String, Option<String>) {
    let options = markdown_options(ctx.config.render.smart_punctuation);
    let input: Vec<(Event<'_>, Range<usize>)> = Parser::new_ext(source, options).into_offset_iter().collect();

    let mut out: Vec<Event<'_>> = Vec::with_capacity(input.len());
    let mut ids = HeadingIds::default();
    let mut first_paragraph = None;
    let mut i = 0;

    while i < input.len() {
        let (event, range) = &input[i];
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let end = end_of(&input, i, |e| matches!(e, TagEnd::CodeBlock));
                let text: String = input[i + 1..end]
                    .iter()
                    .filter_map(|(e, _)| match e {
                        Event::Text(t) => Some(t.as_ref()),
                        _ => None,
                    })
                    .collect();
                out.push(Event::Html(code_block(kind, &text).into()));
                i = end + 1;
                continue;
            }
            Event::Start(Tag::Paragraph) => {
                let end = end_of(&input, i, |e| matches!(e, TagEnd::Paragraph));
                let inner = &input[i + 1..end];
                if let Some(raw) = attribute_block(&source[range.clone()], inner) {
                    out.push(Event::Html(format!("{raw}\n").into()));
                    i = end + 1;
                    continue;
                }
                if first_paragraph.is_none() {
                    first_paragraph = Some(plain_text(inner));
                }
                out.push(event.clone());
            }
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) if ctx.config.render.heading_anchors => {
                let end = end_of(&input, i, |e| matches!(e, TagEnd::Heading(_)));
                let anchor = match id {
                    Some(explicit) => ids.claim(explicit),
                    None => ids.unique(&plain_text(&input[i + 1..end])),
                };
                out.push(Event::Start(Tag::Heading {
                    level: *level,
                    id: Some(anchor.into()),
                    classes: classes.clone(),
                    attrs: attrs.clone(),
                }));
            }
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => out.push(Event::Start(Tag::Link {
                link_type: *link_type,
                dest_url: rewrite_dest(ctx.references, from_dir, dest_url),
                title: title.clone(),
                id: id.clone(),
            })),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => out.push(Event::Start(Tag::Image {
                link_type: *link_type,
                dest_url: rewrite_dest(ctx.references, from_dir, dest_url),
                title: title.clone(),
                id: id.clone(),
            })),
            _ => out.push(event.clone()),
        }
        i += 1;
    }

    let mut html = String::with_capacity(source.len() * 3 / 2);
    md_html::push_html(&mut html, out.into_iter());
    (html, first_paragraph)
}

/// Index of the first `End` after `start` matching `is_end`.
fn end_of(input: &[(Event<'_>, Range<usize>)], start: usize, is_end: impl Fn(&TagEnd) -> bool) -> usize {
    input[start + 1..]
        .iter()
        .position(|(e, _)| matches!(e, Event::End(end) if is_end(end)))
        .map(|offset| start + 1 + offset)
        .unwrap_or(input.len() - 1)
}

fn code_block(kind: &CodeBlockKind<'_>, text: &str) -> String {
    let class = match kind {
        CodeBlockKind::Fenced(info) => info
            .split(|c: char| c.is_whitespace() || c == ',' || c == '{')
            .next()
            .filter(|lang| !lang.is_empty())
            .map(|lang| format!("language-{lang}")),
        CodeBlockKind::Indented => None,
    };
    let mut markup = html! { pre { code class=[class] { (text) } } }.into_string();
    markup.push('\n');
    markup
}

/// The raw source of a paragraph consisting only of a `{: … }` attribute
/// list, or `None` for an ordinary paragraph.
fn attribute_block<'s>(raw: &'s str, inner: &[(Event<'_>, Range<usize>)]) -> Option<&'s str> {
    let plain = inner
        .iter()
        .all(|(e, _)| matches!(e, Event::Text(_) | Event::SoftBreak));
    let raw = raw.trim();
    (plain && raw.starts_with("{:") && raw.ends_with('}')).then_some(raw)
}

/// Visible text of an inline event run, whitespace collapsed.
fn plain_text(events: &[(Event<'_>, Range<usize>)]) -> String {
    let mut text = String::new();
    for (event, _) in events {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic heading anchors: `intro`, `intro-1`, `intro-2`, …
///
/// Every id handed out is recorded, suffixed ones included, so a later
/// heading whose own text slugifies to `intro-1` gets `intro-1-1`.
#[derive(Default)]
struct HeadingIds {
    taken: BTreeSet<String>,
    /// Next suffix to try per base.
    next: BTreeMap<String, usize>,
}

impl HeadingIds {
    fn unique(&mut self, text: &str) -> String {
        let base = match slugify(text) {
            s if s.is_empty() => "section".to_string(),
            s => s,
        };
        if self.taken.insert(base.clone()) {
            return base;
        }
        let suffix = self.next.entry(base.clone()).or_insert(1);
        loop {
            let candidate = format!("{base}-{suffix}");
            *suffix += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Record an author-supplied id so generated ones don't collide with it.
    fn claim(&mut self, explicit: &str) -> String {
        self.taken.insert(explicit.to_string());
        explicit.to_string()
    }
}

fn rewrite_dest<'a>(references: &ReferenceIndex, from_dir: &str, dest: &CowStr<'a>) -> CowStr<'a> {
    match rewrite_url(references, from_dir, dest) {
        Some(url) => url.into(),
        None => dest.clone(),
    }
}

/// Output URL for a local target, keeping its query and fragment. `None`
/// when the target is external, a page URL, or unresolved.
fn rewrite_url(references: &ReferenceIndex, from_dir: &str, target: &str) -> Option<String> {
    let suffix = target.find(['#', '?']).map(|i| &target[i..]).unwrap_or("");
    match references.resolve(from_dir, target) {
        Resolution::Asset(path) => Some(format!(
            "{}/{}{}",
            references.base_url(),
            path.replace(' ', "%20"),
            suffix
        )),
        Resolution::Document(permalink) => Some(format!("{permalink}{suffix}")),
        Resolution::Ignored | Resolution::Page | Resolution::Unresolved => None,
    }
}

fn truncate_summary(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= SUMMARY_LENGTH {
        return text;
    }
    let window: String = text.chars().take(SUMMARY_LENGTH - 1).collect();
    let cut = match window.rfind(' ') {
        Some(space) if space > 0 => &window[..space],
        _ => window.as_str(),
    };
    format!("{}…", cut.trim_end_matches([',', ';', ':', '.']))
}

// ============================================================================
// Structure check
// ============================================================================

/// Elements that never have content.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose end tag HTML lets authors omit.
const OPTIONAL_CLOSE: &[&str] = &[
    "p", "li", "dt", "dd", "tr", "td", "th", "thead", "tbody", "tfoot", "colgroup", "option",
];

/// Elements whose content is raw text, not markup.
const RAW_TEXT: &[&str] = &["script", "style", "textarea"];

/// Check a body for unterminated fences and unbalanced raw HTML.
/// `first_line` is the source-file line on which the body starts.
pub fn check_structure(body: &str, first_line: usize) -> Result<(), RenderError> {
    let to_file_line = |offset: usize| first_line + tags::line_at(body, offset) - 1;
    let mut balance = HtmlBalance::default();

    for (event, range) in Parser::new_ext(body, markdown_options(false)).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) => {
                if let Some(fence) = unclosed_fence(&body[range.clone()]) {
                    return Err(RenderError::UnterminatedFence {
                        line: to_file_line(range.start),
                        fence,
                    });
                }
            }
            Event::Html(fragment) | Event::InlineHtml(fragment) => {
                balance.feed(&fragment, range.start, &to_file_line)?;
            }
            _ => {}
        }
    }
    balance.finish()
}

/// The opening fence of a fenced block whose last line does not close it.
fn unclosed_fence(block: &str) -> Option<String> {
    let strip = |line: &str| {
        line.trim_start_matches(|c: char| c == '>' || c == ' ' || c == '\t')
            .to_string()
    };
    let mut lines = block.lines();
    let opening = strip(lines.next()?);
    let fence_char = opening.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let fence: String = opening.chars().take_while(|c| *c == fence_char).collect();

    let closed = lines
        .filter(|l| !l.trim().is_empty())
        .last()
        .map(strip)
        .is_some_and(|last| {
            let run = last.chars().take_while(|c| *c == fence_char).count();
            run >= fence.chars().count() && last[run..].trim().is_empty()
        });
    (!closed).then_some(fence)
}

#[derive(Default)]
struct HtmlBalance {
    /// Open elements with the line they were opened on.
    stack: Vec<(String, usize)>,
    /// Line of an open `<!--` still waiting for `-->`.
    comment: Option<usize>,
    /// Raw-text element whose end tag ends the raw section.
    raw_text: Option<String>,
    /// Start tag whose `>` is in a later fragment.
    pending: Option<(String, usize)>,
}

impl HtmlBalance {
    fn feed(&mut self, fragment: &str, base: usize, line: &impl Fn(usize) -> usize) -> Result<(), RenderError> {
        let lower = fragment.to_ascii_lowercase();
        let mut pos = 0;

        while pos < fragment.len() {
            if self.comment.is_some() {
                match fragment[pos..].find("-->") {
                    Some(end) => {
                        self.comment = None;
                        pos += end + 3;
                        continue;
                    }
                    None => return Ok(()),
                }
            }
            if let Some((name, opened)) = self.pending.take() {
                match tag_end(&fragment[pos..]) {
                    Some(end) => {
                        let self_closing = fragment[pos..pos + end].trim_end().ends_with('/');
                        self.open(name, opened, self_closing);
                        pos += end + 1;
                        continue;
                    }
                    None => {
                        self.pending = Some((name, opened));
                        return Ok(());
                    }
                }
            }
            if let Some(name) = &self.raw_text {
                match lower[pos..].find(&format!("</{name}")) {
                    Some(close) => {
                        self.raw_text = None;
                        pos += close;
                    }
                    None => return Ok(()),
                }
            }

            let Some(lt) = fragment[pos..].find('<') else {
                break;
            };
            let at = pos + lt;
            let rest = &fragment[at..];

            if rest.starts_with("<!--") {
                self.comment = Some(line(base + at));
                pos = at + 4;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                pos = rest.find('>').map_or(fragment.len(), |end| at + end + 1);
            } else if let Some(after) = rest.strip_prefix("</") {
                let name = tag_name(after);
                if name.is_empty() {
                    pos = at + 2;
                    continue;
                }
                self.close(&name, line(base + at))?;
                pos = rest.find('>').map_or(fragment.len(), |end| at + end + 1);
            } else {
                let name = tag_name(&rest[1..]);
                if name.is_empty() {
                    pos = at + 1;
                    continue;
                }
                let attrs_start = at + 1 + name.len();
                match tag_end(&fragment[attrs_start..]) {
                    Some(end) => {
                        let self_closing = fragment[attrs_start..attrs_start + end].trim_end().ends_with('/');
                        self.open(name, line(base + at), self_closing);
                        pos = attrs_start + end + 1;
                    }
                    None => {
                        self.pending = Some((name, line(base + at)));
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn open(&mut self, name: String, line: usize, self_closing: bool) {
        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            return;
        }
        if RAW_TEXT.contains(&name.as_str()) {
            self.raw_text = Some(name.clone());
        }
        self.stack.push((name, line));
    }

    fn close(&mut self, name: &str, line: usize) -> Result<(), RenderError> {
        let Some(index) = self.stack.iter().rposition(|(open, _)| open == name) else {
            return Err(RenderError::UnbalancedHtml {
                line,
                detail: format!("`</{name}>` has no matching open element"),
            });
        };
        if let Some((open, opened)) = self.stack[index + 1..]
            .iter()
            .find(|(open, _)| !OPTIONAL_CLOSE.contains(&open.as_str()))
        {
            return Err(RenderError::UnbalancedHtml {
                line,
                detail: format!("`</{name}>` closes `<{open}>` opened on line {opened}"),
            });
        }
        self.stack.truncate(index);
        Ok(())
    }

    fn finish(self) -> Result<(), RenderError> {
        if let Some(line) = self.comment {
            return Err(RenderError::UnbalancedHtml {
                line,
                detail: "unterminated `<!--` comment".into(),
            });
        }
        if let Some((name, line)) = self.pending {
            return Err(RenderError::UnbalancedHtml {
                line,
                detail: format!("unterminated `<{name}` tag"),
            });
        }
        match self
            .stack
            .into_iter()
            .find(|(open, _)| !OPTIONAL_CLOSE.contains(&open.as_str()))
        {
            Some((name, line)) => Err(RenderError::UnbalancedHtml {
                line,
                detail: format!("`<{name}>` is never closed"),
            }),
            None => Ok(()),
        }
    }
}

/// Lowercased element name at the start of `text`, or `""`.
fn tag_name(text: &str) -> String {
    if !text.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return String::new();
    }
    text.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Offset of the `>` ending a start tag, skipping quoted attribute values.
fn tag_end(text: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}
