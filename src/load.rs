//! Document loading: front-matter parsing and identity derivation.
//!
//! Turns source paths found by the scanner into immutable [`Document`]s.
//!
//! ## Front-matter
//!
//! A document may open with a YAML block fenced by `---` or a TOML block
//! fenced by `+++`:
//!
//! ```text
//! ---
//! layout: post
//! title: "The x86-TSO Memory Model"
//! author: Ada
//! image: /assets/store-buffer.png
//! ---
//! Body starts here.
//! ```
//!
//! Front-matter is flat. Values are scalars or lists of scalars; a nested
//! mapping makes the document malformed. A document with no front-matter at
//! all gets defaults. A document with front-matter and nothing after it is
//! valid and has an empty body.
//!
//! ## Identity
//!
//! | Attribute | First available wins |
//! |-----------|----------------------|
//! | title | `title` field → first `# ` heading → filename display title |
//! | date | `date` field → `YYYY-MM-DD-` filename prefix → none |
//! | slug | `slug` field → filename without date prefix → title → `untitled` |
//!
//! Slugs must be unique across the whole corpus. A clash is a structural
//! error: the build stops before anything is rendered.

use crate::config::SiteConfig;
use crate::naming::{self, parse_entry_name};
use crate::publish::GENERATED_FILES;
use crate::types::{Document, FrontMatter, MetaValue};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed front-matter in {}: {message}", .path.display())]
    MalformedFrontMatter { path: PathBuf, message: String },
    #[error(
        "Duplicate slug '{slug}': {} and {} resolve to the same permalink",
        .first.display(),
        .second.display()
    )]
    DuplicateSlug {
        slug: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error(
        "Slug '{slug}' of {} would be published as {output}, which is a generated file",
        .path.display()
    )]
    ReservedSlug {
        slug: String,
        path: PathBuf,
        output: String,
    },
}

/// Front-matter block syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontMatterFormat {
    Yaml,
    Toml,
}

impl FrontMatterFormat {
    fn fence(self) -> &'static str {
        match self {
            FrontMatterFormat::Yaml => "---",
            FrontMatterFormat::Toml => "+++",
        }
    }
}

/// A source file split into its front-matter block and body.
#[derive(Debug, PartialEq)]
pub struct Split<'a> {
    pub format: Option<FrontMatterFormat>,
    /// Text between the fences (empty when there is no block).
    pub raw_front_matter: &'a str,
    pub body: &'a str,
    /// 1-based line on which the body starts.
    pub body_line: usize,
}

/// Separate a front-matter block from the body.
///
/// The block must open on the very first line. An opening fence that is
/// never closed is an error rather than silently becoming body text.
pub fn split_front_matter(text: &str) -> Result<Split<'_>, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let first_line = text.lines().next().unwrap_or("");
    let format = match first_line.trim_end() {
        "---" => FrontMatterFormat::Yaml,
        "+++" => FrontMatterFormat::Toml,
        _ => {
            return Ok(Split {
                format: None,
                raw_front_matter: "",
                body: text,
                body_line: 1,
            });
        }
    };

    let fence = format.fence();
    let block_start = line_end(text, 0);
    let mut pos = block_start;
    let mut line_no = 2;
    while pos < text.len() {
        let next = line_end(text, pos);
        if text[pos..next].trim_end() == fence {
            return Ok(Split {
                format: Some(format),
                raw_front_matter: &text[block_start..pos],
                body: &text[next..],
                body_line: line_no + 1,
            });
        }
        pos = next;
        line_no += 1;
    }
    Err(format!("`{fence}` block opened on line 1 is never closed"))
}

/// Byte offset just past the line starting at `start` (including its newline).
fn line_end(text: &str, start: usize) -> usize {
    text[start..]
        .find('\n')
        .map(|i| start + i + 1)
        .unwrap_or(text.len())
}

/// Parse a raw front-matter block into flat fields.
pub fn parse_front_matter(format: FrontMatterFormat, raw: &str) -> Result<FrontMatter, String> {
    let fields = match format {
        FrontMatterFormat::Yaml => parse_yaml(raw)?,
        FrontMatterFormat::Toml => parse_toml(raw)?,
    };
    Ok(FrontMatter { fields })
}

fn parse_yaml(raw: &str) -> Result<BTreeMap<String, MetaValue>, String> {
    let value: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
    let mapping = match value {
        serde_yaml::Value::Null => return Ok(BTreeMap::new()),
        serde_yaml::Value::Mapping(m) => m,
        _ => return Err("front-matter must be a key-value mapping".to_string()),
    };
    let mut fields = BTreeMap::new();
    for (key, value) in mapping {
        let key = match key {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            _ => return Err("front-matter keys must be strings".to_string()),
        };
        let value = yaml_value(&key, value, true)?;
        fields.insert(key, value);
    }
    Ok(fields)
}

fn yaml_value(key: &str, value: serde_yaml::Value, allow_list: bool) -> Result<MetaValue, String> {
    use serde_yaml::Value;
    Ok(match value {
        Value::Null => MetaValue::Null,
        Value::Bool(b) => MetaValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => MetaValue::Integer(i),
            None => MetaValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => MetaValue::Text(s),
        Value::Sequence(items) if allow_list => MetaValue::List(
            items
                .into_iter()
                .map(|item| yaml_value(key, item, false))
                .collect::<Result<_, _>>()?,
        ),
        Value::Sequence(_) => return Err(format!("field `{key}` contains a nested list")),
        Value::Mapping(_) => return Err(format!("field `{key}` is a nested mapping")),
        Value::Tagged(tagged) => return Err(format!("field `{key}` has an unsupported tag {}", tagged.tag)),
    })
}

fn parse_toml(raw: &str) -> Result<BTreeMap<String, MetaValue>, String> {
    let table: toml::Table = toml::from_str(raw).map_err(|e| e.to_string())?;
    table
        .into_iter()
        .map(|(key, value)| {
            let value = toml_value(&key, value, true)?;
            Ok((key, value))
        })
        .collect()
}

fn toml_value(key: &str, value: toml::Value, allow_list: bool) -> Result<MetaValue, String> {
    use toml::Value;
    Ok(match value {
        Value::Boolean(b) => MetaValue::Bool(b),
        Value::Integer(i) => MetaValue::Integer(i),
        Value::Float(x) => MetaValue::Float(x),
        Value::String(s) => MetaValue::Text(s),
        Value::Datetime(dt) => MetaValue::Text(dt.to_string()),
        Value::Array(items) if allow_list => MetaValue::List(
            items
                .into_iter()
                .map(|item| toml_value(key, item, false))
                .collect::<Result<_, _>>()?,
        ),
        Value::Array(_) => return Err(format!("field `{key}` contains a nested list")),
        Value::Table(_) => return Err(format!("field `{key}` is a nested table")),
    })
}

/// Load every source into a path-keyed map of documents.
///
/// Files are read in parallel. When several documents fail, the error for
/// the first one in path order is returned, so the same corpus always
/// reports the same problem.
pub fn load_documents(
    root: &Path,
    sources: &[PathBuf],
    config: &SiteConfig,
) -> Result<BTreeMap<PathBuf, Document>, LoadError> {
    let mut results: Vec<(PathBuf, Result<Document, LoadError>)> = sources
        .par_iter()
        .map(|rel| (rel.clone(), load_document(root, rel, config)))
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut documents = BTreeMap::new();
    for (path, result) in results {
        documents.insert(path, result?);
    }

    check_unique_slugs(&documents, config)?;
    tracing::info!(documents = documents.len(), "loaded documents");
    Ok(documents)
}

/// Reject two documents that resolve to the same slug, and any document
/// whose page would overwrite the index or stylesheet.
pub fn check_unique_slugs(
    documents: &BTreeMap<PathBuf, Document>,
    config: &SiteConfig,
) -> Result<(), LoadError> {
    let mut seen: BTreeMap<&str, &Path> = BTreeMap::new();
    for (path, doc) in documents {
        let output = config.output_path(&doc.slug);
        if GENERATED_FILES.contains(&output.as_str()) {
            return Err(LoadError::ReservedSlug {
                slug: doc.slug.clone(),
                path: path.clone(),
                output,
            });
        }
        if let Some(first) = seen.insert(&doc.slug, path) {
            return Err(LoadError::DuplicateSlug {
                slug: doc.slug.clone(),
                first: first.to_path_buf(),
                second: path.clone(),
            });
        }
    }
    Ok(())
}

/// Read and parse a single document. `rel` is relative to `root`.
pub fn load_document(root: &Path, rel: &Path, config: &SiteConfig) -> Result<Document, LoadError> {
    let text = fs::read_to_string(root.join(rel)).map_err(|source| LoadError::Io {
        path: rel.to_path_buf(),
        source,
    })?;
    parse_document(rel, &text, config)
}

/// Build a [`Document`] from already-read source text.
pub fn parse_document(rel: &Path, text: &str, config: &SiteConfig) -> Result<Document, LoadError> {
    let malformed = |message: String| LoadError::MalformedFrontMatter {
        path: rel.to_path_buf(),
        message,
    };

    let split = split_front_matter(text).map_err(malformed)?;
    let front_matter = match split.format {
        Some(format) => parse_front_matter(format, split.raw_front_matter).map_err(malformed)?,
        None => FrontMatter::default(),
    };

    let stem = rel
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parsed = parse_entry_name(&stem);

    let title = front_matter
        .get_str("title")
        .map(str::to_string)
        .or_else(|| first_heading(split.body))
        .unwrap_or_else(|| {
            if parsed.display_title.is_empty() {
                stem.clone()
            } else {
                parsed.display_title.clone()
            }
        });

    let date = match front_matter.get("date") {
        None | Some(MetaValue::Null) => parsed.date,
        Some(MetaValue::Text(s)) => Some(
            naming::parse_date(s).ok_or_else(|| malformed(format!("unrecognised date `{s}`")))?,
        ),
        Some(other) => return Err(malformed(format!("unrecognised date `{other}`"))),
    };

    let slug = [
        front_matter.get_str("slug").unwrap_or(""),
        parsed.name.as_str(),
        title.as_str(),
    ]
    .iter()
    .map(|candidate| naming::slugify(candidate))
    .find(|s| !s.is_empty())
    .unwrap_or_else(|| "untitled".to_string());

    let permalink = config.permalink(&slug);

    Ok(Document {
        source: rel.to_path_buf(),
        stem,
        front_matter,
        body: split.body.to_string(),
        body_line: split.body_line,
        title,
        date,
        slug,
        permalink,
    })
}

/// First `# ` heading outside fenced code.
fn first_heading(body: &str) -> Option<String> {
    let mut fence: Option<&str> = None;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if let Some(open) = fence {
            if trimmed.starts_with(open) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            fence = Some("```");
        } else if trimmed.starts_with("~~~") {
            fence = Some("~~~");
        } else if let Some(heading) = line.strip_prefix("# ") {
            let heading = heading.trim();
            if !heading.is_empty() {
                return Some(heading.to_string());
            }
        }
    }
    None
}
