//! Shared types used across all pipeline stages.
//!
//! A [`Document`] is produced once by the loader and only ever borrowed
//! afterwards: the validator and renderer read it, nothing mutates it.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A single front-matter value.
///
/// Front-matter is flat: scalars, or lists of scalars (for `tags` and
/// similar). Nested mappings are rejected at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<MetaValue>),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Every string this value carries: itself, or each string in a list.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            MetaValue::Text(s) => vec![s.as_str()],
            MetaValue::List(items) => items.iter().filter_map(MetaValue::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Null => Ok(()),
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Integer(i) => write!(f, "{i}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Text(s) => f.write_str(s),
            MetaValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// Parsed front-matter: string keys to flat values, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub fields: BTreeMap<String, MetaValue>,
}

impl FrontMatter {
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.fields.get(key)
    }

    /// A non-empty, trimmed string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(MetaValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A source document, immutable after load.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the input root, `/`-separated. The document's identity.
    pub source: PathBuf,
    /// Filename stem (`2026-01-24-store-buffers`), the key for `{% post_url %}`.
    pub stem: String,
    pub front_matter: FrontMatter,
    /// Markdown body with the front-matter block removed.
    pub body: String,
    /// 1-based line of the source file on which `body` starts.
    pub body_line: usize,
    /// Front-matter `title`, first `# ` heading, or filename display title.
    pub title: String,
    pub date: Option<NaiveDate>,
    /// Unique, URL-safe identifier.
    pub slug: String,
    /// Public URL of the rendered page.
    pub permalink: String,
}

impl Document {
    /// Source path as a `/`-separated string.
    pub fn source_str(&self) -> String {
        self.source.to_string_lossy().replace('\\', "/")
    }

    /// Directory of the source, relative to the input root (`""` at the root).
    pub fn source_dir(&self) -> String {
        let source = self.source_str();
        match source.rfind('/') {
            Some(idx) => source[..idx].to_string(),
            None => String::new(),
        }
    }
}
