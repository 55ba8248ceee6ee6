//! Build orchestration.
//!
//! Wires the stages together:
//!
//! ```text
//! scan → load ─┬─ validate → render ─┐   (per document, in parallel)
//!              ├─ validate → render ─┼─→ publish
//!              └─ validate → render ─┘
//! ```
//!
//! Scan and load errors are structural and stop the build before anything is
//! rendered or written. After that, each document succeeds or fails on its
//! own: a broken reference or a render error excludes only that document.
//!
//! With `strict`, a document with unresolved references is skipped and never
//! rendered. Without it the document is rendered anyway and the references
//! are reported as warnings.

use crate::cache::OutputStats;
use crate::config::{self, ProcessingConfig};
use crate::load::{self, LoadError};
use crate::publish::{self, PublishError, PublishOptions, Site};
use crate::render::{self, RenderContext, RenderError, RenderedPage};
use crate::scan::{self, ScanError};
use crate::types::Document;
use crate::validate::{self, ReferenceIndex, UnresolvedReference};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("Output directory must differ from the input directory: {0}")]
    OutputIsInput(PathBuf),
}

impl BuildError {
    /// True when the invocation itself was wrong (missing input, bad config)
    /// rather than the content.
    pub fn is_invocation(&self) -> bool {
        matches!(
            self,
            BuildError::Scan(ScanError::NotADirectory(_) | ScanError::Config(_))
                | BuildError::OutputIsInput(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub input: PathBuf,
    /// `None` checks the input without writing anything.
    pub output: Option<PathBuf>,
    pub strict: bool,
    pub use_cache: bool,
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rendered; any unresolved references were downgraded to warnings.
    Rendered {
        page: Box<RenderedPage>,
        warnings: Vec<UnresolvedReference>,
    },
    /// Not rendered because of unresolved references (strict mode).
    Skipped(Vec<UnresolvedReference>),
    /// The renderer rejected the document.
    Failed {
        error: RenderError,
        warnings: Vec<UnresolvedReference>,
    },
}

impl Outcome {
    /// Unresolved references reported as warnings. Empty for a skip, whose
    /// references are the reason it was skipped.
    pub fn warnings(&self) -> &[UnresolvedReference] {
        match self {
            Outcome::Rendered { warnings, .. } | Outcome::Failed { warnings, .. } => warnings,
            Outcome::Skipped(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReport {
    pub source: PathBuf,
    pub title: String,
    pub outcome: Outcome,
}

/// Result of a build or check, in source path order.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub documents: Vec<DocumentReport>,
    /// Artifact counts; `None` for a check.
    pub output: Option<OutputStats>,
}

impl BuildReport {
    pub fn pages(&self) -> impl Iterator<Item = &RenderedPage> {
        self.documents.iter().filter_map(|d| match &d.outcome {
            Outcome::Rendered { page, .. } => Some(page.as_ref()),
            _ => None,
        })
    }

    pub fn processed(&self) -> usize {
        self.pages().count()
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    /// Unresolved references on documents that were not skipped for them:
    /// rendered anyway, or rejected by the renderer for another reason.
    pub fn warnings(&self) -> usize {
        self.documents.iter().map(|d| d.outcome.warnings().len()).sum()
    }

    /// `0` when every document was published, `1` when any was skipped or
    /// failed.
    pub fn exit_code(&self) -> u8 {
        if self.skipped() > 0 || self.failed() > 0 {
            1
        } else {
            0
        }
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.outcome)).count()
    }
}

/// Run the whole pipeline. Writes only when `options.output` is set.
pub fn build(options: &BuildOptions) -> Result<BuildReport, BuildError> {
    if let Some(output) = &options.output
        && same_dir(&options.input, output)
    {
        return Err(BuildError::OutputIsInput(output.clone()));
    }

    let discovery = scan::scan(&options.input, options.output.as_deref())?;
    init_thread_pool(&discovery.config.processing);

    let documents = load::load_documents(&discovery.root, &discovery.sources, &discovery.config)?;
    let references = ReferenceIndex::new(
        documents.values(),
        &discovery.assets,
        discovery.snippets.keys(),
        &discovery.config,
    );
    let ctx = RenderContext {
        config: &discovery.config,
        references: &references,
        snippets: &discovery.snippets,
    };

    let docs: Vec<&Document> = documents.values().collect();
    let reports = process_documents(&docs, &ctx, options.strict);

    let mut report = BuildReport {
        documents: reports,
        output: None,
    };

    if let Some(output_dir) = &options.output {
        let pages: Vec<RenderedPage> = report.pages().cloned().collect();
        let site = Site {
            config: &discovery.config,
            root: &discovery.root,
            assets: &discovery.assets,
        };
        let publish_options = PublishOptions {
            use_cache: options.use_cache,
        };
        report.output = Some(publish::publish(&pages, &site, output_dir, &publish_options)?);
    }

    Ok(report)
}

/// Validate and render every document in parallel. The result keeps the
/// order of `docs`.
pub fn process_documents(docs: &[&Document], ctx: &RenderContext<'_>, strict: bool) -> Vec<DocumentReport> {
    docs.par_iter()
        .map(|doc| process_document(doc, ctx, strict))
        .collect()
}

fn process_document(doc: &Document, ctx: &RenderContext<'_>, strict: bool) -> DocumentReport {
    let warnings = validate::validate(doc, ctx.references);
    let outcome = if strict && !warnings.is_empty() {
        tracing::debug!("skipping {}: {} unresolved", doc.source.display(), warnings.len());
        Outcome::Skipped(warnings)
    } else {
        match render::render(doc, ctx) {
            Ok(page) => Outcome::Rendered {
                page: Box::new(page),
                warnings,
            },
            Err(error) => Outcome::Failed { error, warnings },
        }
    };
    DocumentReport {
        source: doc.source.clone(),
        title: doc.title.clone(),
        outcome,
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The global pool can only be
/// built once per process; later calls are no-ops.
pub fn init_thread_pool(processing: &ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{find_report, page_slugs, setup_fixtures, write_file};
    use tempfile::TempDir;

    fn options(input: &Path, output: Option<&Path>, strict: bool) -> BuildOptions {
        BuildOptions {
            input: input.to_path_buf(),
            output: output.map(Path::to_path_buf),
            strict,
            use_cache: true,
        }
    }

    fn site_with_broken_image() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "_posts/2026-01-20-good.md", "# Good\n\nFine.\n");
        write_file(
            tmp.path(),
            "_posts/2026-01-24-broken.md",
            "---\nimage: /assets/missing.png\n---\n# Broken\n",
        );
        tmp
    }

    #[test]
    fn strict_skips_document_with_broken_reference() {
        let input = site_with_broken_image();
        let report = build(&options(input.path(), None, true)).unwrap();
        assert_eq!(report.processed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.exit_code(), 1);
        match &report.documents[1].outcome {
            Outcome::Skipped(refs) => assert_eq!(refs[0].target, "/assets/missing.png"),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn non_strict_renders_and_warns() {
        let input = site_with_broken_image();
        let report = build(&options(input.path(), None, false)).unwrap();
        assert_eq!(report.processed(), 2);
        assert_eq!(report.warnings(), 1);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn render_failure_excludes_only_that_document() {
        let input = TempDir::new().unwrap();
        write_file(input.path(), "a.md", "# A\n");
        write_file(input.path(), "b.md", "```\nnever closed\n");
        let output = TempDir::new().unwrap();
        let report = build(&options(input.path(), Some(output.path()), false)).unwrap();

        assert_eq!(report.processed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(output.path().join("a.html").exists());
        assert!(!output.path().join("b.html").exists());
    }

    #[test]
    fn failed_document_still_reports_its_broken_references() {
        let input = TempDir::new().unwrap();
        write_file(input.path(), "a.md", "---\nimage: /missing.png\n---\n```\nnever closed\n");
        let report = build(&options(input.path(), None, false)).unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.warnings(), 1);
        assert_eq!(report.documents[0].outcome.warnings()[0].target, "/missing.png");
    }

    #[test]
    fn check_writes_nothing() {
        let input = site_with_broken_image();
        let report = build(&options(input.path(), None, false)).unwrap();
        assert!(report.output.is_none());
        assert!(!input.path().join("index.html").exists());
    }

    #[test]
    fn duplicate_slug_is_structural() {
        let input = TempDir::new().unwrap();
        write_file(input.path(), "2026-01-01-same.md", "# One\n");
        write_file(input.path(), "2026-02-01-same.md", "# Two\n");
        let output = TempDir::new().unwrap();
        let err = build(&options(input.path(), Some(output.path()), false)).unwrap_err();

        assert!(matches!(err, BuildError::Load(LoadError::DuplicateSlug { .. })));
        assert!(!err.is_invocation());
        assert!(!output.path().join("index.html").exists());
    }

    #[test]
    fn missing_input_is_invocation_error() {
        let tmp = TempDir::new().unwrap();
        let err = build(&options(&tmp.path().join("nope"), None, false)).unwrap_err();
        assert!(err.is_invocation());
    }

    #[test]
    fn output_equal_to_input_is_rejected() {
        let input = site_with_broken_image();
        let err = build(&options(input.path(), Some(input.path()), false)).unwrap_err();
        assert!(matches!(err, BuildError::OutputIsInput(_)));
    }

    #[test]
    fn fixture_site_builds_cleanly_under_strict() {
        let input = setup_fixtures();
        let output = TempDir::new().unwrap();
        let report = build(&options(input.path(), Some(output.path()), true)).unwrap();

        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.warnings(), 0);
        assert_eq!(page_slugs(&report), vec!["virtual-dispatch", "x86-tso", "about"]);

        let tso = find_report(&report, "_posts/2026-01-24-x86-tso.md");
        let Outcome::Rendered { page, .. } = &tso.outcome else {
            panic!("expected x86-tso to render, got {:?}", tso.outcome);
        };
        assert!(page.html.contains("href=\"/virtual-dispatch.html\""));
        assert!(page.html.contains("<table class=\"cpus\">"));
        assert!(page.html.contains("{% include cpu-table.html %}"));
        assert!(page.html.contains("{: .note }"));
        assert_eq!(page.author.as_deref(), Some("Ada Example"));
    }
}
