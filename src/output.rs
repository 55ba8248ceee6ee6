//! CLI output formatting for builds and checks.
//!
//! # Information-First Display
//!
//! Each document is listed by its positional index and title, with the
//! source path as an indented context line. Problems follow in their own
//! sections, one line per problem, always starting with the source path so
//! the line can be pasted straight into an editor.
//!
//! ```text
//! Documents
//! 001 Virtual Dispatch → virtual-dispatch.html
//!     Source: _posts/2026-01-20-virtual-dispatch.md
//! 002 Store Buffers and TSO (skipped)
//!     Source: _posts/2026-01-24-x86-tso.md
//!
//! Errors
//! _posts/2026-01-24-x86-tso.md: unresolved asset reference `/assets/sb.png` (front-matter `image`)
//!
//! Processed 1, skipped 1, failed 0, warnings 0
//! Output: 4 written, 1 unchanged (5 total)
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::pipeline::{BuildReport, DocumentReport, Outcome};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn source_of(doc: &DocumentReport) -> String {
    doc.source.to_string_lossy().replace('\\', "/")
}

/// Header line for one document.
///
/// ```text
/// 001 Virtual Dispatch → virtual-dispatch.html
/// 002 Store Buffers and TSO (skipped)
/// ```
fn document_header(index: usize, doc: &DocumentReport) -> String {
    let detail = match &doc.outcome {
        Outcome::Rendered { page, .. } => format!(" → {}", page.output_path),
        Outcome::Skipped(_) => " (skipped)".to_string(),
        Outcome::Failed { .. } => " (failed)".to_string(),
    };
    format!("{} {}{}", format_index(index), doc.title, detail)
}

// ============================================================================
// Build / check report
// ============================================================================

/// Format the per-document listing, problems, and totals.
pub fn format_report(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();

    if !report.documents.is_empty() {
        lines.push("Documents".to_string());
        for (i, doc) in report.documents.iter().enumerate() {
            lines.push(document_header(i + 1, doc));
            lines.push(format!("{}Source: {}", indent(1), source_of(doc)));
        }
    }

    let errors = format_errors(report);
    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors".to_string());
        lines.extend(errors);
    }

    let warnings = format_warnings(report);
    if !warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings".to_string());
        lines.extend(warnings);
    }

    lines.push(String::new());
    lines.push(format!(
        "Processed {}, skipped {}, failed {}, warnings {}",
        report.processed(),
        report.skipped(),
        report.failed(),
        report.warnings()
    ));
    if let Some(stats) = &report.output {
        lines.push(format!("Output: {stats}"));
    }
    lines
}

/// One line per skipped or failed document problem: `path: reason`.
pub fn format_errors(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();
    for doc in &report.documents {
        match &doc.outcome {
            Outcome::Skipped(refs) => lines.extend(refs.iter().map(ToString::to_string)),
            Outcome::Failed { error, .. } => lines.push(format!("{}: {}", source_of(doc), error)),
            Outcome::Rendered { .. } => {}
        }
    }
    lines
}

/// Unresolved references on documents that were not skipped for them,
/// including documents the renderer rejected.
pub fn format_warnings(report: &BuildReport) -> Vec<String> {
    report
        .documents
        .iter()
        .flat_map(|doc| doc.outcome.warnings())
        .map(ToString::to_string)
        .collect()
}

pub fn print_report(report: &BuildReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}
