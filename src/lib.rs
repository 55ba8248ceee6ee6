//! # Folio
//!
//! A static publisher for long-form technical essays. Markdown documents with
//! front-matter go in; a directory of plain HTML pages, an index, and the
//! copied assets come out. Every local image, link and include is checked
//! before anything is published.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! ```text
//! 0. Scan      essays/      →  Discovery       (sources, assets, snippets, config)
//! 1. Load      sources      →  Documents       (front-matter, title, date, slug)
//! 2. Validate  Document     →  UnresolvedReference*
//! 3. Render    Document     →  RenderedPage    (HTML body + summary)
//! 4. Publish   pages        →  public/         (pages, index, assets, manifest)
//! ```
//!
//! Scan and load happen once for the whole input; a failure there is
//! structural and stops the build. Validate and render run per document, in
//! parallel, and a failure excludes only that document. Publish waits for
//! every document before it orders the index.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Walks the input directory into sources, assets and snippets |
//! | [`load`] | Front-matter splitting and parsing, title/date/slug resolution |
//! | [`validate`] | Finds every local reference and checks that it resolves |
//! | [`tags`] | `{% post_url %}` and `{% include %}` tags outside code |
//! | [`render`] | Markdown → HTML with pulldown-cmark, structure checks, summaries |
//! | [`publish`] | Maud page templates, the site index, asset copying |
//! | [`cache`] | Content-addressed output manifest for incremental publishing |
//! | [`pipeline`] | Wires the stages together and collects the build report |
//! | [`config`] | `config.toml` loading, validation and stock defaults |
//! | [`types`] | `Document` and front-matter values shared by all stages |
//! | [`naming`] | `YYYY-MM-DD-name` filename convention, slugs, date parsing |
//! | [`output`] | CLI output formatting for build and check reports |
//!
//! # Design Decisions
//!
//! ## Check Everything, Then Write
//!
//! Broken image paths and dead cross-links are the classic failure of a
//! hand-maintained blog: nobody notices until a reader does. Every reference
//! a document makes is resolved against the scanned input before rendering.
//! Under `--strict` a document with a broken reference is not published at
//! all; otherwise it is published and the reference reported.
//!
//! ## Raw HTML Is the Author's
//!
//! Essays lean on hand-written HTML for figures, tables and asides. The
//! renderer passes it through untouched, but refuses a document whose raw
//! HTML is unbalanced or whose code fence never closes, since either would
//! swallow the rest of the page without an error.
//!
//! ## Maud Over Template Engines
//!
//! HTML is generated with [Maud](https://maud.lambda.xyz/), a compile-time HTML
//! macro system, rather than Handlebars or Tera. Advantages:
//!
//! - **Compile-time checking**: malformed HTML is a build error, not a runtime surprise.
//! - **Type-safe**: template variables are Rust expressions, no stringly-typed lookups.
//! - **XSS-safe by default**: all interpolation is auto-escaped.
//! - **Zero runtime files**: no template directory to ship or get out of sync.
//!
//! ## Deterministic Output
//!
//! Same input, same bytes. The index order is total (date, then slug), every
//! map is a `BTreeMap`, parallel results are collected in source order, and
//! nothing reads the clock. Combined with the output manifest this means a
//! rebuild of an unchanged site touches no files.

pub mod cache;
pub mod config;
pub mod load;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod render;
pub mod scan;
pub mod tags;
pub mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_helpers;
