//! End-to-end builds through the library API.
//!
//! Each test copies `fixtures/essays/` into a temp dir, optionally edits it,
//! and builds into a second temp dir.

use folio::cache::manifest_path;
use folio::load::LoadError;
use folio::pipeline::{BuildError, BuildOptions, BuildReport, build};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn fixture_input() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/essays");
    for entry in WalkDir::new(&fixtures) {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(&fixtures).unwrap();
        let dest = tmp.path().join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).unwrap();
        } else {
            fs::copy(entry.path(), &dest).unwrap();
        }
    }
    tmp
}

fn run(input: &Path, output: &Path, strict: bool) -> BuildReport {
    build(&BuildOptions {
        input: input.to_path_buf(),
        output: Some(output.to_path_buf()),
        strict,
        use_cache: true,
    })
    .unwrap()
}

/// Every output file (manifest excluded) with its bytes, sorted by path.
fn snapshot(output: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let manifest = manifest_path(output);
    WalkDir::new(output)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file() && e.path() != manifest)
        .map(|e| {
            let rel = e.path().strip_prefix(output).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn index_lists_newest_first() {
    let input = fixture_input();
    let output = TempDir::new().unwrap();
    run(input.path(), output.path(), true);

    let index = fs::read_to_string(output.path().join("index.html")).unwrap();
    let tso = index.find("/x86-tso.html").unwrap();
    let dispatch = index.find("/virtual-dispatch.html").unwrap();
    let about = index.find("/about.html").unwrap();
    assert!(tso < dispatch, "2026-01-24 must precede 2026-01-20");
    assert!(dispatch < about, "undated documents come last");
}

#[test]
fn assets_and_stylesheet_are_published() {
    let input = fixture_input();
    let output = TempDir::new().unwrap();
    run(input.path(), output.path(), true);

    assert_eq!(
        fs::read(output.path().join("assets/vtable.png")).unwrap(),
        fs::read(input.path().join("assets/vtable.png")).unwrap()
    );
    assert!(output.path().join("style.css").exists());
    assert!(!output.path().join("README.md").exists());
    assert!(!output.path().join("config.toml").exists());
    assert!(!output.path().join("_includes/cpu-table.html").exists());
}

#[test]
fn missing_image_strict_and_non_strict() {
    let input = fixture_input();
    fs::remove_file(input.path().join("assets/store-buffer.svg")).unwrap();

    let strict_out = TempDir::new().unwrap();
    let report = run(input.path(), strict_out.path(), true);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.exit_code(), 1);
    assert!(!strict_out.path().join("x86-tso.html").exists());
    assert!(strict_out.path().join("virtual-dispatch.html").exists());

    let lenient_out = TempDir::new().unwrap();
    let report = run(input.path(), lenient_out.path(), false);
    assert_eq!(report.exit_code(), 0);
    // Front-matter image and the <img> in the figure.
    assert_eq!(report.warnings(), 2);
    assert!(lenient_out.path().join("x86-tso.html").exists());
}

#[test]
fn duplicate_slugs_write_nothing() {
    let input = fixture_input();
    write(input.path(), "drafts/x86-tso.md", "# Another TSO\n");
    let output = TempDir::new().unwrap();

    let err = build(&BuildOptions {
        input: input.path().to_path_buf(),
        output: Some(output.path().to_path_buf()),
        strict: false,
        use_cache: true,
    })
    .unwrap_err();

    assert!(matches!(err, BuildError::Load(_)));
    assert!(err.to_string().contains("x86-tso"));
    assert!(fs::read_dir(output.path()).unwrap().next().is_none());
}

#[test]
fn page_named_index_is_refused_before_writing() {
    let input = fixture_input();
    write(input.path(), "index.md", "---\ntitle: Home\n---\nWelcome.\n");
    let output = TempDir::new().unwrap();

    let err = build(&BuildOptions {
        input: input.path().to_path_buf(),
        output: Some(output.path().to_path_buf()),
        strict: false,
        use_cache: true,
    })
    .unwrap_err();

    assert!(matches!(
        err,
        BuildError::Load(LoadError::ReservedSlug { output: ref file, .. }) if file == "index.html"
    ));
    assert!(fs::read_dir(output.path()).unwrap().next().is_none());
}

#[test]
fn rebuild_is_byte_identical_and_writes_nothing() {
    let input = fixture_input();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    run(input.path(), first.path(), true);
    run(input.path(), second.path(), true);
    assert_eq!(snapshot(first.path()), snapshot(second.path()));

    let again = run(input.path(), first.path(), true);
    assert_eq!(again.output.unwrap().written, 0);
}

#[test]
fn body_edit_rewrites_only_that_page() {
    let input = fixture_input();
    let output = TempDir::new().unwrap();
    run(input.path(), output.path(), true);

    let about = input.path().join("about.md");
    let mut text = fs::read_to_string(&about).unwrap();
    text.push_str("\nA second paragraph.\n");
    fs::write(&about, text).unwrap();

    let stats = run(input.path(), output.path(), true).output.unwrap();
    assert_eq!(stats.written, 1);
    assert_eq!(stats.removed, 0);
}

#[test]
fn deleted_document_is_pruned() {
    let input = fixture_input();
    let output = TempDir::new().unwrap();
    run(input.path(), output.path(), true);
    assert!(output.path().join("about.html").exists());

    fs::remove_file(input.path().join("about.md")).unwrap();
    let stats = run(input.path(), output.path(), true).output.unwrap();

    assert_eq!(stats.removed, 1);
    assert!(!output.path().join("about.html").exists());
}

#[test]
fn nested_output_directory_is_not_scanned() {
    let input = fixture_input();
    let output = input.path().join("public");
    run(input.path(), &output, true);
    let report = run(input.path(), &output, true);

    assert_eq!(report.processed(), 3);
    assert!(!output.join("public").exists());
}
