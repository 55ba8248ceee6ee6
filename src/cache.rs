//! Output manifest for incremental builds.
//!
//! Every artifact the publisher produces (pages, the index, the stylesheet,
//! copied assets) is recorded with the SHA-256 of its contents. On the next
//! build an artifact is rewritten only when its new hash differs from the
//! recorded one or the file on disk no longer matches. Artifacts recorded by
//! the previous build but not produced by this one are stale and removed.
//!
//! ## Cache keys
//!
//! The manifest is **content-addressed**: the key is the output path, the
//! value the hash of the bytes written there. Content hashes rather than
//! mtimes, so a `git checkout` of the input (which resets modification
//! times) does not cause a full rewrite.
//!
//! ## Storage
//!
//! A JSON file at `<output_dir>/.folio-manifest.json`. Only files listed in
//! the manifest are ever deleted; anything else a user puts in the output
//! directory is left alone.
//!
//! ## Bypassing the cache
//!
//! `--no-cache` starts from an empty manifest, so every artifact is written.
//! Stale files from the previous build are still pruned.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the manifest file within the output directory.
const MANIFEST_FILENAME: &str = ".folio-manifest.json";

/// Version of the manifest format. Bump to invalidate existing manifests.
const MANIFEST_VERSION: u32 = 1;

/// Output path (relative, `/`-separated) → SHA-256 of its contents.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutputManifest {
    pub version: u32,
    pub entries: BTreeMap<String, String>,
}

impl OutputManifest {
    /// An empty manifest (first build or `--no-cache`).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load from the output directory. Returns an empty manifest if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(output_dir: &Path) -> Self {
        let content = match std::fs::read_to_string(manifest_path(output_dir)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(m) if m.version == MANIFEST_VERSION => m,
            _ => Self::empty(),
        }
    }

    /// Save to the output directory.
    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(output_dir), json)
    }

    /// True when `path` was recorded with `hash` and the file on disk still
    /// has exactly that content.
    pub fn is_current(&self, path: &str, hash: &str, output_dir: &Path) -> bool {
        self.entries.get(path).is_some_and(|recorded| recorded == hash)
            && hash_file(&output_dir.join(path)).is_ok_and(|on_disk| on_disk == hash)
    }

    pub fn insert(&mut self, path: String, hash: String) {
        self.entries.insert(path, hash);
    }

    /// Paths recorded here that are missing from `current`, sorted.
    pub fn stale_paths<'a>(&'a self, current: &OutputManifest) -> Vec<&'a str> {
        self.entries
            .keys()
            .filter(|path| !current.entries.contains_key(*path))
            .map(String::as_str)
            .collect()
    }
}

/// SHA-256 of a byte slice, as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// What the publisher did with each artifact.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutputStats {
    pub written: u32,
    pub unchanged: u32,
    pub removed: u32,
}

impl OutputStats {
    pub fn write(&mut self) {
        self.written += 1;
    }

    pub fn keep(&mut self) {
        self.unchanged += 1;
    }

    pub fn remove(&mut self) {
        self.removed += 1;
    }

    pub fn total(&self) -> u32 {
        self.written + self.unchanged
    }
}

impl fmt::Display for OutputStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unchanged > 0 {
            write!(
                f,
                "{} written, {} unchanged ({} total)",
                self.written,
                self.unchanged,
                self.total()
            )?;
        } else {
            write!(f, "{} written", self.written)?;
        }
        if self.removed > 0 {
            write!(f, ", {} removed", self.removed)?;
        }
        Ok(())
    }
}

/// Resolve the manifest path for an output directory.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MANIFEST_FILENAME)
}
