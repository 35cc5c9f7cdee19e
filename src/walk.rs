//! Filesystem adapter (collaborator interface).
//!
//! The engine reaches the disk only through [`FileSystem`], so shells can
//! substitute sandboxed or virtual trees and tests can inject failures.
//! [`OsFileSystem`] is the default, built on the `ignore` walker with
//! override globs for extension includes.

use crate::cancel::CancelToken;
use crate::types::FileMeta;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Discovery options for one root.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Include globs (e.g. `*.rs`); empty means every file.
    pub include_globs: Vec<String>,
    pub max_depth: Option<usize>,
    pub include_hidden: bool,
}

/// What discovery produced for one root: candidate files plus per-path
/// errors that did not stop the walk.
#[derive(Debug, Default)]
pub struct Listing {
    pub paths: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// The filesystem surface the engine consumes.
pub trait FileSystem: Send + Sync {
    /// Walk `root`, honoring the include globs, depth bound, and hidden
    /// flag. Cancellation is polled per visited entry.
    fn list_files(&self, root: &Path, opts: &ListOptions, cancel: &CancelToken) -> Listing;

    fn stat(&self, path: &Path) -> io::Result<FileMeta>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// Default adapter over the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn list_files(&self, root: &Path, opts: &ListOptions, cancel: &CancelToken) -> Listing {
        let mut listing = Listing::default();

        if !root.exists() {
            listing.errors.push(format!("{}: path does not exist", root.display()));
            return listing;
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .hidden(!opts.include_hidden)
            .follow_links(false)
            .max_depth(opts.max_depth);

        if !opts.include_globs.is_empty() {
            let mut overrides = OverrideBuilder::new(root);
            for glob in &opts.include_globs {
                if let Err(e) = overrides.add(glob) {
                    listing.errors.push(format!("invalid include glob '{glob}': {e}"));
                }
            }
            match overrides.build() {
                Ok(set) => {
                    builder.overrides(set);
                }
                Err(e) => {
                    listing.errors.push(format!("include globs failed to build: {e}"));
                    return listing;
                }
            }
        }

        for entry in builder.build() {
            if cancel.is_cancelled() {
                break;
            }
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_some_and(|t| t.is_file()) {
                        listing.paths.push(entry.into_path());
                    }
                }
                Err(e) => listing.errors.push(e.to_string()),
            }
        }

        listing
    }

    fn stat(&self, path: &Path) -> io::Result<FileMeta> {
        let meta = std::fs::metadata(path)?;
        Ok(FileMeta { size: meta.len(), modified: meta.modified().ok() })
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }
}
