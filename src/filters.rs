//! Candidate filtering: extension includes, file and folder excludes, and
//! metadata windows.

use crate::error::SearchError;
use crate::types::{FileMeta, FolderExclusionMode, SearchParams};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use std::path::Path;

/// Build include globs from an extension list; entries may carry a leading
/// dot or not.
pub(crate) fn extension_globs(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .filter(|e| !e.is_empty())
        .map(|e| {
            let ext = e.trim_start_matches('.');
            format!("*.{ext}")
        })
        .collect()
}

/// A single exclude-files pattern: glob, or `/regex/flags`.
enum FilePattern {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl FilePattern {
    fn parse(pattern: &str) -> Result<Self, SearchError> {
        if let Some(rest) = pattern.strip_prefix('/') {
            if let Some(end) = rest.rfind('/') {
                let (body, flags) = rest.split_at(end);
                let flags = &flags[1..];
                let full = if flags.contains('i') { format!("(?i){body}") } else { body.to_string() };
                let re = Regex::new(&full).map_err(|e| SearchError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
                return Ok(FilePattern::Regex(re));
            }
        }
        let glob = Glob::new(pattern).map_err(|e| SearchError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(FilePattern::Glob(glob.compile_matcher()))
    }

    fn matches(&self, basename: &str) -> bool {
        match self {
            FilePattern::Glob(g) => g.is_match(basename),
            FilePattern::Regex(r) => r.is_match(basename),
        }
    }
}

/// Compiled path and metadata predicates for one run.
pub(crate) struct CandidateFilter {
    exclude_files: Vec<FilePattern>,
    exclude_folders: Vec<String>,
    folder_mode: FolderExclusionMode,
    modified_after: Option<std::time::SystemTime>,
    modified_before: Option<std::time::SystemTime>,
    min_size: Option<u64>,
    max_size: Option<u64>,
}

impl CandidateFilter {
    pub fn build(params: &SearchParams) -> Result<Self, SearchError> {
        let exclude_files = params
            .exclude_files
            .iter()
            .map(|p| FilePattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude_folders =
            params.exclude_folders.iter().map(|f| f.to_lowercase()).collect();
        Ok(Self {
            exclude_files,
            exclude_folders,
            folder_mode: params.folder_exclusion_mode,
            modified_after: params.modified_after,
            modified_before: params.modified_before,
            min_size: params.min_size_bytes,
            max_size: params.max_size_bytes,
        })
    }

    /// Whether any metadata window is configured at all.
    pub fn needs_metadata(&self) -> bool {
        self.modified_after.is_some()
            || self.modified_before.is_some()
            || self.min_size.is_some()
            || self.max_size.is_some()
    }

    /// Path-level acceptance: basename excludes and folder-segment
    /// excludes, case-insensitive.
    pub fn path_allowed(&self, path: &Path) -> bool {
        if !self.exclude_files.is_empty() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if self.exclude_files.iter().any(|p| p.matches(name)) {
                    return false;
                }
            }
        }

        if !self.exclude_folders.is_empty() {
            let mut components: Vec<&std::ffi::OsStr> =
                path.components().map(|c| c.as_os_str()).collect();
            components.pop(); // the basename is not a folder segment
            for component in components {
                let Some(segment) = component.to_str() else { continue };
                if self.segment_excluded(&segment.to_lowercase()) {
                    return false;
                }
            }
        }

        true
    }

    fn segment_excluded(&self, segment: &str) -> bool {
        self.exclude_folders.iter().any(|pat| match self.folder_mode {
            FolderExclusionMode::Contains => segment.contains(pat.as_str()),
            FolderExclusionMode::Exact => segment == pat,
            FolderExclusionMode::StartsWith => segment.starts_with(pat.as_str()),
            FolderExclusionMode::EndsWith => segment.ends_with(pat.as_str()),
        })
    }

    /// Metadata acceptance against the size and mtime windows.
    pub fn meta_allowed(&self, meta: &FileMeta) -> bool {
        if self.min_size.is_some_and(|min| meta.size < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| meta.size > max) {
            return false;
        }
        match meta.modified {
            Some(mtime) => {
                if self.modified_after.is_some_and(|after| mtime < after) {
                    return false;
                }
                if self.modified_before.is_some_and(|before| mtime > before) {
                    return false;
                }
                true
            }
            // Files with no readable mtime only pass when no window asked.
            None => self.modified_after.is_none() && self.modified_before.is_none(),
        }
    }

    /// A permission error on a directory the caller excluded anyway is not
    /// worth surfacing; the walk would have skipped it regardless.
    pub fn is_excluded_permission_error(&self, message: &str) -> bool {
        if self.exclude_folders.is_empty() {
            return false;
        }
        let lower = message.to_lowercase();
        if !lower.contains("permission denied") {
            return false;
        }
        lower
            .split(['/', '\\'])
            .map(|seg| seg.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-'))
            .any(|seg| !seg.is_empty() && self.segment_excluded(seg))
    }
}
