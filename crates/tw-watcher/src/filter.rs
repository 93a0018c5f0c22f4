//! Filename filtering for raw notifications.
//!
//! The notification source applies a [`FileFilter`] before an event reaches
//! the [`EventHandler`](crate::EventHandler), so events for unrelated files
//! never touch the classifier or any queue.
//!
//! # Examples
//!
//! ```
//! use tw_watcher::{FileFilter, PatternFilter};
//! use camino::Utf8Path;
//!
//! let filter = PatternFilter::new("*.xlsx").unwrap();
//!
//! assert!(filter.should_process(Utf8Path::new("/b/cuts/A.xlsx")));
//! assert!(filter.should_process(Utf8Path::new("/b/cuts/B.XLSX")));
//! assert!(!filter.should_process(Utf8Path::new("/b/cuts/A_ETQs.pdf")));
//! ```

use camino::Utf8Path;
use globset::{GlobBuilder, GlobMatcher};

use crate::error::WatchError;

/// A filter for determining which file events to process.
///
/// Filters must be [`Send`] and [`Sync`] because they run on the notify
/// callback thread, and `'static` to be moved into the watcher task.
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if an event for `path` should be handed on.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// A case-insensitive glob matched against the file name only.
///
/// Office lock files (`~$Book.xlsx`) match `*.xlsx` too and are not
/// excluded here; they fail classification or processing further down.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    pattern: String,
    matcher: GlobMatcher,
}

impl PatternFilter {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Pattern`] if the glob is malformed.
    pub fn new(pattern: &str) -> Result<Self, WatchError> {
        let matcher = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()?
            .compile_matcher();
        Ok(Self {
            pattern: pattern.to_owned(),
            matcher,
        })
    }

    /// Returns the source glob.
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl FileFilter for PatternFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matcher.is_match(name))
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all_filter() {
        let filter = AcceptAllFilter;
        assert!(filter.should_process(Utf8Path::new("anything.txt")));
        assert!(filter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_pattern_filter_is_case_insensitive() {
        let filter = PatternFilter::new("*.xlsx").unwrap();
        assert!(filter.should_process(Utf8Path::new("A.xlsx")));
        assert!(filter.should_process(Utf8Path::new("/x/y/Plano.XLSX")));
        assert!(!filter.should_process(Utf8Path::new("/x/y/A.xls")));
        assert!(!filter.should_process(Utf8Path::new("/x/y/A.xlsx.bak")));
    }

    #[test]
    fn test_pattern_filter_matches_file_name_only() {
        let filter = PatternFilter::new("cut-*.xlsx").unwrap();
        assert!(filter.should_process(Utf8Path::new("/jobs/cut-01.xlsx")));
        assert!(!filter.should_process(Utf8Path::new("/cut-jobs/01.xlsx")));
        assert!(!filter.should_process(Utf8Path::new("/")));
    }

    #[test]
    fn test_pattern_filter_alternates() {
        let filter = PatternFilter::new("*.{xlsx,xlsm}").unwrap();
        assert_eq!(filter.pattern(), "*.{xlsx,xlsm}");
        assert!(filter.should_process(Utf8Path::new("A.xlsm")));
        assert!(!filter.should_process(Utf8Path::new("A.csv")));
    }

    #[test]
    fn test_pattern_filter_rejects_bad_glob() {
        let err = PatternFilter::new("*.{xlsx").unwrap_err();
        assert!(matches!(err, WatchError::Pattern(_)));
    }

    #[test]
    fn test_boxed_and_arc_filters() {
        let boxed: Box<dyn FileFilter> = Box::new(PatternFilter::new("*.xlsx").unwrap());
        assert!(boxed.should_process(Utf8Path::new("a.xlsx")));

        let shared = std::sync::Arc::new(PatternFilter::new("*.xlsx").unwrap());
        assert!(!shared.should_process(Utf8Path::new("a.pdf")));
    }
}
