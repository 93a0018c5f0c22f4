//! Path classification with per-path memoization.
//!
//! [`PathClassifier`] answers one question for every raw event: is this a
//! file sitting directly inside `<briefing>/<cut-list>/`? The same path is
//! typically reported several times for a single save (create, modify,
//! rename), so both the canonical form of a path and its verdict are cached
//! for the lifetime of the classifier.
//!
//! # Caching
//!
//! Both caches are [`DashMap`]s so the notify callback thread and the CLI
//! can share one classifier. Lookups clone the value out and never hold a
//! shard reference across an insert.
//!
//! A verdict is computed once per distinct path string and never
//! invalidated. A path that is later replaced by a directory keeps its
//! first verdict.

use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tracing::trace;

use tw_core::LayoutConfig;

/// Memoizing predicate for files of interest.
///
/// # Examples
///
/// ```
/// use tw_watcher::PathClassifier;
/// use tw_core::LayoutConfig;
/// use camino::Utf8Path;
///
/// let classifier = PathClassifier::new(&LayoutConfig {
///     cut_list_dir: "cuts".to_owned(),
///     briefing_dir: "briefing".to_owned(),
/// });
///
/// // Paths that do not exist yet are judged by their shape alone.
/// assert!(classifier.is_valid(Utf8Path::new("/media/c1/briefing/cuts/A.xlsx")));
/// assert!(!classifier.is_valid(Utf8Path::new("/media/c1/cuts/A.xlsx")));
/// ```
#[derive(Debug)]
pub struct PathClassifier {
    cut_list_dir: String,
    briefing_dir: String,
    verdicts: DashMap<Utf8PathBuf, bool, FxBuildHasher>,
    canonical: DashMap<Utf8PathBuf, Utf8PathBuf, FxBuildHasher>,
}

impl PathClassifier {
    /// Creates a classifier for the given directory layout.
    #[must_use]
    pub fn new(layout: &LayoutConfig) -> Self {
        Self {
            cut_list_dir: layout.cut_list_dir.clone(),
            briefing_dir: layout.briefing_dir.clone(),
            verdicts: DashMap::with_hasher(FxBuildHasher),
            canonical: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Returns the absolute, symlink-resolved form of `path`.
    ///
    /// Paths that do not exist (yet) are resolved as far as their parent
    /// allows and otherwise made absolute against the working directory.
    /// Never fails.
    pub fn canonicalize(&self, path: &Utf8Path) -> Utf8PathBuf {
        if let Some(hit) = self.canonical.get(path).map(|r| r.value().clone()) {
            return hit;
        }
        let resolved = resolve(path);
        self.canonical.insert(path.to_owned(), resolved.clone());
        resolved
    }

    /// Returns `true` if `path` is a file directly inside the cut-list
    /// directory of a briefing directory.
    ///
    /// Directory-ness is checked against the live filesystem on the first
    /// query for a path only; later queries are answered from the cache.
    pub fn is_valid(&self, path: &Utf8Path) -> bool {
        if let Some(verdict) = self.verdicts.get(path).map(|r| *r.value()) {
            return verdict;
        }
        let verdict = self.evaluate(path);
        trace!(path = %path, verdict, "Classified path");
        self.verdicts.insert(path.to_owned(), verdict);
        verdict
    }

    /// Returns `true` if a verdict for `path` is cached.
    #[must_use]
    pub fn is_cached(&self, path: &Utf8Path) -> bool {
        self.verdicts.contains_key(path)
    }

    /// Returns the number of cached verdicts.
    #[must_use]
    pub fn cached_verdicts(&self) -> usize {
        self.verdicts.len()
    }

    fn evaluate(&self, path: &Utf8Path) -> bool {
        if path.is_dir() {
            return false;
        }
        let Some(parent) = path.parent() else {
            return false;
        };
        let Some(grandparent) = parent.parent() else {
            return false;
        };
        parent.file_name() == Some(self.cut_list_dir.as_str())
            && grandparent.file_name() == Some(self.briefing_dir.as_str())
    }
}

fn resolve(path: &Utf8Path) -> Utf8PathBuf {
    if let Ok(resolved) = path.canonicalize_utf8() {
        return resolved;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(parent) = parent.canonicalize_utf8() {
            return parent.join(name);
        }
    }
    std::path::absolute(path)
        .ok()
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
        .unwrap_or_else(|| path.to_owned())
}
