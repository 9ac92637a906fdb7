//! Canonical path cache (§4.3).
//!
//! A process-global, mutex-guarded, string-interned `realpath` cache. Per
//! §9 ("Global mutable state → dependency injection") the shared map is
//! modeled as an explicit value (`CanonicalPathCache`) rather than hidden
//! process statics; [`global`] offers a process-wide default instance for
//! callers that don't want to thread one through explicitly.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

/// An interned, absolute, symlink-resolved filesystem path.
///
/// Equal paths share storage: two calls to [`CanonicalPathCache::get`] with
/// the same absolute input return clones of the same `Arc<Path>`.
pub type CanonicalFilePathRef = Arc<Path>;

/// §4.3 `contains(A, B)`: B starts with A and the next character in B is a
/// path separator (so `/a/b` contains `/a/b/c` but not `/a/bc`).
pub fn contains(a: &Path, b: &Path) -> bool {
    let a = a.as_os_str().as_encoded_bytes();
    let b = b.as_os_str().as_encoded_bytes();
    if !b.starts_with(a) {
        return false;
    }
    match b.get(a.len()) {
        Some(&c) => c == std::path::MAIN_SEPARATOR as u8,
        None => false,
    }
}

#[derive(Default)]
pub struct CanonicalPathCache {
    entries: DashMap<PathBuf, CanonicalFilePathRef>,
}

impl CanonicalPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `getCanonicalPath(path, workingDir)` (§4.3).
    ///
    /// Empty input returns an empty path. Relative input is resolved
    /// against `working_dir`, which must be given for a relative `path`
    /// (an empty `working_dir` with a relative `path` is a programmer
    /// error).
    pub fn get_canonical_path(&self, path: &Path, working_dir: Option<&Path>) -> CanonicalFilePathRef {
        if path.as_os_str().is_empty() {
            return Arc::from(Path::new(""));
        }

        let absolute = if path.is_relative() {
            let base = working_dir.expect("relative path requires a working directory");
            base.join(path)
        } else {
            path.to_path_buf()
        };

        if let Some(existing) = self.entries.get(&absolute) {
            return existing.clone();
        }

        let resolved = std::fs::canonicalize(&absolute).unwrap_or_else(|_| absolute.clone());
        let interned: CanonicalFilePathRef = Arc::from(resolved.as_path());
        self.entries.insert(absolute, interned.clone());
        interned
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GLOBAL: OnceLock<CanonicalPathCache> = OnceLock::new();

/// The process-wide default cache instance.
pub fn global() -> &'static CanonicalPathCache {
    GLOBAL.get_or_init(CanonicalPathCache::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_returns_empty() {
        let cache = CanonicalPathCache::new();
        let result = cache.get_canonical_path(Path::new(""), None);
        assert_eq!(&*result, Path::new(""));
    }

    #[test]
    fn equal_paths_share_storage() {
        let cache = CanonicalPathCache::new();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let a = cache.get_canonical_path(&file, None);
        let b = cache.get_canonical_path(&file, None);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unresolvable_path_falls_back_to_absolute() {
        let cache = CanonicalPathCache::new();
        let missing = PathBuf::from("/this/path/does/not/exist/at/all");
        let result = cache.get_canonical_path(&missing, None);
        assert_eq!(&*result, missing.as_path());
    }

    #[test]
    fn contains_requires_separator_boundary() {
        assert!(contains(Path::new("/a/b"), Path::new("/a/b/c")));
        assert!(!contains(Path::new("/a/b"), Path::new("/a/bc")));
        assert!(!contains(Path::new("/a/b"), Path::new("/a/b")));
    }
}
