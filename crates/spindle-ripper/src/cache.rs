//! Rip Cache Manager: a content-addressed directory tree keyed by disc
//! fingerprint, letting a re-identified disc skip a fresh rip when the
//! previous output still validates.

use std::fs;
use std::path::{Path, PathBuf};

use spindle_core::{QueueItem, SpindleError, SpindleResult};

/// Root-relative, fingerprint-keyed cache of completed rip artifacts.
pub struct RipCache {
    root: PathBuf,
}

impl RipCache {
    /// Bind a cache to `root`; the directory is created lazily on first
    /// registration.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic cache directory for `item`.
    #[must_use]
    pub fn path(&self, item: &QueueItem) -> PathBuf {
        self.root.join(&item.disc_fingerprint)
    }

    /// True iff `dir` exists and contains at least one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn exists_non_empty(dir: &Path) -> SpindleResult<bool> {
        if !dir.exists() {
            return Ok(false);
        }
        let mut entries = fs::read_dir(dir).map_err(|err| {
            SpindleError::transient_with_source(format!("failed to read cache dir {}", dir.display()), err)
        })?;
        Ok(entries.next().is_some())
    }

    /// Pick the largest `.mkv` file directly under `dir`, treating it as
    /// the feature. Returns `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn select_cached(dir: &Path) -> SpindleResult<Option<PathBuf>> {
        if !dir.exists() {
            return Ok(None);
        }
        let entries = fs::read_dir(dir).map_err(|err| {
            SpindleError::transient_with_source(format!("failed to read cache dir {}", dir.display()), err)
        })?;

        let mut best: Option<(u64, PathBuf)> = None;
        for entry in entries {
            let entry = entry.map_err(|err| {
                SpindleError::transient_with_source(format!("failed to read cache entry in {}", dir.display()), err)
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("mkv") {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|err| {
                    SpindleError::transient_with_source(format!("failed to stat {}", path.display()), err)
                })?
                .len();
            if best.as_ref().is_none_or(|(best_size, _)| size > *best_size) {
                best = Some((size, path));
            }
        }
        Ok(best.map(|(_, path)| path))
    }

    /// Remove `dir` (if present) and recreate it empty, invalidating any
    /// stale cache contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed or recreated.
    pub fn invalidate(dir: &Path) -> SpindleResult<()> {
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|err| {
                SpindleError::transient_with_source(format!("failed to remove cache dir {}", dir.display()), err)
            })?;
        }
        fs::create_dir_all(dir).map_err(|err| {
            SpindleError::transient_with_source(format!("failed to recreate cache dir {}", dir.display()), err)
        })?;
        Ok(())
    }

    /// Mark `dir` as a confirmed cache entry. Registration for this cache
    /// is implicit in the directory's contents passing validation; this
    /// call exists as the explicit commit point so callers have a single
    /// place to hook persistence or metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` does not exist or is empty at commit
    /// time, rolling back by removing it.
    pub fn register(dir: &Path) -> SpindleResult<()> {
        match Self::exists_non_empty(dir) {
            Ok(true) => Ok(()),
            Ok(false) => {
                let _ = fs::remove_dir_all(dir);
                Err(SpindleError::validation(format!(
                    "cache directory {} is empty at registration",
                    dir.display()
                )))
            }
            Err(err) => {
                let _ = fs::remove_dir_all(dir);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with_fingerprint(fingerprint: &str) -> QueueItem {
        QueueItem::new_disc("Alien", fingerprint)
    }

    #[test]
    fn path_is_fingerprint_keyed() {
        let cache = RipCache::new("/var/cache/spindle");
        let item = item_with_fingerprint("FP-ABC");
        assert_eq!(cache.path(&item), PathBuf::from("/var/cache/spindle/FP-ABC"));
    }

    #[test]
    fn exists_non_empty_is_false_for_missing_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(!RipCache::exists_non_empty(&missing).unwrap());

        let empty = dir.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert!(!RipCache::exists_non_empty(&empty).unwrap());

        fs::write(empty.join("feature.mkv"), b"data").unwrap();
        assert!(RipCache::exists_non_empty(&empty).unwrap());
    }

    #[test]
    fn select_cached_picks_largest_mkv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("small.mkv"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("large.mkv"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let selected = RipCache::select_cached(dir.path()).unwrap().unwrap();
        assert_eq!(selected.file_name().unwrap(), "large.mkv");
    }

    #[test]
    fn select_cached_is_none_without_mkv_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();
        assert!(RipCache::select_cached(dir.path()).unwrap().is_none());
    }

    #[test]
    fn invalidate_removes_and_recreates_empty() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fp");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.mkv"), b"old").unwrap();

        RipCache::invalidate(&target).unwrap();
        assert!(target.exists());
        assert!(!RipCache::exists_non_empty(&target).unwrap());
    }

    #[test]
    fn register_rolls_back_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fp");
        fs::create_dir_all(&target).unwrap();

        let err = RipCache::register(&target).unwrap_err();
        assert_eq!(err.kind(), spindle_core::ErrorKind::Validation);
        assert!(!target.exists());
    }
}
