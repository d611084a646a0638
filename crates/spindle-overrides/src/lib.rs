#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Read-through catalog of curated per-disc overrides.
//!
//! The catalog is backed by a single JSON file that maps disc fingerprints
//! and disc ids to curated metadata (title name, media type, season/episode
//! corrections) that the identification stage prefers over an automated
//! guess. The file is read lazily and reloaded whenever its modification
//! time changes; a missing file is treated as an empty catalog rather than
//! an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use serde::Deserialize;
use spindle_core::{SpindleError, SpindleResult};

/// A single curated override, matched by disc fingerprint or disc id.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideEntry {
    /// Uppercase, trimmed disc fingerprints this entry applies to.
    pub fingerprints: Vec<String>,
    /// Uppercase, trimmed disc ids this entry applies to.
    pub disc_ids: Vec<String>,
    /// Lowercase media type hint (`"movie"` or `"tv"`), when curated.
    pub media_type: Option<String>,
    /// Remaining curated fields (title, season/episode corrections, etc.),
    /// kept open-ended since the catalog does not constrain its schema.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawOverrideEntry {
    #[serde(default)]
    fingerprints: Vec<String>,
    #[serde(default)]
    disc_ids: Vec<String>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(flatten)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl From<RawOverrideEntry> for OverrideEntry {
    fn from(raw: RawOverrideEntry) -> Self {
        Self {
            fingerprints: raw.fingerprints.iter().map(|s| normalize_key(s)).collect(),
            disc_ids: raw.disc_ids.iter().map(|s| normalize_key(s)).collect(),
            media_type: raw.media_type.map(|value| value.to_lowercase()),
            metadata: raw.metadata,
        }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn strip_bom(raw: &str) -> &str {
    raw.strip_prefix('\u{feff}').unwrap_or(raw)
}

fn parse_entries(raw: &str) -> SpindleResult<Vec<OverrideEntry>> {
    let raw = strip_bom(raw);
    let document: serde_json::Value = serde_json::from_str(raw)
        .map_err(|err| SpindleError::validation(format!("invalid overrides file: {err}")))?;

    let entries_value = match document {
        serde_json::Value::Array(_) => document,
        serde_json::Value::Object(mut object) => object.remove("overrides").ok_or_else(|| {
            SpindleError::validation("overrides file object is missing an \"overrides\" array")
        })?,
        _ => {
            return Err(SpindleError::validation(
                "overrides file must be a JSON array or an object with an \"overrides\" array",
            ));
        }
    };

    let raw_entries: Vec<RawOverrideEntry> = serde_json::from_value(entries_value)
        .map_err(|err| SpindleError::validation(format!("invalid overrides entry: {err}")))?;
    Ok(raw_entries.into_iter().map(OverrideEntry::from).collect())
}

struct CatalogState {
    mtime: Option<SystemTime>,
    entries: Vec<OverrideEntry>,
}

/// Lazily-loaded, mtime-gated catalog of curated disc overrides.
pub struct OverridesCatalog {
    path: PathBuf,
    state: Mutex<CatalogState>,
}

impl OverridesCatalog {
    /// Construct a catalog bound to `path`. Nothing is read until the first
    /// [`lookup`](Self::lookup) call.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(CatalogState {
                mtime: None,
                entries: Vec::new(),
            }),
        }
    }

    /// Look up a curated override by disc fingerprint or disc id, reloading
    /// the backing file first if its modification time has changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn lookup(&self, fingerprint: &str, disc_id: &str) -> SpindleResult<Option<OverrideEntry>> {
        self.reload_if_changed()?;

        let fingerprint = normalize_key(fingerprint);
        let disc_id = normalize_key(disc_id);
        let state = self.lock_state();
        Ok(state
            .entries
            .iter()
            .find(|entry| {
                entry.fingerprints.contains(&fingerprint) || entry.disc_ids.contains(&disc_id)
            })
            .cloned())
    }

    fn reload_if_changed(&self) -> SpindleResult<()> {
        let current_mtime = match fs::metadata(&self.path) {
            Ok(metadata) => Some(metadata.modified().map_err(|err| {
                SpindleError::configuration_with_source(
                    format!("failed to read mtime of {}", self.path.display()),
                    err,
                )
            })?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(SpindleError::configuration_with_source(
                    format!("failed to stat overrides file {}", self.path.display()),
                    err,
                ));
            }
        };

        let needs_reload = {
            let state = self.lock_state();
            state.mtime != current_mtime
        };
        if !needs_reload {
            return Ok(());
        }

        let entries = match current_mtime {
            None => Vec::new(),
            Some(_) => {
                let raw = fs::read_to_string(&self.path).map_err(|err| {
                    SpindleError::configuration_with_source(
                        format!("failed to read overrides file {}", self.path.display()),
                        err,
                    )
                })?;
                parse_entries(&raw)?
            }
        };

        tracing::debug!(
            path = %self.path.display(),
            entries = entries.len(),
            "reloaded overrides catalog"
        );
        let mut state = self.lock_state();
        state.mtime = current_mtime;
        state.entries = entries;
        Ok(())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("overrides catalog mutex poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_an_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = OverridesCatalog::new(dir.path().join("overrides.json"));
        assert!(catalog.lookup("fp-1", "disc-1").unwrap().is_none());
    }

    #[test]
    fn parses_bare_array_and_normalizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"fingerprints": [" fp-1 "], "disc_ids": [], "media_type": "TV"}}]"#
        )
        .unwrap();
        drop(file);

        let catalog = OverridesCatalog::new(&path);
        let entry = catalog.lookup("fp-1", "disc-1").unwrap().unwrap();
        assert_eq!(entry.fingerprints, vec!["FP-1".to_string()]);
        assert_eq!(entry.media_type.as_deref(), Some("tv"));
    }

    #[test]
    fn parses_wrapped_object_and_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all("\u{feff}".as_bytes()).unwrap();
        write!(
            file,
            r#"{{"overrides": [{{"disc_ids": ["abc"], "fingerprints": []}}]}}"#
        )
        .unwrap();
        drop(file);

        let catalog = OverridesCatalog::new(&path);
        assert!(catalog.lookup("fp-1", "abc").unwrap().is_some());
    }

    #[test]
    fn reloads_only_when_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        fs::write(&path, r"[]").unwrap();

        let catalog = OverridesCatalog::new(&path);
        assert!(catalog.lookup("fp-1", "disc-1").unwrap().is_none());

        std::thread::sleep(std::time::Duration::from_millis(1100));
        fs::write(&path, r#"[{"fingerprints": ["fp-1"]}]"#).unwrap();

        assert!(catalog.lookup("fp-1", "disc-1").unwrap().is_some());
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        fs::write(&path, "not json").unwrap();
        let catalog = OverridesCatalog::new(&path);
        let err = catalog.lookup("fp-1", "disc-1").unwrap_err();
        assert_eq!(err.kind(), spindle_core::ErrorKind::Validation);
    }
}
