//! Preflight readiness checker: the minimal concrete interface for the
//! "preflight readiness checker" collaborator named in spec §1. Checks
//! binary presence, cache/staging root writability, and queue
//! connectivity, matching §6's "missing required binaries fail the
//! stage's health check."

use std::path::Path;
use std::time::Duration;

use spindle_config::PipelineConfig;
use sqlx::postgres::PgPoolOptions;

/// One readiness check's outcome.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Short, stable check name (e.g. `"binary:makemkvcon"`).
    pub name: String,
    /// Whether the check passed.
    pub ok: bool,
    /// Detail shown alongside the result, empty when `ok`.
    pub detail: String,
}

/// Run every readiness check against `config`.
pub async fn run(config: &PipelineConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if let Some(ripper) = &config.binaries.ripper {
        results.push(check_binary("ripper", ripper));
    }
    results.push(check_binary("probe", &config.binaries.probe));
    results.push(check_binary("encoder", &config.binaries.encoder));
    if let Some(fingerprint) = &config.binaries.fingerprint {
        results.push(check_binary("fingerprint", fingerprint));
    }

    results.push(check_writable_dir("staging_root", &config.storage.staging_root));
    if let Some(cache_root) = &config.storage.cache_root {
        results.push(check_writable_dir("cache_root", cache_root));
    }

    results.push(check_queue_connectivity(&config.queue.database_url).await);

    results
}

fn check_binary(label: &str, binary: &str) -> CheckResult {
    let found = which(binary);
    CheckResult {
        name: format!("binary:{label}"),
        ok: found.is_some(),
        detail: found.map_or_else(
            || format!("'{binary}' not found on $PATH"),
            |path| path.display().to_string(),
        ),
    }
}

/// Resolve `binary` against `$PATH`, treating an absolute/relative path
/// containing a separator as already-resolved.
fn which(binary: &str) -> Option<std::path::PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|full| full.is_file())
}

fn check_writable_dir(label: &str, path: &Path) -> CheckResult {
    match std::fs::create_dir_all(path) {
        Ok(()) => {
            let probe_path = path.join(".spindle-preflight");
            match std::fs::write(&probe_path, b"") {
                Ok(()) => {
                    let _ = std::fs::remove_file(&probe_path);
                    CheckResult {
                        name: label.to_string(),
                        ok: true,
                        detail: String::new(),
                    }
                }
                Err(err) => CheckResult {
                    name: label.to_string(),
                    ok: false,
                    detail: format!("not writable: {err}"),
                },
            }
        }
        Err(err) => CheckResult {
            name: label.to_string(),
            ok: false,
            detail: format!("could not create directory: {err}"),
        },
    }
}

async fn check_queue_connectivity(database_url: &str) -> CheckResult {
    let result = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await;

    match result {
        Ok(pool) => {
            pool.close().await;
            CheckResult {
                name: "queue".to_string(),
                ok: true,
                detail: String::new(),
            }
        }
        Err(err) => CheckResult {
            name: "queue".to_string(),
            ok: false,
            detail: format!("could not connect: {err}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_binaries_on_path() {
        assert!(which("sh").is_some() || which("cmd.exe").is_some());
    }

    #[test]
    fn which_rejects_unknown_binary() {
        assert!(which("spindle-preflight-definitely-not-a-real-binary").is_none());
    }

    #[test]
    fn check_writable_dir_reports_success_for_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = check_writable_dir("staging_root", dir.path());
        assert!(result.ok, "{}", result.detail);
    }
}
