//! Builds directories of fake external-tool binaries. Each "binary" is a
//! `/bin/sh` script, so tests can point `BinariesConfig` fields or
//! `spindle_process::run` directly at it without a real `makemkvcon`,
//! `ffprobe`, `ffmpeg`, or `fpcalc` installed.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// A directory of fake binaries, kept alive for the lifetime of the test
/// that built it.
pub struct FakeBinaries {
    dir: TempDir,
}

impl FakeBinaries {
    /// Absolute path to the fake binary named `name` in this directory.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Absolute path to this directory, to prepend to `$PATH`.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Build a directory containing one fake binary per `(name, body)` pair.
/// Each script is written as `#!/bin/sh` followed by `body` and made
/// executable.
///
/// # Errors
///
/// Returns an error if the temporary directory or any script cannot be
/// written.
pub fn build(scripts: &[(&str, &str)]) -> Result<FakeBinaries> {
    let dir = tempfile::tempdir().context("failed to create fake binary directory")?;
    for (name, body) in scripts {
        write_script(dir.path(), name, body)?;
    }
    Ok(FakeBinaries { dir })
}

fn write_script(dir: &Path, name: &str, body: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).with_context(|| format!("failed to write fake binary {name}"))?;
    let mut permissions = fs::metadata(&path)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions)?;
    Ok(())
}

/// A `makemkvcon`-style script body that exits successfully without
/// producing output, exercising the placeholder-rip branch (spec §9).
#[must_use]
pub const fn succeeding_rip() -> &'static str {
    "exit 0"
}

/// A script body that always fails after printing `message` to stderr, for
/// exercising retry/backoff paths in the process supervisor.
#[must_use]
pub fn failing_tool(message: &str) -> String {
    format!("echo '{message}' >&2\nexit 1\n")
}

/// An `ffprobe`-style script body that prints a fixed JSON probe document
/// to stdout and exits successfully.
#[must_use]
pub fn succeeding_probe(json: &str) -> String {
    format!("cat <<'EOF'\n{json}\nEOF\n")
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    #[test]
    fn build_writes_executable_scripts() {
        let binaries = build(&[("makemkvcon", succeeding_rip())]).unwrap();
        let path = binaries.path("makemkvcon");
        assert!(path.is_file());

        let status = Command::new(&path).status().unwrap();
        assert!(status.success());
    }

    #[test]
    fn failing_tool_exits_nonzero() {
        let binaries = build(&[("ffmpeg", &failing_tool("boom"))]).unwrap();
        let status = Command::new(binaries.path("ffmpeg")).status().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn succeeding_probe_emits_requested_json() {
        let json = r#"{"streams":[]}"#;
        let binaries = build(&[("ffprobe", &succeeding_probe(json))]).unwrap();
        let output = Command::new(binaries.path("ffprobe")).output().unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), json);
    }
}
