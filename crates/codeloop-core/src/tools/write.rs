//! Persists the extracted code block to the working file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Writes `code` verbatim to `{root}/{working_file}`, overwriting any
/// previous contents, and returns the resolved path. A trailing newline is
/// appended when absent. Repeating a write with identical code leaves the
/// file byte-identical.
///
/// # Errors
/// Returns an error if the file cannot be written; this is fatal to the loop.
pub fn persist_artifact(root: &Path, working_file: &str, code: &str) -> Result<PathBuf> {
    let path = root.join(working_file);
    let contents = if code.ends_with('\n') {
        code.to_string()
    } else {
        format!("{code}\n")
    };

    fs::write(&path, &contents)
        .with_context(|| format!("Failed to write working file {}", path.display()))?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "working file written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_writes_with_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = persist_artifact(dir.path(), "tmp.py", "print(\"hi\")").unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "print(\"hi\")\n");
    }

    #[test]
    fn test_overwrites_previous_contents() {
        let dir = TempDir::new().unwrap();
        persist_artifact(dir.path(), "tmp.py", "old = 1").unwrap();
        let path = persist_artifact(dir.path(), "tmp.py", "new = 2").unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "new = 2\n");
    }

    /// Writing identical code twice leaves the file byte-identical.
    #[test]
    fn test_repeat_write_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = persist_artifact(dir.path(), "tmp.py", "x = 1").unwrap();
        let first = fs::read(&path).unwrap();
        persist_artifact(dir.path(), "tmp.py", "x = 1").unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_write_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let missing_root = dir.path().join("no-such-dir");

        assert!(persist_artifact(&missing_root, "tmp.py", "x = 1").is_err());
    }
}
