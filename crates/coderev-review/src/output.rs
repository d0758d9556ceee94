use std::io::Write;
use std::path::{Path, PathBuf};

use coderev_core::CoderevError;

/// Emits the agent's verdict to stdout and, optionally, to a file.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    repo_root: PathBuf,
}

impl OutputWriter {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Write `text` verbatim to `stdout`, then to `out` if given.
    ///
    /// Relative `out` paths resolve against the repository root and missing
    /// parent directories are created. Returns the file written, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::Io`] if stdout cannot be written, and
    /// [`CoderevError::OutputWrite`] if the file cannot; in the latter case
    /// `stdout` already holds the full text.
    pub fn write<W: Write>(
        &self,
        stdout: &mut W,
        text: &str,
        out: Option<&Path>,
    ) -> Result<Option<PathBuf>, CoderevError> {
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;

        let Some(out) = out else {
            return Ok(None);
        };
        let path = if out.is_absolute() {
            out.to_path_buf()
        } else {
            self.repo_root.join(out)
        };

        let persist = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, text)
        };
        persist().map_err(|source| CoderevError::OutputWrite {
            path: path.clone(),
            source,
        })?;

        tracing::info!("review written to {}", path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_only_without_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut stdout = Vec::new();
        let written = OutputWriter::new(dir.path())
            .write(&mut stdout, "verdict\n", None)
            .unwrap();
        assert_eq!(stdout, b"verdict\n");
        assert!(written.is_none());
    }

    #[test]
    fn relative_out_creates_parents_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut stdout = Vec::new();
        let written = OutputWriter::new(dir.path())
            .write(&mut stdout, "verdict", Some(Path::new("reviews/pr/review.md")))
            .unwrap()
            .unwrap();
        assert_eq!(written, dir.path().join("reviews/pr/review.md"));
        assert_eq!(std::fs::read_to_string(written).unwrap(), "verdict");
        assert_eq!(stdout, b"verdict");
    }

    #[test]
    fn write_failure_still_prints_stdout() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where a directory is needed.
        std::fs::write(dir.path().join("blocker"), "").unwrap();
        let mut stdout = Vec::new();
        let err = OutputWriter::new(dir.path())
            .write(&mut stdout, "verdict", Some(Path::new("blocker/review.md")))
            .unwrap_err();
        assert!(matches!(err, CoderevError::OutputWrite { .. }));
        assert_eq!(stdout, b"verdict");
    }
}
