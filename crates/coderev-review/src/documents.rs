use std::path::{Path, PathBuf};

use coderev_core::truncate::{self, Unit};
use coderev_core::{ChangeKind, DocumentKind};
use coderev_difflens::FileDiff;

/// One section of text destined for the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDocument {
    pub kind: DocumentKind,
    /// Path as configured (repository-relative for diffed files).
    pub source: Option<PathBuf>,
    pub text: String,
    pub truncated: bool,
}

impl PromptDocument {
    /// Heading shown above the document.
    pub fn title(&self) -> String {
        self.source
            .as_ref()
            .map_or_else(|| self.kind.to_string(), |p| p.display().to_string())
    }
}

/// Reads obey-docs, templates and full files relative to the repository root.
///
/// Unreadable documents are logged and skipped; the order of the rest is
/// preserved.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    root: PathBuf,
}

impl DocumentLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute paths are kept; relative ones are joined to the repository root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Load each path as a document of `kind`, capped at `limit` bytes.
    pub fn load(&self, paths: &[PathBuf], kind: DocumentKind, limit: usize) -> Vec<PromptDocument> {
        paths
            .iter()
            .filter_map(|p| self.load_one(p, kind, limit))
            .collect()
    }

    /// Load a single document, or `None` (with a warning) if it cannot be read.
    pub fn load_one(
        &self,
        path: &Path,
        kind: DocumentKind,
        limit: usize,
    ) -> Option<PromptDocument> {
        let full = self.resolve(path);
        let bytes = match std::fs::read(&full) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("{kind} not readable, skipping: {} ({e})", path.display());
                return None;
            }
        };

        let content = String::from_utf8_lossy(&bytes);
        let (text, truncated) = truncate::apply(&content, limit, Unit::Bytes);
        if truncated {
            tracing::info!(
                "{kind} {} truncated from {} to at most {limit} bytes",
                path.display(),
                bytes.len()
            );
        }

        Some(PromptDocument {
            kind,
            source: Some(path.to_path_buf()),
            text,
            truncated,
        })
    }

    /// Post-change contents of every diffed file, in diff order.
    ///
    /// Deleted and binary files are left out.
    pub fn full_files(&self, files: &[FileDiff], limit: usize) -> Vec<PromptDocument> {
        files
            .iter()
            .filter(|f| f.kind != ChangeKind::Deleted && !f.is_binary())
            .filter_map(|f| self.load_one(&f.path, DocumentKind::FullFile, limit))
            .collect()
    }
}
