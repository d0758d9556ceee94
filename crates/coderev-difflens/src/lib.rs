//! Diff parsing, context expansion, and snippet rendering.
//!
//! Turns raw `git diff` output into per-file [`FileDiff`] values whose hunks
//! carry a bounded window of surrounding lines, then renders each file into a
//! size-capped [`Snippet`].

pub mod context;
pub mod parser;
pub mod snippet;

pub use context::{extract, extract_with_source, LineSource, NoSource, WorkingTree};
pub use parser::{parse_unified_diff, ContextLine, DiffLine, FileDiff, Hunk, LineKind};
pub use snippet::{render, snippets, Snippet};
