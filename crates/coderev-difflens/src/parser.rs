use std::fmt;
use std::path::PathBuf;

use coderev_core::{ChangeKind, CoderevError};

/// Role of a single line inside a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Present only on the new side (`+`).
    Added,
    /// Present only on the old side (`-`).
    Removed,
    /// Unchanged (` `).
    Context,
}

/// One line of a hunk body with its position on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    /// Line number in the old file; `None` for added lines.
    pub old_lineno: Option<u32>,
    /// Line number in the new file; `None` for removed lines.
    pub new_lineno: Option<u32>,
    /// Line content without the leading marker.
    pub text: String,
}

/// An unchanged line pulled in around a changed region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLine {
    /// Line number in the new file.
    pub lineno: u32,
    pub text: String,
}

/// A contiguous block of changes within one file.
///
/// Straight out of the parser, `lines` holds the hunk body as written in the
/// diff and `leading`/`trailing` are empty. After context expansion `lines`
/// spans the changed region only (first to last `+`/`-` line) and the
/// surrounding context lives in `leading` and `trailing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// The `@@ ... @@` header line, verbatim.
    pub header: String,
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
    pub leading: Vec<ContextLine>,
    pub trailing: Vec<ContextLine>,
    /// This hunk continues the previous hunk's context block; its gap lines
    /// are the previous hunk's `trailing` and its own `leading` is empty.
    pub joined: bool,
}

/// A complete diff for a single file, containing zero or more hunks.
///
/// # Examples
///
/// ```
/// use coderev_difflens::parser::{parse_unified_diff, FileDiff};
///
/// let diff = concat!(
///     "diff --git a/hello.rs b/hello.rs\n",
///     "--- a/hello.rs\n",
///     "+++ b/hello.rs\n",
///     "@@ -1,2 +1,3 @@\n",
///     " fn main() {\n",
///     "+    println!(\"hello\");\n",
///     " }\n",
/// );
/// let files = parse_unified_diff(diff).unwrap();
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].hunks.len(), 1);
/// assert_eq!(files[0].hunks[0].lines.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path on the new side (the old path for deleted files).
    pub path: PathBuf,
    /// Previous path, for renames.
    pub old_path: Option<PathBuf>,
    pub kind: ChangeKind,
    pub hunks: Vec<Hunk>,
    /// `Binary files ... differ` or `GIT binary patch`, kept verbatim.
    pub binary: Option<String>,
}

impl FileDiff {
    /// Whether the file carries a binary marker instead of text hunks.
    pub fn is_binary(&self) -> bool {
        self.binary.is_some()
    }
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} hunks)",
            self.path.display(),
            self.kind,
            self.hunks.len()
        )
    }
}

#[derive(Debug, Default)]
struct PendingFile {
    old_path: Option<PathBuf>,
    new_path: Option<PathBuf>,
    old_is_null: bool,
    new_is_null: bool,
    new_file: bool,
    deleted_file: bool,
    renamed: bool,
    hunks: Vec<Hunk>,
    binary: Option<String>,
}

impl PendingFile {
    fn has_body(&self) -> bool {
        !self.hunks.is_empty() || self.binary.is_some()
    }

    fn finish(self) -> Option<FileDiff> {
        let kind = if self.new_file || self.old_is_null {
            ChangeKind::Added
        } else if self.deleted_file || self.new_is_null {
            ChangeKind::Deleted
        } else if self.renamed || (self.old_path.is_some() && self.old_path != self.new_path) {
            ChangeKind::Renamed
        } else {
            ChangeKind::Modified
        };

        let path = match kind {
            ChangeKind::Deleted => self.old_path.clone().or(self.new_path.clone()),
            _ => self.new_path.clone().or(self.old_path.clone()),
        }?;
        let old_path = match kind {
            ChangeKind::Renamed => self.old_path,
            _ => None,
        };

        Some(FileDiff {
            path,
            old_path,
            kind,
            hunks: self.hunks,
            binary: self.binary,
        })
    }
}

/// Remaining body lines of the hunk being read.
#[derive(Debug)]
struct HunkCursor {
    old_remaining: u32,
    new_remaining: u32,
    old_next: u32,
    new_next: u32,
}

impl HunkCursor {
    fn new(old_start: u32, old_lines: u32, new_start: u32, new_lines: u32) -> Self {
        // A zero-length side names the line *before* the hunk.
        Self {
            old_remaining: old_lines,
            new_remaining: new_lines,
            old_next: if old_lines == 0 { old_start + 1 } else { old_start },
            new_next: if new_lines == 0 { new_start + 1 } else { new_start },
        }
    }

    fn is_open(&self) -> bool {
        self.old_remaining > 0 || self.new_remaining > 0
    }

    fn take(&mut self, line: &str) -> Option<DiffLine> {
        let both = self.old_remaining > 0 && self.new_remaining > 0;
        let (kind, text) = match line.as_bytes().first() {
            Some(b'+') if self.new_remaining > 0 => (LineKind::Added, &line[1..]),
            Some(b'-') if self.old_remaining > 0 => (LineKind::Removed, &line[1..]),
            Some(b' ') if both => (LineKind::Context, &line[1..]),
            // Some tools strip the marker from blank context lines.
            None if both => (LineKind::Context, ""),
            _ => return None,
        };

        let mut old_lineno = None;
        let mut new_lineno = None;
        if kind != LineKind::Added {
            old_lineno = Some(self.old_next);
            self.old_next += 1;
            self.old_remaining -= 1;
        }
        if kind != LineKind::Removed {
            new_lineno = Some(self.new_next);
            self.new_next += 1;
            self.new_remaining -= 1;
        }

        Some(DiffLine {
            kind,
            old_lineno,
            new_lineno,
            text: text.to_string(),
        })
    }
}

/// Parse a unified diff string (as produced by `git diff`) into structured [`FileDiff`] entries.
///
/// Handles new, deleted, renamed, mode-only and binary files, quoted paths,
/// and patches that lack the `diff --git` line. Files without hunks are kept.
///
/// # Errors
///
/// Returns [`CoderevError::Parse`] carrying the offending line if a hunk
/// header is malformed.
///
/// # Examples
///
/// ```
/// use coderev_difflens::parser::parse_unified_diff;
///
/// let files = parse_unified_diff("").unwrap();
/// assert!(files.is_empty());
/// ```
pub fn parse_unified_diff(input: &str) -> Result<Vec<FileDiff>, CoderevError> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<PendingFile> = None;
    let mut cursor: Option<HunkCursor> = None;
    let mut in_binary_patch = false;

    for line in input.lines() {
        if let (Some(file), Some(c)) = (current.as_mut(), cursor.as_mut()) {
            if line.starts_with('\\') {
                // "\ No newline at end of file"
                continue;
            }
            if c.is_open() {
                if let Some(diff_line) = c.take(line) {
                    if let Some(hunk) = file.hunks.last_mut() {
                        hunk.lines.push(diff_line);
                    }
                    continue;
                }
            }
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush(&mut files, current.take());
            cursor = None;
            in_binary_patch = false;
            let mut file = PendingFile::default();
            if let Some((old, new)) = parse_git_header(rest) {
                file.old_path = Some(old);
                file.new_path = Some(new);
            }
            current = Some(file);
            continue;
        }

        if in_binary_patch {
            continue;
        }

        // Implicitly start a file for patches that lack the "diff --git" line.
        if line.starts_with("--- ") && current.as_ref().map_or(true, PendingFile::has_body) {
            flush(&mut files, current.take());
            cursor = None;
            current = Some(PendingFile::default());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if line.starts_with("Binary files ") && line.ends_with(" differ") {
            file.binary = Some(line.to_string());
            continue;
        }

        if line == "GIT binary patch" {
            file.binary = Some(line.to_string());
            in_binary_patch = true;
            continue;
        }

        if line.starts_with("new file mode") {
            file.new_file = true;
            continue;
        }

        if line.starts_with("deleted file mode") {
            file.deleted_file = true;
            continue;
        }

        if let Some(path) = line.strip_prefix("rename from ") {
            file.renamed = true;
            file.old_path = Some(PathBuf::from(unquote(path)));
            continue;
        }

        if let Some(path) = line.strip_prefix("rename to ") {
            file.renamed = true;
            file.new_path = Some(PathBuf::from(unquote(path)));
            continue;
        }

        if let Some(path) = line.strip_prefix("--- ") {
            match parse_path(path) {
                Some(p) => file.old_path = Some(p),
                None => file.old_is_null = true,
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("+++ ") {
            match parse_path(path) {
                Some(p) => file.new_path = Some(p),
                None => file.new_is_null = true,
            }
            continue;
        }

        if line.starts_with("@@") {
            let (old_start, old_lines, new_start, new_lines) = parse_hunk_header(line)?;
            file.hunks.push(Hunk {
                header: line.to_string(),
                old_start,
                old_lines,
                new_start,
                new_lines,
                lines: Vec::new(),
                leading: Vec::new(),
                trailing: Vec::new(),
                joined: false,
            });
            cursor = Some(HunkCursor::new(old_start, old_lines, new_start, new_lines));
        }

        // Everything else ("index", "similarity index", "old mode", ...) is metadata.
    }

    flush(&mut files, current.take());
    Ok(files)
}

fn flush(files: &mut Vec<FileDiff>, pending: Option<PendingFile>) {
    if let Some(file) = pending.and_then(PendingFile::finish) {
        files.push(file);
    }
}

fn strip_side_prefix(path: &str) -> &str {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
}

/// Path from a `---`/`+++` line; `None` for `/dev/null`.
fn parse_path(raw: &str) -> Option<PathBuf> {
    let decoded = if raw.starts_with('"') {
        unquote(raw)
    } else {
        // Plain patches may append a tab and a timestamp.
        raw.split('\t').next().unwrap_or(raw).to_string()
    };

    if decoded == "/dev/null" {
        return None;
    }

    Some(PathBuf::from(strip_side_prefix(&decoded)))
}

fn parse_git_header(rest: &str) -> Option<(PathBuf, PathBuf)> {
    let side = |s: &str| PathBuf::from(strip_side_prefix(s));

    if rest.starts_with('"') {
        let (old, tail) = take_quoted(rest)?;
        let tail = tail.trim_start();
        let new = if tail.starts_with('"') {
            take_quoted(tail)?.0
        } else {
            tail.to_string()
        };
        return Some((side(&old), side(&new)));
    }

    if let Some(idx) = rest.find(" \"") {
        let (new, _) = take_quoted(&rest[idx + 1..])?;
        return Some((side(&rest[..idx]), side(&new)));
    }

    // Unquoted and identical on both sides: split down the middle.
    let mid = rest.len() / 2;
    if rest.len() % 2 == 1 && rest.as_bytes().get(mid) == Some(&b' ') {
        let (old, new) = (&rest[..mid], &rest[mid + 1..]);
        if strip_side_prefix(old) == strip_side_prefix(new) {
            return Some((side(old), side(new)));
        }
    }

    let idx = rest.rfind(" b/")?;
    Some((side(&rest[..idx]), side(&rest[idx + 1..])))
}

/// Decode a possibly quoted git path; unquoted input is returned as is.
fn unquote(raw: &str) -> String {
    if raw.starts_with('"') {
        if let Some((decoded, _)) = take_quoted(raw) {
            return decoded;
        }
    }
    raw.to_string()
}

/// Read one C-style quoted string from the start of `s`, returning the
/// decoded text and the remainder after the closing quote.
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }

    let mut out = Vec::new();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Some((String::from_utf8_lossy(&out).into_owned(), &s[i + 1..])),
            b'\\' => {
                let next = *bytes.get(i + 1)?;
                match next {
                    b'0'..=b'7' => {
                        let digits = bytes.get(i + 1..i + 4)?;
                        let octal = std::str::from_utf8(digits).ok()?;
                        out.push(u8::from_str_radix(octal, 8).ok()?);
                        i += 4;
                        continue;
                    }
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'v' => out.push(0x0b),
                    other => out.push(other),
                }
                i += 2;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    None
}

fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), CoderevError> {
    let invalid = || CoderevError::Parse(format!("invalid hunk header: {line}"));

    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| {
            let end = s.find(" @@")?;
            Some(&s[..end])
        })
        .ok_or_else(invalid)?;

    let (old, new) = inner.split_once(' ').ok_or_else(invalid)?;
    let old = old.strip_prefix('-').ok_or_else(invalid)?;
    let new = new.strip_prefix('+').ok_or_else(invalid)?;

    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;

    Ok((old_start, old_lines, new_start, new_lines))
}

fn parse_range(range: &str, context: &str) -> Result<(u32, u32), CoderevError> {
    let number = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| CoderevError::Parse(format!("invalid range in hunk header: {context}")))
    };
    match range.split_once(',') {
        Some((start, count)) => Ok((number(start)?, number(count)?)),
        None => Ok((number(range)?, 1)),
    }
}
