//! Context expansion around changed regions.
//!
//! Each hunk is narrowed to its changed region (first to last `+`/`-` line)
//! and then widened by up to `context_lines` unchanged lines on each side,
//! taken from the post-change file. Neighbouring hunks whose windows touch
//! or overlap are joined so that no line is emitted twice.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use coderev_core::{ChangeKind, CoderevError};

use crate::parser::{parse_unified_diff, ContextLine, FileDiff, Hunk, LineKind};

/// Supplies the post-change content of a file.
pub trait LineSource {
    /// Lines of `path` (relative to the repository root), or `None` if unavailable.
    fn lines(&self, path: &Path) -> Option<Vec<String>>;
}

/// No file access; only lines known from the diff itself are used.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSource;

impl LineSource for NoSource {
    fn lines(&self, _path: &Path) -> Option<Vec<String>> {
        None
    }
}

/// Reads files from a checked-out working tree.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LineSource for WorkingTree {
    fn lines(&self, path: &Path) -> Option<Vec<String>> {
        let full = self.root.join(path);
        if !full.is_file() {
            return None;
        }
        let bytes = std::fs::read(&full)
            .map_err(|e| tracing::debug!("cannot read {} for context: {e}", full.display()))
            .ok()?;
        Some(
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect(),
        )
    }
}

/// In-memory file contents keyed by path.
impl LineSource for HashMap<PathBuf, String> {
    fn lines(&self, path: &Path) -> Option<Vec<String>> {
        self.get(path)
            .map(|content| content.lines().map(str::to_string).collect())
    }
}

/// Parse a diff and expand every hunk with up to `context_lines` lines of context.
///
/// Without a [`LineSource`] only lines that appear in the diff can serve as
/// context.
///
/// # Errors
///
/// Returns [`CoderevError::Parse`] for a malformed hunk header.
///
/// # Examples
///
/// ```
/// use coderev_difflens::context::extract;
///
/// let diff = concat!(
///     "--- a/f.txt\n",
///     "+++ b/f.txt\n",
///     "@@ -1,5 +1,5 @@\n",
///     " one\n",
///     " two\n",
///     "-three\n",
///     "+THREE\n",
///     " four\n",
///     " five\n",
/// );
/// let files = extract(diff, 1).unwrap();
/// let hunk = &files[0].hunks[0];
/// assert_eq!(hunk.leading.len(), 1);
/// assert_eq!(hunk.leading[0].text, "two");
/// assert_eq!(hunk.trailing[0].text, "four");
/// ```
pub fn extract(raw: &str, context_lines: usize) -> Result<Vec<FileDiff>, CoderevError> {
    extract_with_source(raw, context_lines, &NoSource)
}

/// Like [`extract`], with context lines read from `source`.
///
/// # Errors
///
/// Returns [`CoderevError::Parse`] for a malformed hunk header.
pub fn extract_with_source(
    raw: &str,
    context_lines: usize,
    source: &dyn LineSource,
) -> Result<Vec<FileDiff>, CoderevError> {
    let mut files = parse_unified_diff(raw)?;
    for file in &mut files {
        expand_file(file, context_lines, source);
    }
    tracing::debug!(files = files.len(), context_lines, "extracted diff context");
    Ok(files)
}

/// Changed region of one hunk in new-file coordinates.
#[derive(Debug, Clone, Copy)]
struct Region {
    /// Index range into `hunk.lines`.
    first_idx: usize,
    last_idx: usize,
    /// First new-side line at or after the region's start.
    first_new: u32,
    /// Last new-side line consumed by the region (`first_new - 1` for pure deletions).
    last_new: u32,
}

fn region_of(hunk: &Hunk) -> Option<Region> {
    let first_idx = hunk.lines.iter().position(|l| l.kind != LineKind::Context)?;
    let last_idx = hunk.lines.iter().rposition(|l| l.kind != LineKind::Context)?;

    let initial = if hunk.new_lines == 0 {
        hunk.new_start + 1
    } else {
        hunk.new_start
    };
    let last_before = |end: usize| hunk.lines[..end].iter().filter_map(|l| l.new_lineno).last();

    let first_new = last_before(first_idx).map_or(initial, |n| n + 1);
    let last_new = last_before(last_idx + 1).unwrap_or(initial.saturating_sub(1));

    Some(Region {
        first_idx,
        last_idx,
        first_new,
        last_new,
    })
}

struct Lookup {
    known: BTreeMap<u32, String>,
    source: Option<Vec<String>>,
}

impl Lookup {
    fn new(file: &FileDiff, source: &dyn LineSource) -> Self {
        let known = file
            .hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter_map(|l| l.new_lineno.map(|n| (n, l.text.clone())))
            .collect();
        Self {
            known,
            source: source.lines(&file.path),
        }
    }

    fn get(&self, lineno: u32) -> Option<ContextLine> {
        if lineno == 0 {
            return None;
        }
        let text = self.known.get(&lineno).cloned().or_else(|| {
            self.source
                .as_ref()
                .and_then(|lines| lines.get(lineno as usize - 1).cloned())
        })?;
        Some(ContextLine { lineno, text })
    }

    /// Up to `n` lines ending just before `first`, stopping at the first gap.
    fn before(&self, first: u32, n: usize) -> Vec<ContextLine> {
        let mut out: Vec<ContextLine> = (1..=saturating_u32(n))
            .map_while(|back| first.checked_sub(back).and_then(|ln| self.get(ln)))
            .collect();
        out.reverse();
        out
    }

    /// Up to `n` lines starting just after `last`, stopping at the first gap.
    fn after(&self, last: u32, n: usize) -> Vec<ContextLine> {
        (1..=saturating_u32(n))
            .map_while(|fwd| last.checked_add(fwd).and_then(|ln| self.get(ln)))
            .collect()
    }

    /// Every line strictly between `last` and `next_first`, if all are known.
    fn between(&self, last: u32, next_first: u32) -> Option<Vec<ContextLine>> {
        (last + 1..next_first).map(|ln| self.get(ln)).collect()
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn expand_file(file: &mut FileDiff, context_lines: usize, source: &dyn LineSource) {
    if file.kind == ChangeKind::Deleted || file.is_binary() || file.hunks.is_empty() {
        return;
    }

    let lookup = Lookup::new(file, source);
    let regions: Vec<Option<Region>> = file.hunks.iter().map(region_of).collect();
    let window = (context_lines as u64).saturating_mul(2);

    for idx in 0..file.hunks.len() {
        let Some(region) = regions[idx] else {
            continue;
        };

        let hunk = &mut file.hunks[idx];
        hunk.lines = hunk.lines[region.first_idx..=region.last_idx].to_vec();
        if !hunk.joined {
            hunk.leading = lookup.before(region.first_new, context_lines);
        }

        let next = regions.get(idx + 1).copied().flatten();
        let gap = next.map(|n| {
            (n.first_new as u64).saturating_sub(region.last_new as u64 + 1)
        });
        let joined_gap = match (next, gap) {
            (Some(n), Some(g)) if g <= window => lookup.between(region.last_new, n.first_new),
            _ => None,
        };

        match joined_gap {
            Some(gap_lines) => {
                file.hunks[idx].trailing = gap_lines;
                file.hunks[idx + 1].joined = true;
            }
            None => {
                file.hunks[idx].trailing = lookup.after(region.last_new, context_lines);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: u32) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    fn source_for(path: &str, content: String) -> HashMap<PathBuf, String> {
        HashMap::from([(PathBuf::from(path), content)])
    }

    #[test]
    fn context_clipped_at_file_start_and_end() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,2 +1,2 @@
-line 1
+LINE 1
 line 2
@@ -5,1 +5,1 @@
-line 5
+LINE 5
";
        let mut content = numbered(5);
        content = content.replace("line 1\n", "LINE 1\n").replace("line 5\n", "LINE 5\n");
        let files = extract_with_source(diff, 10, &source_for("f.txt", content)).unwrap();
        let hunks = &files[0].hunks;
        assert!(hunks[0].leading.is_empty());
        // Gap of 3 lines is within the window, so the hunks join.
        assert!(hunks[1].joined);
        let gap: Vec<u32> = hunks[0].trailing.iter().map(|c| c.lineno).collect();
        assert_eq!(gap, vec![2, 3, 4]);
        assert!(hunks[1].trailing.is_empty());
    }

    #[test]
    fn huge_context_window_saturates() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -3,1 +3,1 @@
-line 3
+LINE 3
";
        let content = numbered(6).replace("line 3\n", "LINE 3\n");
        for n in [(u32::MAX as usize).saturating_add(1), usize::MAX] {
            let source = source_for("f.txt", content.clone());
            let files = extract_with_source(diff, n, &source).unwrap();
            let hunk = &files[0].hunks[0];
            let leading: Vec<u32> = hunk.leading.iter().map(|c| c.lineno).collect();
            let trailing: Vec<u32> = hunk.trailing.iter().map(|c| c.lineno).collect();
            assert_eq!(leading, vec![1, 2], "context {n}");
            assert_eq!(trailing, vec![4, 5, 6], "context {n}");
        }
    }

    #[test]
    fn distant_hunks_stay_separate() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -3 +3 @@
-old
+line 3
@@ -20 +20 @@
-old
+line 20
";
        let files = extract_with_source(diff, 2, &source_for("f.txt", numbered(30))).unwrap();
        let hunks = &files[0].hunks;
        assert!(!hunks[1].joined);
        let lead: Vec<u32> = hunks[1].leading.iter().map(|c| c.lineno).collect();
        assert_eq!(lead, vec![18, 19]);
        let trail: Vec<u32> = hunks[0].trailing.iter().map(|c| c.lineno).collect();
        assert_eq!(trail, vec![4, 5]);
    }

    #[test]
    fn region_excludes_diff_context_beyond_limit() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,7 +1,7 @@
 line 1
 line 2
 line 3
-old 4
+line 4
 line 5
 line 6
 line 7
";
        let files = extract(diff, 1).unwrap();
        let hunk = &files[0].hunks[0];
        assert_eq!(hunk.lines.len(), 2);
        assert_eq!(hunk.leading.len(), 1);
        assert_eq!(hunk.leading[0].lineno, 3);
        assert_eq!(hunk.trailing[0].lineno, 5);
    }

    #[test]
    fn zero_context_keeps_only_changes() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,3 +1,3 @@
 line 1
-old
+line 2
 line 3
";
        let files = extract(diff, 0).unwrap();
        let hunk = &files[0].hunks[0];
        assert!(hunk.leading.is_empty());
        assert!(hunk.trailing.is_empty());
        assert_eq!(hunk.lines.len(), 2);
    }

    #[test]
    fn pure_deletion_region_uses_following_line() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -4,2 +3,0 @@
-gone a
-gone b
";
        let files = extract_with_source(diff, 1, &source_for("f.txt", numbered(6))).unwrap();
        let hunk = &files[0].hunks[0];
        assert_eq!(hunk.leading[0].lineno, 3);
        assert_eq!(hunk.trailing[0].lineno, 4);
    }

    #[test]
    fn deleted_files_are_not_expanded() {
        let diff = "\
diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1,2 +0,0 @@
-a
-b
";
        let files = extract_with_source(diff, 5, &source_for("old.rs", numbered(9))).unwrap();
        let hunk = &files[0].hunks[0];
        assert!(hunk.leading.is_empty() && hunk.trailing.is_empty());
        assert_eq!(hunk.lines.len(), 2);
    }

    #[test]
    fn joined_gap_requires_known_lines_without_source() {
        // Lines 6..=9 are not in the diff, so the windows cannot be joined.
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -4,2 +4,2 @@
-x
+line 4
 line 5
@@ -10,2 +10,2 @@
 line 10
-y
+line 11
";
        let files = extract(diff, 5).unwrap();
        let hunks = &files[0].hunks;
        assert!(!hunks[1].joined);
        assert_eq!(hunks[0].trailing.len(), 1);
        assert_eq!(hunks[1].leading.len(), 1);
    }
}
