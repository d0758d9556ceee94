use std::path::PathBuf;

use coderev_core::truncate::{self, Unit};
use coderev_core::ChangeKind;

use crate::parser::{FileDiff, Hunk, LineKind};

/// Rendered, possibly truncated, diff text for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
    pub kind: ChangeKind,
    /// Empty for files without hunks (pure renames, mode changes).
    pub text: String,
    pub truncated: bool,
}

impl Snippet {
    /// Heading used for this file in prompts and file lists.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use coderev_core::ChangeKind;
    /// use coderev_difflens::Snippet;
    ///
    /// let snippet = Snippet {
    ///     path: PathBuf::from("src/new.rs"),
    ///     old_path: Some(PathBuf::from("src/old.rs")),
    ///     kind: ChangeKind::Renamed,
    ///     text: String::new(),
    ///     truncated: false,
    /// };
    /// assert_eq!(snippet.label(), "src/new.rs (renamed from src/old.rs)");
    /// ```
    pub fn label(&self) -> String {
        match &self.old_path {
            Some(old) => format!("{} ({} from {})", self.path.display(), self.kind, old.display()),
            None => format!("{} ({})", self.path.display(), self.kind),
        }
    }
}

/// One printed row: sign, line number, text.
type Row<'a> = (char, Option<u32>, &'a str);

fn push_row(out: &mut String, (sign, lineno, text): Row<'_>) {
    let number = lineno.map_or_else(String::new, |n| n.to_string());
    out.push_str(&format!("{sign} {number:>6} | {text}\n"));
}

/// Text after the closing `@@` of a hunk header (usually the enclosing function).
fn section_heading(header: &str) -> &str {
    header
        .strip_prefix("@@")
        .and_then(|rest| rest.find("@@").map(|i| &rest[i + 2..]))
        .unwrap_or("")
}

/// A `@@ -a,b +c,d @@` header whose ranges cover exactly `rows`.
///
/// Context rows carry only new-file numbers; their old numbers follow from
/// `offset`, the new-minus-old line shift in effect before the first change.
fn block_header(first: &Hunk, rows: &[Row<'_>]) -> String {
    let offset = i64::from(first.new_start) - i64::from(first.old_start);
    let (old_start, new_start) = match rows.first() {
        Some(&('-', Some(old), _)) => (i64::from(old), i64::from(old) + offset),
        Some(&(_, Some(new), _)) => (i64::from(new) - offset, i64::from(new)),
        _ => (i64::from(first.old_start), i64::from(first.new_start)),
    };
    let old_lines = rows.iter().filter(|(sign, _, _)| *sign != '+').count();
    let new_lines = rows.iter().filter(|(sign, _, _)| *sign != '-').count();
    format!(
        "@@ -{},{old_lines} +{},{new_lines} @@{}",
        old_start.max(0),
        new_start.max(0),
        section_heading(&first.header)
    )
}

fn hunk_rows(hunk: &Hunk) -> impl Iterator<Item = Row<'_>> {
    let leading = hunk.leading.iter().map(|l| (' ', Some(l.lineno), l.text.as_str()));
    let body = hunk.lines.iter().map(|line| match line.kind {
        LineKind::Added => ('+', line.new_lineno, line.text.as_str()),
        LineKind::Removed => ('-', line.old_lineno, line.text.as_str()),
        LineKind::Context => (' ', line.new_lineno, line.text.as_str()),
    });
    let trailing = hunk.trailing.iter().map(|l| (' ', Some(l.lineno), l.text.as_str()));
    leading.chain(body).chain(trailing)
}

/// Render one expanded file: hunk headers, then context and changed lines
/// with their line numbers. Binary markers are emitted verbatim.
///
/// Added and context lines carry new-file numbers; removed lines carry
/// old-file numbers. A joined hunk continues the previous block, and each
/// block gets one header describing the rows actually shown.
pub fn render(file: &FileDiff) -> String {
    if let Some(marker) = &file.binary {
        return format!("{marker}\n");
    }

    let mut out = String::new();
    let mut hunks = file.hunks.iter().peekable();
    while let Some(first) = hunks.next() {
        let mut rows: Vec<Row<'_>> = hunk_rows(first).collect();
        while let Some(next) = hunks.next_if(|h| h.joined) {
            rows.extend(hunk_rows(next));
        }
        out.push_str(&block_header(first, &rows));
        out.push('\n');
        for row in rows {
            push_row(&mut out, row);
        }
    }
    out
}

/// Render every file and cap each snippet at `max_chars` characters.
pub fn snippets(files: &[FileDiff], max_chars: usize) -> Vec<Snippet> {
    files
        .iter()
        .map(|file| {
            let (text, truncated) = truncate::apply(&render(file), max_chars, Unit::Chars);
            if truncated {
                tracing::info!(
                    "snippet for {} truncated to {max_chars} chars (snippet-max-chars)",
                    file.path.display()
                );
            }
            Snippet {
                path: file.path.clone(),
                old_path: file.old_path.clone(),
                kind: file.kind,
                text,
                truncated,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::extract;

    #[test]
    fn render_shows_numbers_and_markers() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,3 +1,3 @@
 keep
-old
+new
 tail
";
        let files = extract(diff, 1).unwrap();
        let text = render(&files[0]);
        assert_eq!(
            text,
            "@@ -1,3 +1,3 @@\n\
             \x20      1 | keep\n\
             -      2 | old\n\
             +      2 | new\n\
             \x20      3 | tail\n"
        );
    }

    #[test]
    fn header_matches_trimmed_rows() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,9 +1,10 @@ fn main() {
 one
 two
 three
 four
-five
+FIVE
+extra
 six
 seven
 eight
 nine
";
        let files = extract(diff, 1).unwrap();
        let text = render(&files[0]);
        assert_eq!(
            text,
            "@@ -4,3 +4,4 @@ fn main() {\n\
             \x20      4 | four\n\
             -      5 | five\n\
             +      5 | FIVE\n\
             +      6 | extra\n\
             \x20      7 | six\n"
        );
    }

    #[test]
    fn joined_block_header_spans_both_hunks() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -2,1 +2,2 @@
+inserted
 two
@@ -5,1 +5,0 @@
-five
";
        let source = std::collections::HashMap::from([(
            std::path::PathBuf::from("f.txt"),
            "one\ninserted\ntwo\nthree\nfour\nsix\n".to_string(),
        )]);
        let files = crate::context::extract_with_source(diff, 2, &source).unwrap();
        assert!(files[0].hunks[1].joined);
        let text = render(&files[0]);
        // Rows: new 1 (one), +2, new 3..5 (two three four), -5 (five), new 6 (six).
        assert!(text.starts_with("@@ -1,6 +1,6 @@\n"), "{text}");
        assert_eq!(text.matches("@@").count(), 2);
    }

    #[test]
    fn binary_marker_passes_through() {
        let diff = "\
diff --git a/a.png b/a.png
Binary files a/a.png and b/a.png differ
";
        let files = extract(diff, 3).unwrap();
        assert_eq!(render(&files[0]), "Binary files a/a.png and b/a.png differ\n");
    }

    #[test]
    fn rename_without_hunks_has_empty_body() {
        let diff = "\
diff --git a/a.rs b/b.rs
similarity index 100%
rename from a.rs
rename to b.rs
";
        let files = extract(diff, 3).unwrap();
        let out = snippets(&files, 100);
        assert_eq!(out.len(), 1);
        assert!(out[0].text.is_empty());
        assert_eq!(out[0].label(), "b.rs (renamed from a.rs)");
    }

    #[test]
    fn long_snippet_is_capped_in_chars() {
        let mut diff = String::from("--- a/big.txt\n+++ b/big.txt\n@@ -0,0 +1,200 @@\n");
        for i in 0..200 {
            diff.push_str(&format!("+añadido {i}\n"));
        }
        let files = extract(&diff, 0).unwrap();
        let out = snippets(&files, 500);
        assert!(out[0].truncated);
        assert!(out[0].text.chars().count() <= 500);
        assert!(out[0].text.starts_with("@@ -0,0 +1,200 @@\n"));
    }
}
