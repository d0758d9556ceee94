use coderev_core::truncate::{self, Unit};
use coderev_core::{Config, DocumentKind};
use coderev_difflens::Snippet;

use crate::documents::PromptDocument;

const INSTRUCTIONS: &str = "\
Perform a PR review. Obey the provided documentation. \
Focus on correctness, maintainability, security, performance, and tests.";

const DEFAULT_OUTPUT_REQUIREMENTS: &str = "\
- Output markdown with: Summary, Major Issues, Minor Issues, Tests, Suggestions.
- Be specific (file paths and line ranges when possible).";

const TEMPLATE_INSTRUCTIONS: &str = "\
Fill in the template below as your final answer. Keep its headings and \
structure; be specific (file paths and line ranges when possible).";

const NO_DIFF: &str = "(No diff)";

/// Build the diff section from per-file snippets under `max_bytes`.
///
/// Whole trailing files are dropped once the budget runs out; a marker then
/// names how many files and bytes were omitted.
///
/// # Examples
///
/// ```
/// use coderev_review::prompt::diff_section;
///
/// let doc = diff_section(&[], 1000);
/// assert_eq!(doc.text, "(No diff)\n");
/// assert!(!doc.truncated);
/// ```
pub fn diff_section(snippets: &[Snippet], max_bytes: usize) -> PromptDocument {
    if snippets.is_empty() {
        return PromptDocument {
            kind: DocumentKind::Diff,
            source: None,
            text: format!("{NO_DIFF}\n"),
            truncated: false,
        };
    }

    let sections: Vec<String> = snippets.iter().map(render_file_section).collect();
    let packed = truncate::pack_whole(&sections, max_bytes, Unit::Bytes, "files");
    if packed.truncated() {
        tracing::info!(
            "diff section truncated: {} of {} files kept, {} bytes omitted \
             (max-diff-bytes {max_bytes})",
            packed.kept,
            snippets.len(),
            packed.dropped_units
        );
    }

    PromptDocument {
        kind: DocumentKind::Diff,
        source: None,
        truncated: packed.truncated(),
        text: packed.text,
    }
}

fn render_file_section(snippet: &Snippet) -> String {
    let body = if snippet.text.is_empty() {
        "(no textual changes)\n"
    } else {
        snippet.text.as_str()
    };
    format!("### {}\n{body}\n", snippet.label())
}

/// Assembles the final prompt in a fixed section order: preamble,
/// obey-docs, diff, full files, template.
pub struct PromptAssembler<'a> {
    config: &'a Config,
    branch: &'a str,
}

impl<'a> PromptAssembler<'a> {
    pub fn new(config: &'a Config, branch: &'a str) -> Self {
        Self { config, branch }
    }

    /// Render the prompt. `documents` may arrive in any order; they are
    /// placed by kind. Full files appear only with `include-full-files`.
    ///
    /// # Examples
    ///
    /// ```
    /// use coderev_core::Config;
    /// use coderev_review::prompt::{diff_section, PromptAssembler};
    ///
    /// let config = Config::default();
    /// let diff = diff_section(&[], 100);
    /// let prompt = PromptAssembler::new(&config, "feature/x").assemble(&[], &diff, &[]);
    /// assert!(prompt.starts_with("# Task: Automated PR Review"));
    /// assert!(prompt.contains("Branch under review: feature/x"));
    /// assert!(prompt.contains("(No diff)"));
    /// ```
    pub fn assemble(
        &self,
        files: &[Snippet],
        diff: &PromptDocument,
        documents: &[PromptDocument],
    ) -> String {
        let of_kind = |kind: DocumentKind| documents.iter().filter(move |d| d.kind == kind);
        let template = of_kind(DocumentKind::Template).next();

        let mut parts: Vec<String> = Vec::new();
        parts.push(self.preamble(files, template.is_none()));

        let obey: Vec<&PromptDocument> = of_kind(DocumentKind::ObeyDoc).collect();
        if !obey.is_empty() {
            let mut section = String::from("## Documentation to OBEY (highest priority)\n");
            for doc in obey {
                section.push_str(&format!("\n### {}\n{}", doc.title(), with_newline(&doc.text)));
            }
            parts.push(section);
        }

        parts.push(format!("## Diff\n\n{}", with_newline(&diff.text)));

        if self.config.include_full_files {
            let full: Vec<&PromptDocument> = of_kind(DocumentKind::FullFile).collect();
            if !full.is_empty() {
                let mut section = String::from("## Full Contents of Changed Files\n");
                for doc in full {
                    let body = with_newline(&doc.text);
                    section.push_str(&format!("\n### {}\n{body}", doc.title()));
                }
                parts.push(section);
            }
        }

        if let Some(doc) = template {
            parts.push(format!(
                "## Result Template (fill this in)\n\n{TEMPLATE_INSTRUCTIONS}\n\n### {}\n{}",
                doc.title(),
                with_newline(&doc.text)
            ));
        }

        normalize(&parts.join("\n"))
    }

    fn preamble(&self, files: &[Snippet], default_requirements: bool) -> String {
        let mut text = String::from("# Task: Automated PR Review\n\n");
        text.push_str(&format!("Branch under review: {}\n", self.branch));
        text.push_str(&format!("Diff base: {}\n", self.config.base_ref));
        text.push_str(&format!("Diff head: {}\n", self.config.head_ref));

        text.push_str("\n## Changed Files\n");
        if files.is_empty() {
            text.push_str("- (none)\n");
        }
        for file in files {
            text.push_str(&format!("- {}\n", file.label()));
        }

        text.push_str(&format!("\n## Instructions\n{INSTRUCTIONS}\n"));
        if default_requirements {
            text.push_str(&format!("\n## Output Requirements\n{DEFAULT_OUTPUT_REQUIREMENTS}\n"));
        }
        text
    }
}

fn with_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

/// Replace non-breaking hyphens (U+2011), which some agents mangle.
fn normalize(text: &str) -> String {
    text.replace('\u{2011}', "-")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use coderev_core::ChangeKind;

    use super::*;

    fn snippet(path: &str, text: &str) -> Snippet {
        Snippet {
            path: PathBuf::from(path),
            old_path: None,
            kind: ChangeKind::Modified,
            text: text.to_string(),
            truncated: false,
        }
    }

    fn doc(kind: DocumentKind, name: &str, text: &str) -> PromptDocument {
        PromptDocument {
            kind,
            source: Some(PathBuf::from(name)),
            text: text.to_string(),
            truncated: false,
        }
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{needle:?} missing from prompt"))
    }

    #[test]
    fn sections_follow_fixed_order() {
        let config = Config {
            include_full_files: true,
            ..Config::default()
        };
        let files = vec![snippet("src/a.rs", "+ a\n")];
        let diff = diff_section(&files, 10_000);
        // Deliberately shuffled input.
        let documents = vec![
            doc(DocumentKind::Template, "t.md", "TEMPLATE BODY"),
            doc(DocumentKind::FullFile, "src/a.rs", "FULL BODY"),
            doc(DocumentKind::ObeyDoc, "CONTRIBUTING.md", "OBEY BODY"),
        ];
        let prompt = PromptAssembler::new(&config, "feat").assemble(&files, &diff, &documents);

        let preamble = position(&prompt, "# Task: Automated PR Review");
        let obey = position(&prompt, "OBEY BODY");
        let diff_at = position(&prompt, "## Diff");
        let full = position(&prompt, "FULL BODY");
        let template = position(&prompt, "TEMPLATE BODY");
        assert!(preamble < obey && obey < diff_at && diff_at < full && full < template);
        assert!(!prompt.contains("## Output Requirements"));
    }

    #[test]
    fn full_files_omitted_unless_enabled() {
        let config = Config::default();
        let documents = vec![doc(DocumentKind::FullFile, "src/a.rs", "FULL BODY")];
        let prompt = PromptAssembler::new(&config, "feat")
            .assemble(&[], &diff_section(&[], 100), &documents);
        assert!(!prompt.contains("FULL BODY"));
        assert!(!prompt.contains("## Full Contents"));
    }

    #[test]
    fn default_requirements_without_template() {
        let config = Config::default();
        let prompt =
            PromptAssembler::new(&config, "feat").assemble(&[], &diff_section(&[], 100), &[]);
        assert!(prompt.contains("## Output Requirements"));
        assert!(prompt.contains("Summary, Major Issues"));
        assert!(!prompt.contains("Result Template"));
    }

    #[test]
    fn changed_files_listed_with_kinds() {
        let config = Config::default();
        let files = vec![snippet("x.rs", "+x\n"), snippet("y.rs", "")];
        let prompt = PromptAssembler::new(&config, "feat")
            .assemble(&files, &diff_section(&files, 10_000), &[]);
        assert!(prompt.contains("- x.rs (modified)\n- y.rs (modified)\n"));
        assert!(prompt.contains("### y.rs (modified)\n(no textual changes)"));
        assert!(position(&prompt, "### x.rs") < position(&prompt, "### y.rs"));
    }

    #[test]
    fn non_breaking_hyphens_are_normalized() {
        let config = Config::default();
        let documents = vec![doc(DocumentKind::ObeyDoc, "rules.md", "non\u{2011}breaking")];
        let prompt = PromptAssembler::new(&config, "feat")
            .assemble(&[], &diff_section(&[], 100), &documents);
        assert!(prompt.contains("non-breaking"));
        assert!(!prompt.contains('\u{2011}'));
    }

    #[test]
    fn diff_section_drops_whole_files() {
        let files: Vec<Snippet> = (0..5)
            .map(|i| snippet(&format!("f{i}.rs"), &format!("+ {}\n", "x".repeat(80))))
            .collect();
        let section = diff_section(&files, 250);
        assert!(section.truncated);
        assert!(section.text.len() <= 250);
        assert!(section.text.trim_end().ends_with("omitted) ..."));
        assert!(section.text.contains("### f0.rs"));
        assert!(!section.text.contains("### f4.rs"));
    }
}
