use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use coderev_core::{Config, CoderevError, DocumentKind};
use coderev_difflens::{extract_with_source, snippets, WorkingTree};

use crate::agent::{interrupted, AgentDispatcher, AgentSpec};
use crate::documents::{DocumentLoader, PromptDocument};
use crate::prompt::{diff_section, PromptAssembler};

/// A fully assembled prompt plus what went into it.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub text: String,
    pub stats: PromptStats,
}

/// Counters describing one assembly pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptStats {
    /// Files in the diff.
    pub files: usize,
    /// Files whose snippet hit `snippet-max-chars`.
    pub snippets_truncated: usize,
    /// Whether whole files were dropped under `max-diff-bytes`.
    pub diff_truncated: bool,
    /// Obey-docs, full files and template actually included.
    pub documents: usize,
    /// Documents cut under their byte budget.
    pub documents_truncated: usize,
}

impl fmt::Display for PromptStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files ({} snippets truncated{}), {} documents ({} truncated)",
            self.files,
            self.snippets_truncated,
            if self.diff_truncated {
                ", diff section truncated"
            } else {
                ""
            },
            self.documents,
            self.documents_truncated
        )
    }
}

/// Drives one review: diff text in, agent verdict out.
///
/// Stages run strictly in sequence: context extraction, document loading,
/// prompt assembly, agent dispatch.
pub struct ReviewPipeline {
    config: Config,
    repo_root: PathBuf,
    branch: String,
}

impl ReviewPipeline {
    pub fn new(config: Config, repo_root: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            config,
            repo_root: repo_root.into(),
            branch: branch.into(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Turn raw `git diff` output into the final prompt.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::Parse`] if the diff is malformed.
    pub fn build_prompt(&self, raw_diff: &str) -> Result<PreparedPrompt, CoderevError> {
        let limits = self.config.limits;
        let tree = WorkingTree::new(&self.repo_root);
        let files = extract_with_source(raw_diff, self.config.context_lines, &tree)?;
        let rendered = snippets(&files, limits.snippet_max_chars);
        let diff = diff_section(&rendered, limits.max_diff_bytes);

        let loader = DocumentLoader::new(&self.repo_root);
        let mut documents: Vec<PromptDocument> =
            loader.load(&self.config.obey_docs, DocumentKind::ObeyDoc, limits.max_doc_bytes);
        if self.config.include_full_files {
            documents.extend(loader.full_files(&files, limits.max_file_bytes));
        }
        if let Some(template) = &self.config.template {
            documents.extend(loader.load_one(
                template,
                DocumentKind::Template,
                limits.max_doc_bytes,
            ));
        }

        let text = PromptAssembler::new(&self.config, &self.branch)
            .assemble(&rendered, &diff, &documents);
        let stats = PromptStats {
            files: files.len(),
            snippets_truncated: rendered.iter().filter(|s| s.truncated).count(),
            diff_truncated: diff.truncated,
            documents: documents.len(),
            documents_truncated: documents.iter().filter(|d| d.truncated).count(),
        };
        tracing::debug!("prompt assembled: {stats}, {} bytes", text.len());
        Ok(PreparedPrompt { text, stats })
    }

    /// The agent this run will invoke.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::ConfigValue`] for an unknown built-in agent or
    /// an invalid `agent-config`.
    pub fn agent_spec(&self) -> Result<AgentSpec, CoderevError> {
        AgentSpec::resolve(&self.config.agent, self.config.agent_config.as_ref())
    }

    /// Build the prompt and run the agent on it, stopping early if `cancel` fires.
    ///
    /// # Errors
    ///
    /// Propagates prompt, configuration and agent errors.
    pub async fn run_until<F>(&self, raw_diff: &str, cancel: F) -> Result<String, CoderevError>
    where
        F: Future<Output = ()>,
    {
        let spec = self.agent_spec()?;
        let prompt = self.build_prompt(raw_diff)?;
        tracing::info!("prompt ready: {}", prompt.stats);
        let output = AgentDispatcher::new(&self.repo_root)
            .dispatch_until(&spec, &prompt.text, cancel)
            .await?;
        Ok(output.text)
    }

    /// Like [`ReviewPipeline::run_until`], cancelling on Ctrl-C.
    ///
    /// # Errors
    ///
    /// Propagates prompt, configuration and agent errors.
    pub async fn run(&self, raw_diff: &str) -> Result<String, CoderevError> {
        self.run_until(raw_diff, interrupted()).await
    }
}
