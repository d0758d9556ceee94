use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use coderev_core::{Config, ConfigLayer, ConfigSource, SearchPaths};
use coderev_review::git::{discover_root, Git};
use coderev_review::output::OutputWriter;
use coderev_review::pipeline::ReviewPipeline;

#[derive(Parser)]
#[command(
    name = "coderev",
    version,
    about = "Review a branch with a pluggable AI agent",
    long_about = "Collects the diff of a branch against its base, expands it with surrounding\n\
                   context, adds the documentation the reviewer must obey, packs everything into\n\
                   one size-bounded prompt and hands it to an external review agent.\n\n\
                   Examples:\n  \
                     coderev feature/login\n  \
                     coderev feature/login --obey-doc CONTRIBUTING.md --template review.md\n  \
                     coderev fix-123 --agent copilot --out reviews/fix-123.md\n  \
                     coderev wip --agent-config '{\"name\":\"local\",\"mode\":\"stdin\",\"cmd\":[\"cat\"]}'"
)]
struct Cli {
    /// Branch to review (checked out before diffing)
    branch: String,

    /// Base reference to diff against (default: origin/main)
    #[arg(long)]
    base_ref: Option<String>,

    /// Head reference (default: HEAD)
    #[arg(long)]
    head_ref: Option<String>,

    /// Document the reviewer must obey (repeatable)
    #[arg(long = "obey-doc", value_name = "PATH")]
    obey_doc: Vec<PathBuf>,

    /// Result template the agent fills in (empty string to disable)
    #[arg(long, value_name = "PATH")]
    template: Option<String>,

    /// Built-in agent: codex or copilot
    #[arg(long)]
    agent: Option<String>,

    /// Custom agent as JSON: {"name", "mode", "cmd", "cwd", "env"}
    #[arg(long, value_name = "JSON")]
    agent_config: Option<String>,

    /// Context lines around each change (default: 20)
    #[arg(long, allow_negative_numbers = true)]
    context_lines: Option<i64>,

    /// Append full post-change contents of every changed file
    #[arg(long)]
    include_full_files: bool,

    /// Budget for the whole diff section, in bytes
    #[arg(long, allow_negative_numbers = true)]
    max_diff_bytes: Option<i64>,

    /// Budget per obey-doc or template, in bytes
    #[arg(long, allow_negative_numbers = true)]
    max_doc_bytes: Option<i64>,

    /// Budget per full file, in bytes
    #[arg(long, allow_negative_numbers = true)]
    max_file_bytes: Option<i64>,

    /// Budget per file snippet, in characters
    #[arg(long, allow_negative_numbers = true)]
    snippet_max_chars: Option<i64>,

    /// Also write the review to this file (empty string to disable)
    #[arg(long, value_name = "PATH")]
    out: Option<String>,

    /// Configuration file (default: search .coderev.json, coderev.json)
    #[arg(long, short, value_name = "PATH", conflicts_with = "no_config")]
    config: Option<PathBuf>,

    /// Ignore all configuration files
    #[arg(long)]
    no_config: bool,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            base_ref: self.base_ref.clone(),
            head_ref: self.head_ref.clone(),
            obey_doc: (!self.obey_doc.is_empty()).then(|| self.obey_doc.clone()),
            template: self.template.clone(),
            include_full_files: self.include_full_files.then_some(true),
            agent: self.agent.clone(),
            agent_config: self.agent_config.clone().map(serde_json::Value::String),
            context_lines: self.context_lines,
            max_diff_bytes: self.max_diff_bytes,
            max_doc_bytes: self.max_doc_bytes,
            max_file_bytes: self.max_file_bytes,
            snippet_max_chars: self.snippet_max_chars,
            out: self.out.clone(),
        }
    }

    /// A relative `--config` resolves against the repository root, or the
    /// current directory outside a repository.
    fn config_source(&self, cwd: PathBuf, repo_root: Option<PathBuf>) -> ConfigSource {
        if self.no_config {
            return ConfigSource::Disabled;
        }
        match &self.config {
            Some(path) => {
                let base = repo_root.as_deref().unwrap_or(cwd.as_path());
                ConfigSource::explicit(path, base)
            }
            None => ConfigSource::Search(SearchPaths::new(cwd, repo_root)),
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = std::env::current_dir()
        .into_diagnostic()
        .wrap_err("cannot determine the current directory")?;
    let found_root = discover_root(&cwd);
    let repo_root = found_root.clone().unwrap_or_else(|| cwd.clone());

    let env = ConfigLayer::from_env(|name| std::env::var(name).ok())?;
    let source = cli.config_source(cwd, found_root);
    let config = Config::resolve(cli.layer(), env, &source)?;
    tracing::debug!("resolved config: {config:?}");

    let git = Git::new(&repo_root);
    git.fetch(&config.base_ref)?;
    git.checkout(&cli.branch)?;
    let raw_diff = git.diff(&config.base_ref, &config.head_ref)?;

    let pipeline = ReviewPipeline::new(config, &repo_root, &cli.branch);

    let spinner = if std::io::stderr().is_terminal() {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_style(
            indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                .into_diagnostic()?,
        );
        pb.set_message("Waiting for the review agent...");
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let review = pipeline.run(&raw_diff).await.inspect_err(|_e| {
        if let Some(pb) = &spinner {
            pb.finish_with_message("Failed");
        }
    })?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let mut stdout = std::io::stdout().lock();
    OutputWriter::new(&repo_root).write(&mut stdout, &review, pipeline.config().out.as_deref())?;
    Ok(())
}
