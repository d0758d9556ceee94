use std::path::PathBuf;

/// Errors that can occur across the coderev pipeline.
///
/// Every fatal condition of a review run maps to one variant. Recoverable
/// conditions (a missing obey-doc, an exceeded size budget) are logged
/// instead and never reach this type. Library crates return it directly;
/// the binary renders it through miette.
///
/// # Examples
///
/// ```
/// use coderev_core::CoderevError;
///
/// let err = CoderevError::ConfigValue("context-lines must be non-negative".into());
/// assert!(err.to_string().contains("context-lines"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CoderevError {
    /// Filesystem I/O failure outside of a more specific context.
    #[error("IO error: {0}")]
    #[diagnostic(code(coderev::io))]
    Io(#[from] std::io::Error),

    /// An explicitly named config file could not be read or is not a JSON object.
    #[error("could not load config file {}: {reason}", .path.display())]
    #[diagnostic(
        code(coderev::config::parse),
        help("fix the file, point --config at another one, or pass --no-config")
    )]
    ConfigParse {
        /// The config file that failed.
        path: PathBuf,
        /// What went wrong while reading or parsing it.
        reason: String,
    },

    /// A configuration value is malformed or out of range.
    #[error("invalid configuration: {0}")]
    #[diagnostic(code(coderev::config::value))]
    ConfigValue(String),

    /// The base/head references could not be diffed (or the remote fetch failed).
    #[error("diff unavailable: {0}")]
    #[diagnostic(
        code(coderev::git),
        help("check that --base-ref and --head-ref name existing commits")
    )]
    DiffUnavailable(String),

    /// Malformed unified-diff input.
    #[error("parse error: {0}")]
    #[diagnostic(code(coderev::diff::parse))]
    Parse(String),

    /// The agent executable could not be started.
    #[error("failed to start agent `{command}`: {source}")]
    #[diagnostic(
        code(coderev::agent::invocation),
        help("make sure the agent CLI is installed and on PATH, or override it with --agent-config")
    )]
    AgentInvocation {
        /// The executable that was attempted.
        command: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The agent ran but exited unsuccessfully.
    #[error("agent `{name}` exited with {}{}", status_label(.code), stderr_suffix(.stderr))]
    #[diagnostic(code(coderev::agent::failure))]
    AgentFailure {
        /// Agent name from the resolved spec.
        name: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The review could not be persisted to `--out`.
    #[error("failed to write review output to {}: {source}", .path.display())]
    #[diagnostic(
        code(coderev::output),
        help("the review was still printed to standard output")
    )]
    OutputWrite {
        /// Destination path.
        path: PathBuf,
        /// The underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// The run was interrupted while the agent was running.
    #[error("interrupted; agent process terminated")]
    #[diagnostic(code(coderev::cancelled))]
    Cancelled,
}

fn status_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoderevError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_parse_shows_path() {
        let err = CoderevError::ConfigParse {
            path: PathBuf::from("/tmp/coderev.json"),
            reason: "expected value at line 1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/coderev.json"));
        assert!(msg.contains("expected value"));
    }

    #[test]
    fn agent_failure_carries_stderr() {
        let err = CoderevError::AgentFailure {
            name: "codex".into(),
            code: Some(3),
            stderr: "auth required\n".into(),
        };
        assert_eq!(
            err.to_string(),
            "agent `codex` exited with status 3:\nauth required"
        );
    }

    #[test]
    fn agent_failure_without_stderr_or_code() {
        let err = CoderevError::AgentFailure {
            name: "mycli".into(),
            code: None,
            stderr: "  ".into(),
        };
        assert_eq!(err.to_string(), "agent `mycli` exited with a signal");
    }
}
