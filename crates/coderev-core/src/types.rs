use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a file changed between the base and head references.
///
/// # Examples
///
/// ```
/// use coderev_core::ChangeKind;
///
/// assert_eq!(ChangeKind::Renamed.to_string(), "renamed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// File did not exist at the base reference.
    Added,
    /// File exists on both sides with content or mode changes.
    Modified,
    /// File no longer exists at the head reference.
    Deleted,
    /// File moved to a new path (possibly with edits).
    Renamed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
        }
    }
}

/// Built-in review agents.
///
/// # Examples
///
/// ```
/// use coderev_core::AgentKind;
///
/// let agent: AgentKind = "copilot".parse().unwrap();
/// assert_eq!(agent, AgentKind::Copilot);
/// assert!("gpt".parse::<AgentKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// OpenAI Codex CLI, fed over standard input.
    #[default]
    Codex,
    /// GitHub Copilot CLI, fed through a prompt file.
    Copilot,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Codex => write!(f, "codex"),
            AgentKind::Copilot => write!(f, "copilot"),
        }
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "codex" => Ok(AgentKind::Codex),
            "copilot" => Ok(AgentKind::Copilot),
            _ => Err(format!(
                "unknown agent '{s}' (expected: codex, copilot; use agent-config for other tools)"
            )),
        }
    }
}

/// How the prompt is handed to an agent process.
///
/// # Examples
///
/// ```
/// use coderev_core::AgentMode;
///
/// let mode: AgentMode = serde_json::from_str("\"file\"").unwrap();
/// assert_eq!(mode, AgentMode::File);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Prompt written to the process's standard input.
    #[default]
    Stdin,
    /// Prompt substituted for `{prompt}` in the command arguments.
    Arg,
    /// Prompt written to a temporary file whose path replaces `{prompt_file}`.
    File,
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentMode::Stdin => write!(f, "stdin"),
            AgentMode::Arg => write!(f, "arg"),
            AgentMode::File => write!(f, "file"),
        }
    }
}

/// The logical role of a section of text in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    /// A document the review must enforce (contributing guide, style rules).
    ObeyDoc,
    /// The per-file diff snippets.
    Diff,
    /// The full post-change content of a diffed file.
    FullFile,
    /// The output template the agent should fill in.
    Template,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::ObeyDoc => write!(f, "obey-doc"),
            DocumentKind::Diff => write!(f, "diff"),
            DocumentKind::FullFile => write!(f, "full-file"),
            DocumentKind::Template => write!(f, "template"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_kind_from_str_is_case_insensitive() {
        assert_eq!("Codex".parse::<AgentKind>().unwrap(), AgentKind::Codex);
        assert_eq!(" COPILOT ".parse::<AgentKind>().unwrap(), AgentKind::Copilot);
    }

    #[test]
    fn unknown_agent_mentions_agent_config() {
        let err = "claude".parse::<AgentKind>().unwrap_err();
        assert!(err.contains("claude"));
        assert!(err.contains("agent-config"));
    }

    #[test]
    fn agent_mode_serde_roundtrip() {
        for mode in [AgentMode::Stdin, AgentMode::Arg, AgentMode::File] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{mode}\""));
            let back: AgentMode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, mode);
        }
    }

    #[test]
    fn agent_mode_rejects_unknown() {
        assert!(serde_json::from_str::<AgentMode>("\"pipe\"").is_err());
    }

    #[test]
    fn document_kind_display() {
        assert_eq!(DocumentKind::ObeyDoc.to_string(), "obey-doc");
        assert_eq!(DocumentKind::FullFile.to_string(), "full-file");
    }
}
