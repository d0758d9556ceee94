use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use coderev_core::{AgentKind, AgentMode, AgentOverride, CoderevError};
use tokio::io::AsyncWriteExt;

/// Token replaced by the prompt text in `arg` mode.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";
/// Token replaced by the prompt file path in `file` mode.
pub const PROMPT_FILE_PLACEHOLDER: &str = "{prompt_file}";

/// How to run one external review agent.
///
/// # Examples
///
/// ```
/// use coderev_core::{AgentKind, AgentMode};
/// use coderev_review::agent::AgentSpec;
///
/// let codex = AgentSpec::builtin(AgentKind::Codex);
/// assert_eq!(codex.cmd, vec!["codex", "exec", "-"]);
/// assert_eq!(codex.mode, AgentMode::Stdin);
///
/// let copilot = AgentSpec::builtin(AgentKind::Copilot);
/// assert_eq!(copilot.mode, AgentMode::File);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub name: String,
    pub mode: AgentMode,
    /// Executable followed by its arguments.
    pub cmd: Vec<String>,
    /// Working directory relative to the repository root.
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl AgentSpec {
    /// The preset command line for a built-in agent.
    pub fn builtin(kind: AgentKind) -> Self {
        let (mode, cmd): (AgentMode, &[&str]) = match kind {
            AgentKind::Codex => (AgentMode::Stdin, &["codex", "exec", "-"]),
            AgentKind::Copilot => (
                AgentMode::File,
                &["copilot", "--prompt-file", PROMPT_FILE_PLACEHOLDER],
            ),
        };
        Self {
            name: kind.to_string(),
            mode,
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// The effective spec: the override when present, else the built-in
    /// named by `agent`. With an override, `agent` only supplies a default
    /// name and need not be a built-in.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::ConfigValue`] for an unknown built-in name or
    /// an invalid resulting spec (see [`AgentSpec::validate`]).
    pub fn resolve(agent: &str, custom: Option<&AgentOverride>) -> Result<Self, CoderevError> {
        let spec = match custom {
            None => Self::builtin(agent.parse().map_err(CoderevError::ConfigValue)?),
            Some(custom) => Self {
                name: custom
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| agent.to_string()),
                mode: custom.mode,
                cmd: custom.cmd.clone(),
                cwd: custom.cwd.clone(),
                env: custom.env.clone(),
            },
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Reject an empty command, and `arg`/`file` commands lacking their placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::ConfigValue`] describing the problem.
    pub fn validate(&self) -> Result<(), CoderevError> {
        if self.cmd.first().map_or(true, |c| c.trim().is_empty()) {
            return Err(CoderevError::ConfigValue(format!(
                "agent `{}` has an empty cmd",
                self.name
            )));
        }
        let required = match self.mode {
            AgentMode::Stdin => None,
            AgentMode::Arg => Some(PROMPT_PLACEHOLDER),
            AgentMode::File => Some(PROMPT_FILE_PLACEHOLDER),
        };
        if let Some(token) = required {
            if !self.cmd.iter().any(|part| part.contains(token)) {
                return Err(CoderevError::ConfigValue(format!(
                    "agent `{}` uses mode `{}` but its cmd has no {token} placeholder",
                    self.name, self.mode
                )));
            }
        }
        Ok(())
    }
}

/// Resolves on the first Ctrl-C; never resolves if no handler can be installed.
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// What the agent produced.
#[derive(Debug)]
pub struct AgentOutput {
    /// Standard output, lossily decoded.
    pub text: String,
    pub status: ExitStatus,
}

/// Runs agent processes on behalf of one repository.
#[derive(Debug, Clone)]
pub struct AgentDispatcher {
    repo_root: PathBuf,
}

/// Everything needed to spawn, after placeholder substitution.
struct Invocation {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
    /// Held until the process is gone; dropping it removes the file.
    _prompt_file: Option<tempfile::NamedTempFile>,
}

fn substitute(cmd: &[String], token: &str, value: &str) -> Vec<String> {
    cmd.iter().map(|part| part.replace(token, value)).collect()
}

fn prepare(spec: &AgentSpec, prompt: &str) -> Result<Invocation, CoderevError> {
    let (tokens, stdin, prompt_file) = match spec.mode {
        AgentMode::Stdin => (spec.cmd.clone(), Some(prompt.to_string()), None),
        AgentMode::Arg => (substitute(&spec.cmd, PROMPT_PLACEHOLDER, prompt), None, None),
        AgentMode::File => {
            let mut file = tempfile::Builder::new()
                .prefix("coderev-prompt-")
                .suffix(".md")
                .tempfile()?;
            file.write_all(prompt.as_bytes())?;
            file.flush()?;
            let path = file.path().to_string_lossy().into_owned();
            tracing::debug!("prompt written to {path}");
            (
                substitute(&spec.cmd, PROMPT_FILE_PLACEHOLDER, &path),
                None,
                Some(file),
            )
        }
    };

    let mut tokens = tokens.into_iter();
    let program = tokens.next().ok_or_else(|| {
        CoderevError::ConfigValue(format!("agent `{}` has an empty cmd", spec.name))
    })?;
    Ok(Invocation {
        program,
        args: tokens.collect(),
        stdin,
        _prompt_file: prompt_file,
    })
}

impl AgentDispatcher {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn working_dir(&self, spec: &AgentSpec) -> PathBuf {
        match &spec.cwd {
            Some(cwd) => self.repo_root.join(cwd),
            None => self.repo_root.clone(),
        }
    }

    /// Run the agent on `prompt`, cancelling on Ctrl-C.
    ///
    /// # Errors
    ///
    /// See [`AgentDispatcher::dispatch_until`].
    pub async fn dispatch(
        &self,
        spec: &AgentSpec,
        prompt: &str,
    ) -> Result<AgentOutput, CoderevError> {
        self.dispatch_until(spec, prompt, interrupted()).await
    }

    /// Run the agent on `prompt` until it exits or `cancel` completes.
    ///
    /// On cancellation the child is killed and any prompt file is removed
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::AgentInvocation`] if the executable cannot be
    /// started, [`CoderevError::AgentFailure`] on a non-zero exit, and
    /// [`CoderevError::Cancelled`] if `cancel` fires first.
    pub async fn dispatch_until<F>(
        &self,
        spec: &AgentSpec,
        prompt: &str,
        cancel: F,
    ) -> Result<AgentOutput, CoderevError>
    where
        F: Future<Output = ()>,
    {
        spec.validate()?;
        let invocation = prepare(spec, prompt)?;
        let cwd = self.working_dir(spec);
        tracing::debug!(
            agent = %spec.name,
            mode = %spec.mode,
            program = %invocation.program,
            cwd = %cwd.display(),
            prompt_bytes = prompt.len(),
            "starting agent"
        );

        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&cwd)
            .envs(&spec.env)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| CoderevError::AgentInvocation {
            command: invocation.program.clone(),
            source,
        })?;

        if let (Some(payload), Some(mut stdin)) = (invocation.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    tracing::debug!("agent closed stdin early: {e}");
                }
            });
        }

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            () = cancel => {
                tracing::warn!("interrupted; stopping agent `{}`", spec.name);
                return Err(CoderevError::Cancelled);
            }
        };
        drop(invocation);

        if !output.status.success() {
            return Err(CoderevError::AgentFailure {
                name: spec.name.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(AgentOutput {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
            status: output.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(mode: AgentMode, cmd: &[&str]) -> AgentOverride {
        AgentOverride {
            name: Some("custom".into()),
            mode,
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn override_replaces_builtin() {
        let spec = AgentSpec::resolve(
            "codex",
            Some(&custom(AgentMode::Arg, &["tool", "--text", "{prompt}"])),
        )
        .unwrap();
        assert_eq!(spec.name, "custom");
        assert_eq!(spec.mode, AgentMode::Arg);
        assert_eq!(spec.cmd[0], "tool");
    }

    #[test]
    fn override_name_defaults_to_agent() {
        let mut agent = custom(AgentMode::Stdin, &["tool"]);
        agent.name = None;
        let spec = AgentSpec::resolve("copilot", Some(&agent)).unwrap();
        assert_eq!(spec.name, "copilot");
    }

    #[test]
    fn override_accepts_any_agent_name() {
        let mut agent = custom(AgentMode::Stdin, &["mycli", "review"]);
        agent.name = None;
        let spec = AgentSpec::resolve("mycli", Some(&agent)).unwrap();
        assert_eq!(spec.name, "mycli");
        assert_eq!(spec.cmd, vec!["mycli", "review"]);
    }

    #[test]
    fn unknown_builtin_is_rejected() {
        let err = AgentSpec::resolve("mycli", None).unwrap_err();
        assert!(matches!(err, CoderevError::ConfigValue(_)));
        assert_eq!(AgentSpec::resolve("copilot", None).unwrap().mode, AgentMode::File);
    }

    #[test]
    fn empty_cmd_is_rejected() {
        let err = AgentSpec::resolve("codex", Some(&custom(AgentMode::Stdin, &[]))).unwrap_err();
        assert!(matches!(err, CoderevError::ConfigValue(_)));
    }

    #[test]
    fn missing_placeholder_is_rejected() {
        let file_agent = custom(AgentMode::File, &["tool", "{prompt}"]);
        let err = AgentSpec::resolve("codex", Some(&file_agent)).unwrap_err();
        assert!(err.to_string().contains("{prompt_file}"));
        let arg_agent = custom(AgentMode::Arg, &["tool"]);
        assert!(AgentSpec::resolve("codex", Some(&arg_agent)).is_err());
    }

    #[test]
    fn arg_substitution_alters_only_placeholder_tokens() {
        let agent = custom(
            AgentMode::Arg,
            &["tool", "-p", "{prompt}", "{prompt_file}", "--x={prompt}!"],
        );
        let spec = AgentSpec::resolve("codex", Some(&agent)).unwrap();
        let invocation = prepare(&spec, "say {prompt} twice").unwrap();
        assert_eq!(invocation.program, "tool");
        assert_eq!(
            invocation.args,
            vec!["-p", "say {prompt} twice", "{prompt_file}", "--x=say {prompt} twice!"]
        );
        assert!(invocation.stdin.is_none());
    }

    #[test]
    fn file_mode_writes_prompt_and_cleans_up_on_drop() {
        let spec = AgentSpec::builtin(AgentKind::Copilot);
        let invocation = prepare(&spec, "the prompt").unwrap();
        let path = PathBuf::from(&invocation.args[1]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "the prompt");
        drop(invocation);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_executable_is_an_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = AgentDispatcher::new(dir.path());
        let spec = AgentSpec::resolve(
            "codex",
            Some(&custom(AgentMode::Stdin, &["coderev-no-such-agent-binary"])),
        )
        .unwrap();
        let err = dispatcher.dispatch(&spec, "hi").await.unwrap_err();
        assert!(matches!(err, CoderevError::AgentInvocation { .. }));
    }
}
