use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoderevError;
use crate::types::{AgentKind, AgentMode};

/// Prefix shared by every environment override (`CODEREV_BASE_REF`, ...).
pub const ENV_PREFIX: &str = "CODEREV_";

/// File names probed in the current directory and at the repository root.
pub const CONFIG_FILE_NAMES: [&str; 2] = [".coderev.json", "coderev.json"];

/// Effective configuration for one review run.
///
/// Built by [`Config::resolve`] from four layers with the precedence
/// command line > environment > config file > built-in default. The one
/// exception is `obey-doc`, which accumulates: config-file entries first,
/// then command-line entries in the order given.
///
/// # Examples
///
/// ```
/// use coderev_core::Config;
///
/// let config = Config::default();
/// assert_eq!(config.base_ref, "origin/main");
/// assert_eq!(config.agent, "codex");
/// assert_eq!(config.context_lines, 20);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Reference the branch is compared against.
    pub base_ref: String,
    /// Reference holding the changes under review.
    pub head_ref: String,
    /// Documents the review must obey, in prompt order.
    pub obey_docs: Vec<PathBuf>,
    /// Output template the agent fills in.
    pub template: Option<PathBuf>,
    /// Append the full post-change contents of every diffed file.
    pub include_full_files: bool,
    /// Agent name. Must be a built-in preset unless `agent_config` is set,
    /// in which case it is only the default display name.
    pub agent: String,
    /// Custom agent definition; replaces the preset when present.
    pub agent_config: Option<AgentOverride>,
    /// Unchanged lines shown around each changed region.
    pub context_lines: usize,
    /// Size ceilings for the prompt sections.
    pub limits: Limits,
    /// Where to persist the agent's output, besides stdout.
    pub out: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_ref: default_base_ref(),
            head_ref: default_head_ref(),
            obey_docs: Vec::new(),
            template: None,
            include_full_files: false,
            agent: AgentKind::default().to_string(),
            agent_config: None,
            context_lines: DEFAULT_CONTEXT_LINES,
            limits: Limits::default(),
            out: None,
        }
    }
}

fn default_base_ref() -> String {
    "origin/main".into()
}

fn default_head_ref() -> String {
    "HEAD".into()
}

const DEFAULT_CONTEXT_LINES: usize = 20;

/// Independent size budgets applied while assembling the prompt.
///
/// # Examples
///
/// ```
/// use coderev_core::Limits;
///
/// let limits = Limits::default();
/// assert_eq!(limits.max_diff_bytes, 600_000);
/// assert_eq!(limits.snippet_max_chars, 25_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Ceiling for the whole diff section, in bytes.
    pub max_diff_bytes: usize,
    /// Ceiling per obey-doc or template, in bytes.
    pub max_doc_bytes: usize,
    /// Ceiling per full-file inclusion, in bytes.
    pub max_file_bytes: usize,
    /// Ceiling per file snippet, in characters.
    pub snippet_max_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_diff_bytes: 600_000,
            max_doc_bytes: 200_000,
            max_file_bytes: 200_000,
            snippet_max_chars: 25_000,
        }
    }
}

/// A user-defined agent, from `agent-config`.
///
/// Accepted as inline JSON (command line, environment) or as a nested
/// object in the config file.
///
/// # Examples
///
/// ```
/// use coderev_core::{AgentMode, AgentOverride};
///
/// let agent = AgentOverride::from_json(
///     r#"{"name":"mycli","mode":"file","cmd":["mycli","review","--in","{prompt_file}"]}"#,
/// )
/// .unwrap();
/// assert_eq!(agent.mode, AgentMode::File);
/// assert_eq!(agent.cmd[0], "mycli");
///
/// // A single string is split like a shell command line.
/// let agent = AgentOverride::from_json(
///     r#"{"name":"mycli","mode":"file","cmd":"mycli review --in {prompt_file}"}"#,
/// )
/// .unwrap();
/// assert_eq!(agent.cmd, vec!["mycli", "review", "--in", "{prompt_file}"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOverride {
    /// Display name; defaults to the `agent` option.
    #[serde(default)]
    pub name: Option<String>,
    /// How the prompt reaches the process (default: `stdin`).
    #[serde(default)]
    pub mode: AgentMode,
    /// Executable followed by its arguments; may contain `{prompt}` or `{prompt_file}`.
    /// Accepts a JSON array or one shell-quoted string.
    #[serde(deserialize_with = "command_line")]
    pub cmd: Vec<String>,
    /// Working directory, relative to the repository root.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the agent process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Argv(Vec<String>),
    Line(String),
}

fn command_line<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match CommandLine::deserialize(deserializer)? {
        CommandLine::Argv(argv) => Ok(argv),
        CommandLine::Line(line) => shlex::split(&line).ok_or_else(|| {
            serde::de::Error::custom(format!("cmd is not a valid command line: {line}"))
        }),
    }
}

impl AgentOverride {
    /// Parse an inline JSON agent definition.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::ConfigValue`] if the JSON is malformed or
    /// does not match the agent-config schema.
    pub fn from_json(content: &str) -> Result<Self, CoderevError> {
        serde_json::from_str(content)
            .map_err(|e| CoderevError::ConfigValue(format!("agent-config: {e}")))
    }

    fn from_value(value: serde_json::Value) -> Result<Option<Self>, CoderevError> {
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
            serde_json::Value::String(s) => Self::from_json(&s).map(Some),
            obj @ serde_json::Value::Object(_) => serde_json::from_value(obj)
                .map(Some)
                .map_err(|e| CoderevError::ConfigValue(format!("agent-config: {e}"))),
            other => Err(CoderevError::ConfigValue(format!(
                "agent-config must be a JSON object or a JSON string, got {other}"
            ))),
        }
    }
}

/// Which configuration source supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A command-line flag.
    CommandLine,
    /// A `CODEREV_*` environment variable.
    Environment,
    /// The loaded config file.
    ConfigFile,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::CommandLine => write!(f, "command line"),
            Origin::Environment => write!(f, "environment"),
            Origin::ConfigFile => write!(f, "config file"),
        }
    }
}

/// One source's partial view of the options. Unset fields fall through
/// to the next source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigLayer {
    pub base_ref: Option<String>,
    pub head_ref: Option<String>,
    pub obey_doc: Option<Vec<PathBuf>>,
    pub template: Option<String>,
    pub include_full_files: Option<bool>,
    pub agent: Option<String>,
    /// Raw `agent-config`: a JSON string or an object.
    pub agent_config: Option<serde_json::Value>,
    pub context_lines: Option<i64>,
    pub max_diff_bytes: Option<i64>,
    pub max_doc_bytes: Option<i64>,
    pub max_file_bytes: Option<i64>,
    pub snippet_max_chars: Option<i64>,
    pub out: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FileConfig {
    base_ref: Option<String>,
    head_ref: Option<String>,
    obey_doc: Option<OneOrMany>,
    template: Option<String>,
    include_full_files: Option<bool>,
    agent: Option<String>,
    agent_config: Option<serde_json::Value>,
    context_lines: Option<i64>,
    max_diff_bytes: Option<i64>,
    max_doc_bytes: Option<i64>,
    max_file_bytes: Option<i64>,
    snippet_max_chars: Option<i64>,
    out: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_paths(self) -> Vec<PathBuf> {
        match self {
            OneOrMany::One(s) => vec![PathBuf::from(s)],
            OneOrMany::Many(v) => v.into_iter().map(PathBuf::from).collect(),
        }
    }
}

impl ConfigLayer {
    /// Parse a config-file body. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `content` is not a JSON
    /// object or a known key has the wrong type.
    ///
    /// # Examples
    ///
    /// ```
    /// use coderev_core::ConfigLayer;
    ///
    /// let layer =
    ///     ConfigLayer::from_json(r#"{"base-ref": "upstream/dev", "colour": "blue"}"#).unwrap();
    /// assert_eq!(layer.base_ref.as_deref(), Some("upstream/dev"));
    /// assert!(ConfigLayer::from_json("[1, 2]").is_err());
    /// ```
    pub fn from_json(content: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        if !value.is_object() {
            return Err("top-level value must be a JSON object".into());
        }
        let file: FileConfig = serde_json::from_value(value).map_err(|e| e.to_string())?;
        Ok(Self {
            base_ref: file.base_ref,
            head_ref: file.head_ref,
            obey_doc: file.obey_doc.map(OneOrMany::into_paths),
            template: file.template,
            include_full_files: file.include_full_files,
            agent: file.agent,
            agent_config: file.agent_config,
            context_lines: file.context_lines,
            max_diff_bytes: file.max_diff_bytes,
            max_doc_bytes: file.max_doc_bytes,
            max_file_bytes: file.max_file_bytes,
            snippet_max_chars: file.snippet_max_chars,
            out: file.out,
        })
    }

    /// Build the environment layer from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::ConfigValue`] if a numeric variable is not an integer.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use coderev_core::ConfigLayer;
    ///
    /// let vars = HashMap::from([("CODEREV_CONTEXT_LINES".to_string(), "5".to_string())]);
    /// let layer = ConfigLayer::from_env(|k| vars.get(k).cloned()).unwrap();
    /// assert_eq!(layer.context_lines, Some(5));
    /// ```
    pub fn from_env<F>(lookup: F) -> Result<Self, CoderevError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let int = |name: &str| -> Result<Option<i64>, CoderevError> {
            match var(name) {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
                    CoderevError::ConfigValue(format!(
                        "{ENV_PREFIX}{name} must be an integer, got '{raw}'"
                    ))
                }),
            }
        };

        Ok(Self {
            base_ref: var("BASE_REF"),
            template: var("TEMPLATE"),
            agent: var("AGENT"),
            agent_config: var("AGENT_CONFIG").map(serde_json::Value::String),
            context_lines: int("CONTEXT_LINES")?,
            max_diff_bytes: int("MAX_DIFF_BYTES")?,
            max_doc_bytes: int("MAX_DOC_BYTES")?,
            max_file_bytes: int("MAX_FILE_BYTES")?,
            snippet_max_chars: int("SNIPPET_MAX_CHARS")?,
            out: var("OUT"),
            ..Self::default()
        })
    }

    /// Build the environment layer from a snapshot of variables.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigLayer::from_env`].
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, CoderevError> {
        Self::from_env(|k| vars.get(k).cloned())
    }
}

/// Where the file layer comes from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// `--no-config`: file-based configuration is off.
    Disabled,
    /// `--config PATH`: this file must load.
    Explicit(PathBuf),
    /// Probe the standard locations; first loadable file wins.
    Search(SearchPaths),
}

impl ConfigSource {
    /// An explicit config path, resolved against `base` when relative.
    pub fn explicit(path: &Path, base: &Path) -> Self {
        if path.is_absolute() {
            ConfigSource::Explicit(path.to_path_buf())
        } else {
            ConfigSource::Explicit(base.join(path))
        }
    }
}

/// Locations probed for a config file when none is named.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    /// Current working directory.
    pub cwd: PathBuf,
    /// Repository root, if inside a repository.
    pub repo_root: Option<PathBuf>,
    /// User-level config file (`~/.config/coderev/config.json` and friends).
    pub user_file: Option<PathBuf>,
}

impl SearchPaths {
    /// Standard search locations for `cwd` and an optional repository root.
    pub fn new(cwd: PathBuf, repo_root: Option<PathBuf>) -> Self {
        Self {
            cwd,
            repo_root,
            user_file: user_config_file(),
        }
    }

    /// Candidate files in search order.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use coderev_core::SearchPaths;
    ///
    /// let paths = SearchPaths {
    ///     cwd: PathBuf::from("/repo/sub"),
    ///     repo_root: Some(PathBuf::from("/repo")),
    ///     user_file: None,
    /// };
    /// let found = paths.candidates();
    /// assert_eq!(found[0], PathBuf::from("/repo/sub/.coderev.json"));
    /// assert_eq!(found[3], PathBuf::from("/repo/coderev.json"));
    /// ```
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = CONFIG_FILE_NAMES.iter().map(|n| self.cwd.join(n)).collect();
        if let Some(root) = &self.repo_root {
            if root != &self.cwd {
                paths.extend(CONFIG_FILE_NAMES.iter().map(|n| root.join(n)));
            }
        }
        if let Some(user) = &self.user_file {
            paths.push(user.clone());
        }
        paths
    }
}

fn user_config_file() -> Option<PathBuf> {
    let dir = if cfg!(windows) {
        dirs::config_dir()
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
    };
    dir.map(|d| d.join("coderev").join("config.json"))
}

/// Load the file layer from `source`.
///
/// Returns the layer together with the file it came from, if any.
///
/// # Errors
///
/// Returns [`CoderevError::ConfigParse`] if an explicit file is unreadable
/// or invalid. Searched files that fail are logged and skipped.
pub fn load_file_layer(
    source: &ConfigSource,
) -> Result<(ConfigLayer, Option<PathBuf>), CoderevError> {
    match source {
        ConfigSource::Disabled => Ok((ConfigLayer::default(), None)),
        ConfigSource::Explicit(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| CoderevError::ConfigParse {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let layer = ConfigLayer::from_json(&content).map_err(|reason| {
                CoderevError::ConfigParse {
                    path: path.clone(),
                    reason,
                }
            })?;
            tracing::debug!("loaded config from {}", path.display());
            Ok((layer, Some(path.clone())))
        }
        ConfigSource::Search(paths) => {
            for candidate in paths.candidates() {
                if !candidate.is_file() {
                    continue;
                }
                let loaded = std::fs::read_to_string(&candidate)
                    .map_err(|e| e.to_string())
                    .and_then(|c| ConfigLayer::from_json(&c));
                match loaded {
                    Ok(layer) => {
                        tracing::debug!("loaded config from {}", candidate.display());
                        return Ok((layer, Some(candidate)));
                    }
                    Err(reason) => {
                        tracing::warn!("ignoring config file {}: {reason}", candidate.display());
                    }
                }
            }
            Ok((ConfigLayer::default(), None))
        }
    }
}

/// Highest-precedence value wins; lower layers are ignored entirely.
fn overlay<T>(cli: Option<T>, env: Option<T>, file: Option<T>) -> Option<(T, Origin)> {
    cli.map(|v| (v, Origin::CommandLine))
        .or_else(|| env.map(|v| (v, Origin::Environment)))
        .or_else(|| file.map(|v| (v, Origin::ConfigFile)))
}

/// Lower layers first, higher layers appended; nothing is deduplicated.
fn accumulate<T>(file: Option<Vec<T>>, env: Option<Vec<T>>, cli: Option<Vec<T>>) -> Vec<T> {
    [file, env, cli].into_iter().flatten().flatten().collect()
}

fn non_negative(
    name: &str,
    value: Option<(i64, Origin)>,
    default: usize,
) -> Result<usize, CoderevError> {
    match value {
        None => Ok(default),
        Some((v, origin)) => usize::try_from(v).map_err(|_| {
            CoderevError::ConfigValue(format!(
                "{name} must be a non-negative integer, got {v} (from {origin})"
            ))
        }),
    }
}

fn positive(
    name: &str,
    value: Option<(i64, Origin)>,
    default: usize,
) -> Result<usize, CoderevError> {
    match value {
        Some((v, origin)) if v < 1 => Err(CoderevError::ConfigValue(format!(
            "{name} must be at least 1, got {v} (from {origin})"
        ))),
        other => non_negative(name, other, default),
    }
}

fn optional_path(value: Option<(String, Origin)>) -> Option<PathBuf> {
    value
        .map(|(v, _)| v)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

impl Config {
    /// Load the file layer from `source` and merge it with the command-line
    /// and environment layers.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::ConfigParse`] for an invalid explicit config
    /// file and [`CoderevError::ConfigValue`] for malformed values.
    pub fn resolve(
        cli: ConfigLayer,
        env: ConfigLayer,
        source: &ConfigSource,
    ) -> Result<Self, CoderevError> {
        let (file, _) = load_file_layer(source)?;
        Self::merge(cli, env, file)
    }

    /// Merge three layers over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::ConfigValue`] for out-of-range numbers, an
    /// unknown agent name, or malformed `agent-config`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use coderev_core::{Config, ConfigLayer};
    ///
    /// let file = ConfigLayer {
    ///     obey_doc: Some(vec![PathBuf::from("A.md"), PathBuf::from("B.md")]),
    ///     context_lines: Some(8),
    ///     ..ConfigLayer::default()
    /// };
    /// let cli = ConfigLayer {
    ///     obey_doc: Some(vec![PathBuf::from("C.md")]),
    ///     ..ConfigLayer::default()
    /// };
    /// let config = Config::merge(cli, ConfigLayer::default(), file).unwrap();
    /// let expected: Vec<PathBuf> = ["A.md", "B.md", "C.md"].iter().map(PathBuf::from).collect();
    /// assert_eq!(config.obey_docs, expected);
    /// assert_eq!(config.context_lines, 8);
    /// ```
    pub fn merge(
        cli: ConfigLayer,
        env: ConfigLayer,
        file: ConfigLayer,
    ) -> Result<Self, CoderevError> {
        let defaults = Limits::default();

        let agent_config = match overlay(cli.agent_config, env.agent_config, file.agent_config) {
            None => None,
            Some((value, _)) => AgentOverride::from_value(value)?,
        };

        let agent = match overlay(cli.agent, env.agent, file.agent) {
            None => AgentKind::default().to_string(),
            Some((name, _)) if agent_config.is_some() => name,
            Some((name, origin)) => name
                .parse::<AgentKind>()
                .map(|kind| kind.to_string())
                .map_err(|e| CoderevError::ConfigValue(format!("{e} (from {origin})")))?,
        };

        let limits = Limits {
            max_diff_bytes: positive(
                "max-diff-bytes",
                overlay(cli.max_diff_bytes, env.max_diff_bytes, file.max_diff_bytes),
                defaults.max_diff_bytes,
            )?,
            max_doc_bytes: positive(
                "max-doc-bytes",
                overlay(cli.max_doc_bytes, env.max_doc_bytes, file.max_doc_bytes),
                defaults.max_doc_bytes,
            )?,
            max_file_bytes: positive(
                "max-file-bytes",
                overlay(cli.max_file_bytes, env.max_file_bytes, file.max_file_bytes),
                defaults.max_file_bytes,
            )?,
            snippet_max_chars: positive(
                "snippet-max-chars",
                overlay(cli.snippet_max_chars, env.snippet_max_chars, file.snippet_max_chars),
                defaults.snippet_max_chars,
            )?,
        };

        Ok(Self {
            base_ref: overlay(cli.base_ref, env.base_ref, file.base_ref)
                .map_or_else(default_base_ref, |(v, _)| v),
            head_ref: overlay(cli.head_ref, env.head_ref, file.head_ref)
                .map_or_else(default_head_ref, |(v, _)| v),
            obey_docs: accumulate(file.obey_doc, env.obey_doc, cli.obey_doc),
            template: optional_path(overlay(cli.template, env.template, file.template)),
            include_full_files: overlay(
                cli.include_full_files,
                env.include_full_files,
                file.include_full_files,
            )
            .is_some_and(|(v, _)| v),
            agent,
            agent_config,
            context_lines: non_negative(
                "context-lines",
                overlay(cli.context_lines, env.context_lines, file.context_lines),
                DEFAULT_CONTEXT_LINES,
            )?,
            limits,
            out: optional_path(overlay(cli.out, env.out, file.out)),
        })
    }
}
