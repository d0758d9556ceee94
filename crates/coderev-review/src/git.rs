use std::path::{Path, PathBuf};
use std::process::Command;

use coderev_core::CoderevError;

/// Locate the working-tree root of the repository containing `start`.
///
/// Returns `None` outside a repository or for a bare repository.
pub fn discover_root(start: &Path) -> Option<PathBuf> {
    let repo = git2::Repository::discover(start).ok()?;
    repo.workdir().map(Path::to_path_buf)
}

/// Remote to fetch before diffing against `base_ref`, if it names one.
///
/// # Examples
///
/// ```
/// use coderev_review::git::remote_of;
///
/// assert_eq!(remote_of("origin/main"), Some("origin"));
/// assert_eq!(remote_of("upstream/release/1.0"), Some("upstream"));
/// assert_eq!(remote_of("main"), None);
/// assert_eq!(remote_of("fork/main"), None);
/// ```
pub fn remote_of(base_ref: &str) -> Option<&str> {
    ["origin", "upstream"].into_iter().find(|remote| {
        base_ref
            .strip_prefix(remote)
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Thin wrapper over the `git` executable, run at the repository root.
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run(&self, args: &[&str]) -> Result<String, String> {
        tracing::debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .map_err(|e| format!("failed to run git: {e}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Fetch the remote named by `base_ref` (`origin/...`, `upstream/...`).
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::DiffUnavailable`] if the fetch fails.
    pub fn fetch(&self, base_ref: &str) -> Result<(), CoderevError> {
        let Some(remote) = remote_of(base_ref) else {
            return Ok(());
        };
        self.run(&["fetch", "--prune", remote])
            .map(drop)
            .map_err(CoderevError::DiffUnavailable)
    }

    /// Check out `branch`, creating it from `origin/<branch>` if it only exists remotely.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::DiffUnavailable`] if neither works.
    pub fn checkout(&self, branch: &str) -> Result<(), CoderevError> {
        if self.run(&["rev-parse", "--verify", "--quiet", branch]).is_ok() {
            return self
                .run(&["checkout", branch])
                .map(drop)
                .map_err(CoderevError::DiffUnavailable);
        }
        let remote = format!("origin/{branch}");
        self.run(&["checkout", "-B", branch, &remote])
            .map(drop)
            .map_err(|e| {
                CoderevError::DiffUnavailable(format!("could not check out branch '{branch}': {e}"))
            })
    }

    /// Unified diff of `head` against its merge base with `base`.
    ///
    /// # Errors
    ///
    /// Returns [`CoderevError::DiffUnavailable`] if either reference cannot be resolved.
    pub fn diff(&self, base: &str, head: &str) -> Result<String, CoderevError> {
        let range = format!("{base}...{head}");
        self.run(&["diff", "--no-color", "--no-ext-diff", &range])
            .map_err(CoderevError::DiffUnavailable)
    }
}
