#![cfg(unix)]

use std::path::Path;
use std::process::{Command, Output};

const CAT_AGENT: &str = r#"{"name":"cat","mode":"stdin","cmd":["cat"]}"#;

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(["-c", "user.name=coderev", "-c", "user.email=coderev@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A repository with `main` checked out and one commit on `feature`.
fn repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    git(root, &["init", "-q"]);
    git(root, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/lib.rs"), "pub fn one() -> u32 {\n    1\n}\n").unwrap();
    git(root, &["add", "."]);
    git(root, &["commit", "-q", "-m", "initial"]);

    git(root, &["checkout", "-q", "-b", "feature"]);
    std::fs::write(
        root.join("src/lib.rs"),
        "pub fn one() -> u32 {\n    1\n}\n\npub fn two() -> u32 {\n    2\n}\n",
    )
    .unwrap();
    git(root, &["commit", "-q", "-am", "add two"]);
    git(root, &["checkout", "-q", "main"]);
    dir
}

fn coderev(dir: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_coderev"));
    for (name, _) in std::env::vars().filter(|(k, _)| k.starts_with("CODEREV_")) {
        cmd.env_remove(name);
    }
    cmd.args(args).current_dir(dir).output().unwrap()
}

#[test]
fn reviews_branch_with_stdin_agent() {
    let dir = repo();
    let output = coderev(
        dir.path(),
        &[
            "feature",
            "--base-ref",
            "main",
            "--no-config",
            "--agent-config",
            CAT_AGENT,
            "--out",
            "reviews/feature.md",
        ],
    );
    assert!(
        output.status.success(),
        "coderev failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("# Task: Automated PR Review"));
    assert!(stdout.contains("Branch under review: feature"));
    assert!(stdout.contains("Diff base: main"));
    assert!(stdout.contains("### src/lib.rs (modified)"));
    assert!(stdout.contains("| pub fn two() -> u32 {"));

    let written = std::fs::read_to_string(dir.path().join("reviews/feature.md")).unwrap();
    assert_eq!(written, stdout);
}

#[test]
fn config_file_supplies_defaults() {
    let dir = repo();
    std::fs::write(dir.path().join("RULES.md"), "No panics in library code.\n").unwrap();
    let config =
        format!(r#"{{"base-ref": "main", "obey-doc": "RULES.md", "agent-config": {CAT_AGENT}}}"#);
    std::fs::write(dir.path().join(".coderev.json"), config).unwrap();

    let output = coderev(dir.path(), &["feature"]);
    assert!(
        output.status.success(),
        "coderev failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("## Documentation to OBEY (highest priority)"));
    assert!(stdout.contains("No panics in library code."));
}

#[test]
fn failing_agent_exits_nonzero() {
    let dir = repo();
    let agent = r#"{"name":"boom","mode":"stdin","cmd":["sh","-c","cat >/dev/null; exit 4"]}"#;
    let output = coderev(
        dir.path(),
        &["feature", "--base-ref", "main", "--no-config", "--agent-config", agent],
    );
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn negative_context_lines_rejected() {
    let dir = repo();
    let output = coderev(
        dir.path(),
        &[
            "feature",
            "--base-ref",
            "main",
            "--no-config",
            "--agent-config",
            CAT_AGENT,
            "--context-lines",
            "-1",
        ],
    );
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_explicit_config_is_fatal() {
    let dir = repo();
    let output = coderev(
        dir.path(),
        &["feature", "--base-ref", "main", "--config", "nope.json", "--agent-config", CAT_AGENT],
    );
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn unknown_ref_is_diff_unavailable() {
    let dir = repo();
    let output = coderev(
        dir.path(),
        &["feature", "--base-ref", "no-such-ref", "--no-config", "--agent-config", CAT_AGENT],
    );
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn custom_agent_name_with_shell_style_cmd() {
    let dir = repo();
    let output = coderev(
        dir.path(),
        &[
            "feature",
            "--base-ref",
            "main",
            "--no-config",
            "--agent",
            "mycli",
            "--agent-config",
            r#"{"mode":"stdin","cmd":"sh -c 'cat'"}"#,
        ],
    );
    assert!(
        output.status.success(),
        "coderev failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("### src/lib.rs (modified)"));
}
