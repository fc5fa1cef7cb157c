//! Thin wrappers around the `git` CLI used by both change sources.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, FixedOffset};

use crate::error::{AutobuildError, Result};

/// Object id of the empty tree, used as diff base for root commits.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

fn git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| AutobuildError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AutobuildError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Canonical top-level directory of the work tree containing `repo`.
pub fn toplevel(repo: &Path) -> Result<PathBuf> {
    let out = git(repo, &["rev-parse", "--show-toplevel"])?;
    let top = PathBuf::from(out.trim());
    Ok(std::fs::canonicalize(&top).unwrap_or(top))
}

/// Resolve a revision expression to a full commit id.
pub fn resolve_commit(repo: &Path, rev: &str) -> Result<String> {
    let spec = format!("{rev}^{{commit}}");
    let sha = git(repo, &["rev-parse", "--verify", "--quiet", &spec])
        .map_err(|_| AutobuildError::Git(format!("unknown revision: {rev}")))?;
    Ok(sha.trim().to_string())
}

/// Parent commit ids of `commit` (empty for a root commit).
pub fn parents(repo: &Path, commit: &str) -> Result<Vec<String>> {
    let out = git(repo, &["rev-list", "--parents", "-n", "1", commit])?;
    Ok(out.split_whitespace().skip(1).map(str::to_string).collect())
}

/// Committer date of `commit`.
pub fn commit_time(repo: &Path, commit: &str) -> Result<DateTime<FixedOffset>> {
    let out = git(repo, &["log", "-1", "--format=%cI", commit])?;
    DateTime::parse_from_rfc3339(out.trim())
        .map_err(|e| AutobuildError::Git(format!("unparseable commit date for {commit}: {e}")))
}

/// Fail if `base` was committed after `head`.
pub fn ensure_ordered(repo: &Path, base: &str, head: &str) -> Result<()> {
    let base_time = commit_time(repo, base)?;
    let head_time = commit_time(repo, head)?;
    if base_time > head_time {
        return Err(AutobuildError::Config(format!(
            "revision range is inverted: {base} ({base_time}) is newer than {head} ({head_time})"
        )));
    }
    Ok(())
}

/// Paths added, modified or renamed between two trees, relative to the
/// repository top level. Renames report the destination path.
pub fn changed_paths(repo: &Path, base: &str, head: &str) -> Result<Vec<PathBuf>> {
    let out = git(
        repo,
        &[
            "diff",
            "--name-status",
            "-z",
            "-M",
            "--diff-filter=AMR",
            base,
            head,
        ],
    )?;
    Ok(parse_name_status(&out))
}

/// Parse NUL separated `git diff --name-status -z` output.
fn parse_name_status(out: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut fields = out.split('\0').filter(|f| !f.is_empty());

    while let Some(status) = fields.next() {
        let Some(path) = fields.next() else { break };
        if status.starts_with('R') || status.starts_with('C') {
            // Two paths follow: source then destination.
            if let Some(dest) = fields.next() {
                paths.push(PathBuf::from(dest));
            }
        } else {
            paths.push(PathBuf::from(path));
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_status_modified_and_added() {
        let out = "M\0app/nginx.1.2.recipe\0A\0tools/new.1.0.recipe\0";
        assert_eq!(
            parse_name_status(out),
            vec![
                PathBuf::from("app/nginx.1.2.recipe"),
                PathBuf::from("tools/new.1.0.recipe")
            ]
        );
    }

    #[test]
    fn test_parse_name_status_rename_reports_destination() {
        let out = "R100\0app/old.1.0.recipe\0app/new.1.0.recipe\0M\0README.md\0";
        assert_eq!(
            parse_name_status(out),
            vec![PathBuf::from("app/new.1.0.recipe"), PathBuf::from("README.md")]
        );
    }

    #[test]
    fn test_parse_name_status_empty() {
        assert!(parse_name_status("").is_empty());
    }
}
