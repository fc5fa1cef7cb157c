//! Local change source: a revision range in a git checkout.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::git;
use crate::error::Result;

/// Files changed between two revisions of a local repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDiff {
    /// Any directory inside the work tree.
    pub repo: PathBuf,

    /// Older revision.
    pub base: String,

    /// Newer revision.
    pub head: String,
}

impl LocalDiff {
    pub fn new(repo: impl Into<PathBuf>, base: &str, head: &str) -> Self {
        Self {
            repo: repo.into(),
            base: base.to_string(),
            head: head.to_string(),
        }
    }

    /// Absolute paths added, modified or renamed between `base` and `head`.
    pub fn changed_paths(&self) -> Result<Vec<PathBuf>> {
        let top = git::toplevel(&self.repo)?;
        let base = git::resolve_commit(&top, &self.base)?;
        let head = git::resolve_commit(&top, &self.head)?;
        git::ensure_ordered(&top, &base, &head)?;

        info!(base = %base, head = %head, "Diffing local revisions");

        Ok(git::changed_paths(&top, &base, &head)?
            .into_iter()
            .map(|rel| top.join(rel))
            .collect())
    }
}
