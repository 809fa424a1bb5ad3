//! Change detection against a reference commit.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::command::{Command, CommandRunner};

/// The CI definition directory; edits to it force a full rebuild.
pub const ALWAYS_WATCHED: &str = ".github/";

/// Decides whether any of a set of paths changed.
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    async fn has_changed(&self, paths: &[String]) -> bool;
}

/// Always answers the same way. Used for `--force` and workflow generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticChangeDetector {
    has_changed: bool,
}

impl StaticChangeDetector {
    pub fn always_changed() -> Self {
        Self { has_changed: true }
    }

    pub fn never_changed() -> Self {
        Self { has_changed: false }
    }
}

#[async_trait]
impl ChangeDetector for StaticChangeDetector {
    async fn has_changed(&self, _paths: &[String]) -> bool {
        self.has_changed
    }
}

/// Diffs `HEAD` against a previous commit with `git diff --quiet`.
pub struct GitChangeDetector {
    previous_sha: String,
    watched: Vec<String>,
    runner: Arc<dyn CommandRunner>,
}

impl GitChangeDetector {
    pub fn new(runner: Arc<dyn CommandRunner>, previous_sha: impl Into<String>) -> Self {
        Self {
            previous_sha: previous_sha.into(),
            watched: vec![ALWAYS_WATCHED.to_string()],
            runner,
        }
    }

    /// Resolve the previous commit as the parent of `HEAD`.
    pub async fn from_parent_commit(runner: Arc<dyn CommandRunner>) -> crate::Result<Self> {
        let previous_sha = runner
            .output(&Command::new("git", ["rev-list", "-n", "1", "HEAD~1"]))
            .await?;
        debug!(previous_sha = %previous_sha, "Resolved previous commit");
        Ok(Self::new(runner, previous_sha))
    }

    pub fn previous_sha(&self) -> &str {
        &self.previous_sha
    }

    async fn path_has_changed(&self, path: &str) -> bool {
        let diff = Command::new(
            "git",
            ["diff", "--quiet", "HEAD", self.previous_sha.as_str(), "--", path],
        );
        match self.runner.output(&diff).await {
            Ok(_) => false,
            Err(e) => {
                // Non-zero exit means a difference; any other failure is
                // treated the same way so a build is never skipped silently.
                debug!(path = %path, error = %e, "Path changed or diff failed");
                true
            }
        }
    }
}

#[async_trait]
impl ChangeDetector for GitChangeDetector {
    async fn has_changed(&self, paths: &[String]) -> bool {
        if self.previous_sha.is_empty() {
            warn!("No previous commit to compare against, treating as changed");
            return true;
        }
        for path in self.watched.iter().chain(paths) {
            if self.path_has_changed(path).await {
                return true;
            }
        }
        false
    }
}
