//! Version-control adapter seam
//!
//! The engine treats revisions as opaque tokens: a checkpoint may capture
//! the current head revision at creation time, and a restore may check it
//! out again. The adapter is an external collaborator behind a trait;
//! failures here are non-critical and degrade to `None` instead of
//! affecting checkpoint correctness.

use std::path::PathBuf;
use std::process::Command;
use taskforge_core::{Error, Result};
use tracing::debug;

/// External version-control collaborator
pub trait VcsAdapter: Send + Sync {
    /// Current head revision, if one can be determined
    fn head_revision(&self) -> Option<String>;

    /// Check out the given revision
    fn checkout(&self, revision: &str) -> Result<()>;
}

/// Git adapter shelling out to the `git` binary
#[derive(Debug, Clone)]
pub struct GitVcs {
    repo_dir: PathBuf,
}

impl GitVcs {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

impl VcsAdapter for GitVcs {
    fn head_revision(&self) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(["rev-parse", "HEAD"])
            .output()
            .ok()?;
        if !output.status.success() {
            debug!(
                "git rev-parse failed in {}: {}",
                self.repo_dir.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        let revision = String::from_utf8(output.stdout).ok()?.trim().to_string();
        if revision.is_empty() {
            None
        } else {
            Some(revision)
        }
    }

    fn checkout(&self, revision: &str) -> Result<()> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(["checkout", revision])
            .output()
            .map_err(|e| Error::execution(format!("failed to spawn git: {}", e)))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::execution(format!(
                "git checkout {} failed: {}",
                revision,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_revision_degrades_to_none() {
        let vcs = GitVcs::new("/nonexistent/not-a-repo");
        assert!(vcs.head_revision().is_none());
    }

    #[test]
    fn test_checkout_outside_a_repo_fails() {
        let vcs = GitVcs::new("/nonexistent/not-a-repo");
        assert!(vcs.checkout("deadbeef").is_err());
    }
}
