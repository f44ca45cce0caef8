//! Source-control operations for persisting automated fixes.
//!
//! Stage, commit, and push against a preconfigured working copy. A cycle
//! that produced no effective diff and a rejected push are both terminal
//! for the current cycle and surface as distinct errors.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("failed to execute git: {0}")]
    Execution(#[from] std::io::Error),
    #[error("invalid utf-8 in git output")]
    InvalidUtf8,
    #[error("nothing to commit: the fixes produced no effective diff")]
    NoChangesToCommit,
    #[error("push rejected by remote: {0}")]
    PushRejected(String),
}

pub type Result<T> = std::result::Result<T, GitError>;

fn run_git(repo: &Path, args: &[&str]) -> Result<std::process::Output> {
    Ok(Command::new("git").args(args).current_dir(repo).output()?)
}

/// Stage every change in the working tree.
pub fn stage_all(repo: &Path) -> Result<()> {
    let output = run_git(repo, &["add", "."])?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed(format!("git add .: {stderr}")));
    }
    Ok(())
}

/// Whether anything is staged for commit.
pub fn has_staged_changes(repo: &Path) -> Result<bool> {
    // Exit code 1 means the index differs from HEAD.
    let output = run_git(repo, &["diff", "--cached", "--quiet"])?;
    Ok(!output.status.success())
}

/// Commit the staged changes.
pub fn commit(repo: &Path, message: &str) -> Result<()> {
    let output = run_git(repo, &["commit", "-m", message])?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed(format!("git commit: {stderr}")));
    }
    Ok(())
}

/// Push HEAD to the remote branch.
pub fn push(repo: &Path, remote: &str, branch: &str) -> Result<()> {
    let refspec = format!("HEAD:{branch}");
    let output = run_git(repo, &["push", remote, &refspec])?;
    if !output.status.success() {
        let stderr =
            String::from_utf8(output.stderr).map_err(|_| GitError::InvalidUtf8)?;
        if stderr.contains("[rejected]")
            || stderr.contains("non-fast-forward")
            || stderr.contains("failed to push")
        {
            return Err(GitError::PushRejected(stderr.trim().to_string()));
        }
        return Err(GitError::CommandFailed(format!(
            "git push {remote} {refspec}: {stderr}"
        )));
    }
    Ok(())
}

/// Stage all changes, commit with a conventional prefix, and push.
///
/// `NoChangesToCommit` when the remediator produced no effective diff.
pub fn commit_fix(repo: &Path, remote: &str, branch: &str, description: &str) -> Result<()> {
    stage_all(repo)?;
    if !has_staged_changes(repo)? {
        return Err(GitError::NoChangesToCommit);
    }

    let message = format!("auto-fix: {description}");
    commit(repo, &message)?;
    push(repo, remote, branch)?;

    info!(%branch, "fix committed and pushed");
    Ok(())
}

/// Seam the orchestrator commits through, so cycle tests can observe
/// commits without a real repository.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn commit_fix(&self, description: &str) -> Result<()>;
}

/// The real working copy configured for the daemon.
#[derive(Debug, Clone)]
pub struct GitWorkingCopy {
    pub repo: PathBuf,
    pub remote: String,
    pub branch: String,
}

#[async_trait]
impl SourceControl for GitWorkingCopy {
    async fn commit_fix(&self, description: &str) -> Result<()> {
        commit_fix(&self.repo, &self.remote, &self.branch, description)
    }
}
