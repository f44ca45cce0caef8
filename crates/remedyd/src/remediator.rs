//! Automated source-code fixes.
//!
//! One fix per classified issue: read the affected file (or the project
//! manifest), ask the model for a corrected version constrained to the
//! issue, and overwrite the file in place. Overwriting is deliberate and
//! irreversible here; version control is the safety net.
//!
//! A failed fix is reported per issue, never raised, so sibling issues in
//! the same analysis must still be attempted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use std::sync::Arc;

use remedy_core::config::Config;
use remedy_core::decode;
use remedy_core::prompt;
use remedy_core::types::{AnalysisResult, FixOutcome, Issue, IssueKind};
use tracing::{info, warn};

use crate::model::{ModelClient, ModelError};

/// Code remediator over a model capability and one working copy.
pub struct Remediator<M: ModelClient> {
    model: Arc<M>,
    project_root: PathBuf,
    manifest_file: String,
    /// Retries for a transient model failure within one fix.
    max_retries: u32,
    retry_backoff: Duration,
}

impl<M: ModelClient> Remediator<M> {
    pub fn new(model: Arc<M>, config: &Config) -> Self {
        Self {
            model,
            project_root: config.repo_path.clone(),
            manifest_file: config.manifest_file.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_secs(config.fix_retry_backoff_sec),
        }
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Attempt every issue in the analysis, in order.
    pub async fn apply_all(&self, analysis: &AnalysisResult) -> Vec<FixOutcome> {
        let mut outcomes = Vec::with_capacity(analysis.issues.len());
        for issue in &analysis.issues {
            let outcome = self.remediate(issue).await;
            if outcome.success {
                info!(file = %outcome.file, "fix applied");
            } else {
                warn!(file = %outcome.file, reason = %outcome.message, "fix failed");
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Attempt to fix a single issue.
    pub async fn remediate(&self, issue: &Issue) -> FixOutcome {
        match issue.kind {
            IssueKind::SyntaxError => {
                self.rewrite_source(issue, prompt::source_fix_prompt).await
            }
            IssueKind::ModuleResolutionError => {
                self.rewrite_source(issue, prompt::import_fix_prompt).await
            }
            IssueKind::ConfigurationError => {
                self.rewrite_source(issue, prompt::config_fix_prompt).await
            }
            IssueKind::DependencyError => self.rewrite_manifest(issue).await,
            IssueKind::Other => FixOutcome::failed(
                issue.file.clone(),
                "no automated fix for this issue kind",
            ),
        }
    }

    /// Resolve an issue path against the project root.
    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Read-prompt-write flow for a source or configuration file.
    async fn rewrite_source(
        &self,
        issue: &Issue,
        build_prompt: fn(&Issue, &str) -> String,
    ) -> FixOutcome {
        let path = self.resolve(&issue.file);
        // Missing files fail fast; a fix must never create a file the
        // build did not reference.
        if !path.is_file() {
            return FixOutcome::failed(
                issue.file.clone(),
                format!("file not found: {}", path.display()),
            );
        }

        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                return FixOutcome::failed(issue.file.clone(), format!("read failed: {err}"))
            }
        };

        let reply = match self.invoke_with_retry(&build_prompt(issue, &source)).await {
            Ok(reply) => reply,
            Err(err) => {
                return FixOutcome::failed(issue.file.clone(), format!("model call failed: {err}"))
            }
        };

        let corrected = decode::clean_text(&reply);
        if corrected.is_empty() {
            return FixOutcome::failed(issue.file.clone(), "model returned an empty file");
        }

        if let Err(err) = std::fs::write(&path, corrected) {
            return FixOutcome::failed(issue.file.clone(), format!("write failed: {err}"));
        }

        FixOutcome::applied(issue.file.clone(), "rewrote file with corrected source")
    }

    /// Dependency issues operate on the project manifest instead of a
    /// source file, and the model's output must itself parse before it
    /// is allowed to replace the manifest.
    async fn rewrite_manifest(&self, issue: &Issue) -> FixOutcome {
        let file = if issue.file.is_empty() {
            self.manifest_file.clone()
        } else {
            issue.file.clone()
        };
        let path = self.resolve(&file);
        if !path.is_file() {
            return FixOutcome::failed(file, format!("manifest not found: {}", path.display()));
        }

        let manifest = match std::fs::read_to_string(&path) {
            Ok(manifest) => manifest,
            Err(err) => return FixOutcome::failed(file, format!("read failed: {err}")),
        };

        let reply = match self
            .invoke_with_retry(&prompt::manifest_fix_prompt(issue, &manifest))
            .await
        {
            Ok(reply) => reply,
            Err(err) => return FixOutcome::failed(file, format!("model call failed: {err}")),
        };

        let corrected = decode::clean_text(&reply);
        if let Err(err) = serde_json::from_str::<serde_json::Value>(&corrected) {
            return FixOutcome::failed(
                file,
                format!("corrected manifest is not well-formed: {err}"),
            );
        }

        if let Err(err) = std::fs::write(&path, corrected) {
            return FixOutcome::failed(file, format!("write failed: {err}"));
        }

        FixOutcome::applied(file, "rewrote project manifest")
    }

    /// Invoke the model, retrying transient failures with a fixed backoff.
    async fn invoke_with_retry(&self, request: &str) -> Result<String, ModelError> {
        let mut attempt = 0;
        loop {
            match self.model.invoke(request).await {
                Ok(reply) => return Ok(reply),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "model call failed, retrying");
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
