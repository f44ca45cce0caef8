//! Core types for the build-remediation daemon.
//!
//! Shared between the daemon and the CLI; everything here is plain data
//! with serde derives so it can cross the HTTP control plane unchanged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for remediation cycles.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// --- Build server ---

/// Terminal result of a finished build, as reported by the build server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Failure,
    Unstable,
    Aborted,
    Unknown,
}

impl BuildResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Unstable => "UNSTABLE",
            Self::Aborted => "ABORTED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Map a raw server result string; anything unrecognized is `Unknown`.
    pub fn from_server(raw: &str) -> Self {
        match raw {
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            "UNSTABLE" => Self::Unstable,
            "ABORTED" => Self::Aborted,
            _ => Self::Unknown,
        }
    }
}

/// Normalized snapshot of one build, re-fetched on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSnapshot {
    /// Build number; monotonically increasing per job.
    pub number: u64,
    /// True while the build is still running.
    pub building: bool,
    /// Terminal result; `None` while building.
    pub result: Option<BuildResult>,
    /// Link to the build on the server.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_by: Option<String>,
}

/// Status of a job's most recent build.
///
/// A job that has never run is a regular answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildStatus {
    NotBuilt,
    Build(BuildSnapshot),
}

impl BuildStatus {
    pub fn snapshot(&self) -> Option<&BuildSnapshot> {
        match self {
            Self::NotBuilt => None,
            Self::Build(snap) => Some(snap),
        }
    }
}

// --- Log analysis ---

/// Classification of one build-breaking issue.
///
/// The remediator matches on this exhaustively, so adding a variant is a
/// compiler-enforced change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    SyntaxError,
    DependencyError,
    ConfigurationError,
    ModuleResolutionError,
    Other,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax_error",
            Self::DependencyError => "dependency_error",
            Self::ConfigurationError => "configuration_error",
            Self::ModuleResolutionError => "module_resolution_error",
            Self::Other => "other",
        }
    }
}

/// Severity of an issue, and the priority of a whole analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    #[default]
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// One classified defect extracted from a build log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    /// Relative or absolute path of the affected file.
    pub file: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub severity: Severity,
}

/// Structured outcome of analyzing one failed build's log.
///
/// Every field defaults so a structurally partial model reply still
/// decodes instead of failing the whole analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub needs_fix: bool,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub priority: Severity,
}

impl AnalysisResult {
    /// Typed fallback used when the model reply cannot be decoded.
    ///
    /// The pipeline must never halt on a malformed reply, so the degraded
    /// result still requests a fix with a single catch-all issue.
    pub fn degraded(reason: &str) -> Self {
        Self {
            needs_fix: true,
            issues: vec![Issue {
                kind: IssueKind::Other,
                file: String::new(),
                message: format!("analysis reply could not be decoded: {reason}"),
                line: None,
                severity: Severity::Medium,
            }],
            summary: "build failure (analysis degraded)".to_string(),
            recommendations: vec!["inspect the build log manually".to_string()],
            priority: Severity::Medium,
        }
    }
}

// --- Remediation ---

/// Result of attempting to fix a single issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixOutcome {
    pub success: bool,
    pub file: String,
    pub message: String,
}

impl FixOutcome {
    pub fn applied(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn failed(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            file: file.into(),
            message: message.into(),
        }
    }
}

// --- External triggers ---

/// One commit inside a push event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
}

/// Push-event payload delivered by a source-hosting webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    /// Full ref, e.g. `refs/heads/develop`.
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

impl PushEvent {
    /// Branch name with the `refs/heads/` prefix stripped.
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }
}

// --- Orchestrator ---

/// Snapshot of the process-wide orchestrator state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub is_processing: bool,
    pub current_retry: u32,
    pub max_retries: u32,
}
