//! Remediation-cycle reporting.
//!
//! A `CycleReport` is the `{success, message, ...}` envelope every public
//! entry point returns; no raw error type crosses the daemon boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BuildSnapshot, FixOutcome, Id};

/// Terminal state of one remediation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The build finished green.
    Succeeded,
    /// The retry ceiling was reached; manual intervention required.
    Exhausted,
    /// An unrecoverable error, or the analysis said no fix is needed.
    Aborted,
    /// A cycle was already in flight; this trigger was dropped.
    Rejected,
    /// Webhook filter no-op (event did not target the configured branch).
    Skipped,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::Aborted => "aborted",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }
}

/// Final report of one remediation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub id: Id,
    pub success: bool,
    pub outcome: CycleOutcome,
    pub message: String,
    /// Remediation attempts consumed by this cycle.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSnapshot>,
    #[serde(default)]
    pub fixes: Vec<FixOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Builder-style accumulator for a cycle in progress.
#[derive(Debug)]
pub struct CycleLog {
    id: Id,
    started_at: DateTime<Utc>,
    fixes: Vec<FixOutcome>,
    build: Option<BuildSnapshot>,
}

impl CycleLog {
    pub fn begin() -> Self {
        Self {
            id: Id::new(),
            started_at: Utc::now(),
            fixes: Vec::new(),
            build: None,
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn record_build(&mut self, build: BuildSnapshot) {
        self.build = Some(build);
    }

    pub fn record_fixes(&mut self, outcomes: &[FixOutcome]) {
        self.fixes.extend_from_slice(outcomes);
    }

    pub fn applied_count(&self) -> usize {
        self.fixes.iter().filter(|f| f.success).count()
    }

    pub fn finish(
        self,
        outcome: CycleOutcome,
        message: impl Into<String>,
        attempts: u32,
    ) -> CycleReport {
        CycleReport {
            id: self.id,
            success: outcome == CycleOutcome::Succeeded || outcome == CycleOutcome::Skipped,
            outcome,
            message: message.into(),
            attempts,
            build: self.build,
            fixes: self.fixes,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

impl CycleReport {
    /// Immediate refusal for a trigger that raced a cycle in flight.
    pub fn rejected() -> Self {
        let now = Utc::now();
        Self {
            id: Id::new(),
            success: false,
            outcome: CycleOutcome::Rejected,
            message: "already processing".to_string(),
            attempts: 0,
            build: None,
            fixes: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// No-op success for a webhook event that did not pass the branch filter.
    pub fn skipped(message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Id::new(),
            success: true,
            outcome: CycleOutcome::Skipped,
            message: message.into(),
            attempts: 0,
            build: None,
            fixes: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }
}
