//! remedy-core: shared types and logic for the build-remediation daemon.

pub mod config;
pub mod decode;
pub mod prompt;
pub mod report;
pub mod types;

pub use config::{BuildParams, Config, ConfigError};
pub use report::{CycleOutcome, CycleReport};
pub use types::{
    AnalysisResult, BuildResult, BuildSnapshot, BuildStatus, FixOutcome, Id, Issue, IssueKind,
    OrchestratorStatus, PushCommit, PushEvent, Severity,
};
