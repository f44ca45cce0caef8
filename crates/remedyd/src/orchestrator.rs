//! The remediation control loop.
//!
//! One logical orchestrator per process. The in-flight flag is the sole
//! concurrency control: webhook, manual trigger, and watchdog all race
//! for a single compare-and-swap, and losers are dropped, not queued.
//! The retry loop is an explicit bounded loop; the counter resets only on
//! cycle entry, so retries accumulate across one whole repair session.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use remedy_core::report::{CycleLog, CycleOutcome, CycleReport};
use remedy_core::types::{
    BuildResult, BuildSnapshot, BuildStatus, OrchestratorStatus, PushEvent,
};
use remedy_core::Config;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyzer::LogAnalyzer;
use crate::git::SourceControl;
use crate::jenkins::{self, JenkinsClient};
use crate::model::ModelClient;
use crate::notify::Notifier;
use crate::remediator::Remediator;

/// Trigger/poll/logs surface the orchestrator drives.
#[async_trait]
pub trait BuildServer: Send + Sync {
    async fn trigger_build(&self) -> jenkins::Result<()>;
    async fn check_build_status(&self) -> jenkins::Result<BuildStatus>;
    async fn console_log(&self, build_number: u64) -> jenkins::Result<String>;
}

#[async_trait]
impl BuildServer for JenkinsClient {
    async fn trigger_build(&self) -> jenkins::Result<()> {
        JenkinsClient::trigger_build(self).await
    }

    async fn check_build_status(&self) -> jenkins::Result<BuildStatus> {
        JenkinsClient::check_build_status(self).await
    }

    async fn console_log(&self, build_number: u64) -> jenkins::Result<String> {
        JenkinsClient::console_log(self, build_number).await
    }
}

/// How a remediation cycle was initiated.
#[derive(Debug, Clone)]
pub enum CycleEntry {
    /// Operator-initiated trigger.
    Manual,
    /// Push-event webhook; branch-filtered before anything runs.
    Push(PushEvent),
    /// The watchdog observed a completed failed build; the cycle enters
    /// the failure branch directly instead of re-triggering first.
    ObservedFailure(BuildSnapshot),
}

/// Timing and retry bounds for a cycle.
#[derive(Debug, Clone)]
pub struct CycleLimits {
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub settle_delay: Duration,
    pub target_branch: String,
}

impl CycleLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            poll_interval: Duration::from_secs(config.poll_interval_sec),
            poll_timeout: Duration::from_secs(config.poll_timeout_sec),
            settle_delay: Duration::from_secs(config.settle_delay_sec),
            target_branch: config.target_branch.clone(),
        }
    }
}

/// Process-wide mutable orchestrator state, owned and injected rather
/// than ambient.
#[derive(Debug, Default)]
pub struct CycleState {
    processing: AtomicBool,
    current_retry: AtomicU32,
}

impl CycleState {
    /// Atomic check-and-set of the in-flight flag.
    fn try_begin(&self) -> bool {
        self.processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn end(&self) {
        self.processing.store(false, Ordering::SeqCst);
    }

    fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    fn current_retry(&self) -> u32 {
        self.current_retry.load(Ordering::SeqCst)
    }
}

/// Releases the in-flight flag on every exit path.
struct ProcessingGuard<'a>(&'a CycleState);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.end();
    }
}

enum PollError {
    Timeout,
    Cancelled,
}

/// Type-erased handle the HTTP server and watchdog drive.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, entry: CycleEntry, cancel: CancellationToken) -> CycleReport;
    fn status(&self) -> OrchestratorStatus;
}

/// The top-level control loop over its collaborators.
pub struct Orchestrator<B, M: ModelClient, S> {
    server: B,
    analyzer: LogAnalyzer<M>,
    remediator: Remediator<M>,
    scm: S,
    notifier: Option<Notifier>,
    limits: CycleLimits,
    state: CycleState,
}

impl<B, M, S> Orchestrator<B, M, S>
where
    B: BuildServer,
    M: ModelClient,
    S: SourceControl,
{
    pub fn new(
        server: B,
        analyzer: LogAnalyzer<M>,
        remediator: Remediator<M>,
        scm: S,
        notifier: Option<Notifier>,
        limits: CycleLimits,
    ) -> Self {
        Self {
            server,
            analyzer,
            remediator,
            scm,
            notifier,
            limits,
            state: CycleState::default(),
        }
    }

    async fn notify(&self, text: &str, build: Option<&BuildSnapshot>) {
        if let Some(notifier) = &self.notifier {
            notifier.send(text, build).await;
        }
    }

    /// Poll build status on the fixed interval until the build is no
    /// longer running, bounded by the wall-clock ceiling. Transient
    /// status-check errors are logged and polling continues.
    async fn poll_until_complete(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BuildSnapshot, PollError> {
        let deadline = Instant::now() + self.limits.poll_timeout;
        loop {
            match self.server.check_build_status().await {
                Ok(BuildStatus::Build(snap)) if !snap.building => return Ok(snap),
                Ok(BuildStatus::Build(snap)) => {
                    debug!(number = snap.number, "build in progress");
                }
                Ok(BuildStatus::NotBuilt) => debug!("job has no build yet"),
                Err(err) => warn!(error = %err, "build status check failed, will retry"),
            }

            if Instant::now() >= deadline {
                return Err(PollError::Timeout);
            }
            tokio::select! {
                () = tokio::time::sleep(self.limits.poll_interval) => {}
                () = cancel.cancelled() => return Err(PollError::Cancelled),
            }
        }
    }

    async fn run_cycle_inner(
        &self,
        entry: CycleEntry,
        cancel: CancellationToken,
    ) -> CycleReport {
        // The branch filter runs before the guard: a push to a foreign
        // branch is a no-op, not a remediation cycle.
        if let CycleEntry::Push(event) = &entry {
            if event.branch() != self.limits.target_branch {
                return CycleReport::skipped(format!(
                    "ignoring push to branch {}",
                    event.branch()
                ));
            }
            if event.commits.is_empty() {
                return CycleReport::skipped("push event carried no new commits");
            }
        }

        if !self.state.try_begin() {
            debug!("cycle already in flight, dropping trigger");
            return CycleReport::rejected();
        }
        let _guard = ProcessingGuard(&self.state);

        // Retries accumulate across this whole repair session; only a
        // fresh cycle entry resets the counter.
        self.state.current_retry.store(0, Ordering::SeqCst);

        let mut log = CycleLog::begin();
        info!(cycle = %log.id(), "remediation cycle started");

        let mut observed = match entry {
            CycleEntry::ObservedFailure(snap) => Some(snap),
            _ => None,
        };

        let report = loop {
            let retry = self.state.current_retry();

            let snapshot = match observed.take() {
                Some(snap) => snap,
                None => {
                    if let Err(err) = self.server.trigger_build().await {
                        break log.finish(
                            CycleOutcome::Aborted,
                            format!("failed to trigger build: {err}"),
                            retry,
                        );
                    }
                    match self.poll_until_complete(&cancel).await {
                        Ok(snap) => snap,
                        Err(PollError::Timeout) => {
                            break log.finish(
                                CycleOutcome::Aborted,
                                "timed out waiting for build to complete",
                                retry,
                            )
                        }
                        Err(PollError::Cancelled) => {
                            break log.finish(CycleOutcome::Aborted, "cycle cancelled", retry)
                        }
                    }
                }
            };
            log.record_build(snapshot.clone());

            match snapshot.result {
                Some(BuildResult::Success) => {
                    break log.finish(CycleOutcome::Succeeded, "build succeeded", retry);
                }
                Some(BuildResult::Failure) => {
                    if retry >= self.limits.max_retries {
                        break log.finish(
                            CycleOutcome::Exhausted,
                            "retry ceiling reached, manual intervention required",
                            retry,
                        );
                    }
                    let attempt = retry + 1;
                    self.state.current_retry.store(attempt, Ordering::SeqCst);
                    info!(
                        attempt,
                        max_retries = self.limits.max_retries,
                        build = snapshot.number,
                        "build failed, attempting automatic fix"
                    );

                    let console = match self.server.console_log(snapshot.number).await {
                        Ok(console) => console,
                        Err(err) => {
                            break log.finish(
                                CycleOutcome::Aborted,
                                format!("failed to fetch build logs: {err}"),
                                attempt,
                            )
                        }
                    };

                    let analysis = match self
                        .analyzer
                        .analyze(snapshot.number, &console, &snapshot.url)
                        .await
                    {
                        Ok(analysis) => analysis,
                        Err(err) => {
                            break log.finish(
                                CycleOutcome::Aborted,
                                format!("log analysis failed: {err}"),
                                attempt,
                            )
                        }
                    };

                    if !analysis.needs_fix {
                        break log.finish(
                            CycleOutcome::Aborted,
                            "analysis reports no fix is needed",
                            attempt,
                        );
                    }

                    let outcomes = self.remediator.apply_all(&analysis).await;
                    log.record_fixes(&outcomes);
                    let applied = outcomes.iter().filter(|o| o.success).count();
                    if applied == 0 {
                        break log.finish(
                            CycleOutcome::Aborted,
                            "no fixes could be applied",
                            attempt,
                        );
                    }

                    if let Err(err) = self.scm.commit_fix(&analysis.summary).await {
                        break log.finish(
                            CycleOutcome::Aborted,
                            format!("failed to commit fixes: {err}"),
                            attempt,
                        );
                    }

                    self.notify(
                        &format!(
                            "applied {applied} fix(es) for build #{}, re-triggering",
                            snapshot.number
                        ),
                        Some(&snapshot),
                    )
                    .await;

                    // Let the push-triggered webhook re-arm before we
                    // trigger again ourselves.
                    tokio::select! {
                        () = tokio::time::sleep(self.limits.settle_delay) => {}
                        () = cancel.cancelled() => {
                            break log.finish(CycleOutcome::Aborted, "cycle cancelled", attempt)
                        }
                    }
                }
                other => {
                    let label = other.map_or("unknown", |r| r.as_str());
                    break log.finish(
                        CycleOutcome::Aborted,
                        format!("build finished with result {label}"),
                        retry,
                    );
                }
            }
        };

        info!(
            cycle = %report.id,
            outcome = report.outcome.as_str(),
            attempts = report.attempts,
            "remediation cycle finished"
        );
        self.notify(
            &format!("remediation cycle {}: {}", report.outcome.as_str(), report.message),
            report.build.as_ref(),
        )
        .await;

        report
    }
}

#[async_trait]
impl<B, M, S> CycleRunner for Orchestrator<B, M, S>
where
    B: BuildServer,
    M: ModelClient,
    S: SourceControl,
{
    async fn run_cycle(&self, entry: CycleEntry, cancel: CancellationToken) -> CycleReport {
        self.run_cycle_inner(entry, cancel).await
    }

    fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            is_processing: self.state.is_processing(),
            current_retry: self.state.current_retry(),
            max_retries: self.limits.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitError;
    use crate::model::ModelError;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const ANALYSIS_REPLY: &str = r#"{
        "needs_fix": true,
        "issues": [
            {"type": "syntax_error", "file": "src/main.js", "message": "Unexpected token", "line": 8, "severity": "high"}
        ],
        "summary": "repair syntax error in src/main.js",
        "recommendations": [],
        "priority": "high"
    }"#;

    const NO_FIX_REPLY: &str =
        r#"{"needs_fix": false, "issues": [], "summary": "infrastructure flake"}"#;

    fn failed(number: u64) -> BuildSnapshot {
        BuildSnapshot {
            number,
            building: false,
            result: Some(BuildResult::Failure),
            url: format!("http://ci/job/app/{number}/"),
            duration_ms: None,
            built_by: None,
        }
    }

    fn succeeded(number: u64) -> BuildSnapshot {
        BuildSnapshot {
            result: Some(BuildResult::Success),
            ..failed(number)
        }
    }

    fn building(number: u64) -> BuildSnapshot {
        BuildSnapshot {
            building: true,
            result: None,
            ..failed(number)
        }
    }

    /// Build server fake driven by a script of poll answers.
    struct ScriptedServer {
        statuses: Mutex<VecDeque<BuildStatus>>,
        fallback: BuildStatus,
        triggers: AtomicU32,
        trigger_ok: bool,
    }

    impl ScriptedServer {
        fn new(script: Vec<BuildSnapshot>, fallback: BuildSnapshot) -> Self {
            Self {
                statuses: Mutex::new(script.into_iter().map(BuildStatus::Build).collect()),
                fallback: BuildStatus::Build(fallback),
                triggers: AtomicU32::new(0),
                trigger_ok: true,
            }
        }

        fn triggers(&self) -> u32 {
            self.triggers.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BuildServer for ScriptedServer {
        async fn trigger_build(&self) -> jenkins::Result<()> {
            self.triggers.fetch_add(1, Ordering::SeqCst);
            if self.trigger_ok {
                Ok(())
            } else {
                Err(jenkins::JenkinsError::Auth)
            }
        }

        async fn check_build_status(&self) -> jenkins::Result<BuildStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            Ok(statuses.pop_front().unwrap_or_else(|| self.fallback.clone()))
        }

        async fn console_log(&self, build_number: u64) -> jenkins::Result<String> {
            Ok(format!(
                "Started build {build_number}\nSyntaxError: Unexpected token (src/main.js:8)\n"
            ))
        }
    }

    /// Model fake routing by prompt shape: analysis prompts get the
    /// canned analysis, everything else gets corrected source.
    struct RouterModel {
        analysis_reply: String,
        fix_reply: String,
    }

    impl RouterModel {
        fn new(analysis_reply: &str) -> Self {
            Self {
                analysis_reply: analysis_reply.to_string(),
                fix_reply: "const x = 1;".to_string(),
            }
        }
    }

    #[async_trait]
    impl ModelClient for RouterModel {
        async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
            if prompt.contains("Extract the build-breaking issues") {
                Ok(self.analysis_reply.clone())
            } else {
                Ok(self.fix_reply.clone())
            }
        }
    }

    /// Source-control fake recording commit descriptions.
    #[derive(Default)]
    struct RecordingScm {
        commits: Mutex<Vec<String>>,
        reject_push: bool,
    }

    impl RecordingScm {
        fn commit_count(&self) -> usize {
            self.commits.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SourceControl for RecordingScm {
        async fn commit_fix(&self, description: &str) -> Result<(), GitError> {
            if self.reject_push {
                return Err(GitError::PushRejected("non-fast-forward".to_string()));
            }
            self.commits.lock().unwrap().push(description.to_string());
            Ok(())
        }
    }

    fn fast_limits() -> CycleLimits {
        CycleLimits {
            max_retries: 3,
            poll_interval: Duration::from_millis(2),
            poll_timeout: Duration::from_millis(200),
            settle_delay: Duration::from_millis(2),
            target_branch: "develop".to_string(),
        }
    }

    fn orchestrator(
        server: ScriptedServer,
        analysis_reply: &str,
        scm: RecordingScm,
        project_root: &Path,
    ) -> Orchestrator<ScriptedServer, RouterModel, RecordingScm> {
        let model = Arc::new(RouterModel::new(analysis_reply));
        let mut config = Config::default();
        config.repo_path = project_root.to_path_buf();
        config.fix_retry_backoff_sec = 0;
        let analyzer = LogAnalyzer::new(Arc::clone(&model), 4096, 4096);
        let remediator = Remediator::new(model, &config);
        Orchestrator::new(server, analyzer, remediator, scm, None, fast_limits())
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.js"), "const x = ;").unwrap();
        dir
    }

    #[tokio::test]
    async fn first_try_success_ends_clean() {
        let dir = project();
        let server = ScriptedServer::new(vec![succeeded(10)], succeeded(10));
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert!(report.success);
        assert_eq!(report.outcome, CycleOutcome::Succeeded);
        assert_eq!(report.attempts, 0);
        assert_eq!(orch.server.triggers(), 1);
        assert!(!orch.status().is_processing);
    }

    #[tokio::test]
    async fn failed_build_is_fixed_committed_and_retried() {
        let dir = project();
        // First cycle polls to a failure, the re-trigger polls through a
        // building sample to success.
        let server = ScriptedServer::new(
            vec![building(5), failed(5), building(6), succeeded(6)],
            succeeded(6),
        );
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert!(report.success, "{}", report.message);
        assert_eq!(report.outcome, CycleOutcome::Succeeded);
        assert_eq!(report.attempts, 1);
        assert_eq!(orch.server.triggers(), 2);
        assert_eq!(orch.scm.commit_count(), 1);
        assert_eq!(
            orch.scm.commits.lock().unwrap()[0],
            "repair syntax error in src/main.js"
        );
        // The fix landed on disk.
        let content = std::fs::read_to_string(dir.path().join("src/main.js")).unwrap();
        assert_eq!(content, "const x = 1;");
        assert_eq!(report.fixes.len(), 1);
        assert!(report.fixes[0].success);
    }

    #[tokio::test]
    async fn persistent_failure_exhausts_after_max_retries() {
        let dir = project();
        let server = ScriptedServer::new(vec![], failed(5));
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert!(!report.success);
        assert_eq!(report.outcome, CycleOutcome::Exhausted);
        assert!(report.message.contains("manual intervention"));
        // Exactly three remediation attempts, never a fourth.
        assert_eq!(report.attempts, 3);
        assert_eq!(orch.scm.commit_count(), 3);
        assert_eq!(orch.server.triggers(), 4);
        assert_eq!(orch.status().current_retry, 3);
    }

    #[tokio::test]
    async fn no_fix_needed_aborts_without_committing() {
        let dir = project();
        let server = ScriptedServer::new(vec![failed(5)], failed(5));
        let orch = orchestrator(server, NO_FIX_REPLY, RecordingScm::default(), dir.path());

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert!(!report.success);
        assert_eq!(report.outcome, CycleOutcome::Aborted);
        assert!(report.message.contains("no fix is needed"));
        assert_eq!(orch.scm.commit_count(), 0);
        assert_eq!(orch.server.triggers(), 1);
    }

    #[tokio::test]
    async fn rejected_push_aborts_the_cycle() {
        let dir = project();
        let server = ScriptedServer::new(vec![failed(5)], failed(5));
        let scm = RecordingScm {
            reject_push: true,
            ..RecordingScm::default()
        };
        let orch = orchestrator(server, ANALYSIS_REPLY, scm, dir.path());

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert_eq!(report.outcome, CycleOutcome::Aborted);
        assert!(report.message.contains("commit"));
        // Only the initial trigger; the cycle never re-triggered.
        assert_eq!(orch.server.triggers(), 1);
    }

    #[tokio::test]
    async fn trigger_error_aborts_immediately() {
        let dir = project();
        let mut server = ScriptedServer::new(vec![], failed(5));
        server.trigger_ok = false;
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert_eq!(report.outcome, CycleOutcome::Aborted);
        assert!(report.message.contains("failed to trigger build"));
        assert!(!orch.status().is_processing);
    }

    #[tokio::test]
    async fn poll_ceiling_aborts_with_timeout() {
        let dir = project();
        let server = ScriptedServer::new(vec![], building(5));
        let mut orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());
        orch.limits.poll_timeout = Duration::from_millis(20);

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert_eq!(report.outcome, CycleOutcome::Aborted);
        assert!(report.message.contains("timed out"));
    }

    #[tokio::test]
    async fn unstable_result_aborts_without_remediation() {
        let dir = project();
        let unstable = BuildSnapshot {
            result: Some(BuildResult::Unstable),
            ..failed(5)
        };
        let server = ScriptedServer::new(vec![unstable.clone()], unstable);
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert_eq!(report.outcome, CycleOutcome::Aborted);
        assert!(report.message.contains("UNSTABLE"));
        assert_eq!(orch.scm.commit_count(), 0);
    }

    #[tokio::test]
    async fn second_trigger_is_rejected_and_keeps_the_counter() {
        let dir = project();
        let server = ScriptedServer::new(vec![], succeeded(5));
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        // Simulate a cycle in flight.
        assert!(orch.state.try_begin());
        orch.state.current_retry.store(2, Ordering::SeqCst);

        let report = orch
            .run_cycle(CycleEntry::Manual, CancellationToken::new())
            .await;

        assert!(!report.success);
        assert_eq!(report.outcome, CycleOutcome::Rejected);
        assert_eq!(report.message, "already processing");
        // The rejected trigger must not reset the in-flight counter.
        assert_eq!(orch.status().current_retry, 2);
        assert!(orch.status().is_processing);
        assert_eq!(orch.server.triggers(), 0);
    }

    #[tokio::test]
    async fn foreign_branch_push_is_a_no_op_success() {
        let dir = project();
        let server = ScriptedServer::new(vec![], succeeded(5));
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let event = PushEvent {
            git_ref: "refs/heads/feature-x".to_string(),
            commits: vec![remedy_core::types::PushCommit::default()],
        };
        let report = orch
            .run_cycle(CycleEntry::Push(event), CancellationToken::new())
            .await;

        assert!(report.success);
        assert_eq!(report.outcome, CycleOutcome::Skipped);
        // The build server is never consulted.
        assert_eq!(orch.server.triggers(), 0);
    }

    #[tokio::test]
    async fn target_branch_push_runs_the_cycle() {
        let dir = project();
        let server = ScriptedServer::new(vec![succeeded(5)], succeeded(5));
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let event = PushEvent {
            git_ref: "refs/heads/develop".to_string(),
            commits: vec![remedy_core::types::PushCommit::default()],
        };
        let report = orch
            .run_cycle(CycleEntry::Push(event), CancellationToken::new())
            .await;

        assert_eq!(report.outcome, CycleOutcome::Succeeded);
        assert_eq!(orch.server.triggers(), 1);
    }

    #[tokio::test]
    async fn empty_push_is_skipped() {
        let dir = project();
        let server = ScriptedServer::new(vec![], succeeded(5));
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let event = PushEvent {
            git_ref: "refs/heads/develop".to_string(),
            commits: vec![],
        };
        let report = orch
            .run_cycle(CycleEntry::Push(event), CancellationToken::new())
            .await;

        assert_eq!(report.outcome, CycleOutcome::Skipped);
        assert_eq!(orch.server.triggers(), 0);
    }

    #[tokio::test]
    async fn observed_failure_skips_the_initial_trigger() {
        let dir = project();
        // After the fix is committed the re-trigger polls to success.
        let server = ScriptedServer::new(vec![succeeded(6)], succeeded(6));
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let report = orch
            .run_cycle(
                CycleEntry::ObservedFailure(failed(5)),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(report.outcome, CycleOutcome::Succeeded);
        assert_eq!(report.attempts, 1);
        // One trigger for the re-build, none for the observed failure.
        assert_eq!(orch.server.triggers(), 1);
        assert_eq!(orch.scm.commit_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_poll_loop() {
        let dir = project();
        let server = ScriptedServer::new(vec![], building(5));
        let orch = orchestrator(server, ANALYSIS_REPLY, RecordingScm::default(), dir.path());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = orch.run_cycle(CycleEntry::Manual, cancel).await;

        assert_eq!(report.outcome, CycleOutcome::Aborted);
        assert!(report.message.contains("cancelled"));
        assert!(!orch.status().is_processing);
    }
}
