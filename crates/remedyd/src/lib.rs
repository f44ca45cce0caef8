//! remedyd - CI/CD auto-remediation daemon
//!
//! Library components for the daemon process: build-server client, log
//! analyzer, code remediator, source-control operator, the orchestrator
//! state machine, the autonomous watchdog, and the HTTP control plane.

pub mod analyzer;
pub mod git;
pub mod jenkins;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod remediator;
pub mod server;
pub mod watchdog;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use remedy_core::Config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use analyzer::LogAnalyzer;
use git::GitWorkingCopy;
use jenkins::JenkinsClient;
use model::HttpModelClient;
use notify::Notifier;
use orchestrator::{CycleLimits, CycleRunner, Orchestrator};
use server::AppState;
use watchdog::BuildWatchdog;

/// Daemon options from the command line and environment.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// HTTP control-plane port.
    pub port: u16,
    /// Config file path; defaults to `~/.config/remedyd/config`.
    pub config_path: Option<PathBuf>,
    /// Bearer token for the HTTP API (optional).
    pub auth_token: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: 7710,
            config_path: None,
            auth_token: std::env::var("REMEDYD_AUTH_TOKEN").ok(),
        }
    }
}

/// Get the default config path (~/.config/remedyd/config).
fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remedyd")
        .join("config")
}

/// Daemon state.
pub struct Daemon {
    options: DaemonConfig,
    jenkins: Arc<JenkinsClient>,
    runner: Arc<dyn CycleRunner>,
    watch_interval: Duration,
    cancel: CancellationToken,
}

impl Daemon {
    /// Load configuration and wire up all components.
    pub fn new(options: DaemonConfig) -> eyre::Result<Self> {
        let config_path = options
            .config_path
            .clone()
            .unwrap_or_else(default_config_path);

        let mut config = if config_path.is_file() {
            info!("loading config from {}", config_path.display());
            Config::from_file(&config_path)
                .wrap_err_with(|| format!("loading {}", config_path.display()))?
        } else {
            warn!(
                "config file {} not found, using defaults",
                config_path.display()
            );
            Config::default()
        };
        let cwd = std::env::current_dir().wrap_err("resolving working directory")?;
        config.resolve_paths(&cwd);

        let jenkins =
            Arc::new(JenkinsClient::from_config(&config).wrap_err("building build-server client")?);
        let model =
            Arc::new(HttpModelClient::from_config(&config).wrap_err("building model client")?);

        let analyzer = LogAnalyzer::new(
            Arc::clone(&model),
            config.log_head_bytes,
            config.log_tail_bytes,
        );
        let remediator = remediator::Remediator::new(Arc::clone(&model), &config);
        let scm = GitWorkingCopy {
            repo: config.repo_path.clone(),
            remote: config.remote.clone(),
            branch: config.target_branch.clone(),
        };
        let notifier = Notifier::from_url(
            &config.notify_url,
            Duration::from_secs(config.http_timeout_sec),
        );

        let orchestrator = Orchestrator::new(
            (*jenkins).clone(),
            analyzer,
            remediator,
            scm,
            notifier,
            CycleLimits::from_config(&config),
        );

        Ok(Self {
            options,
            jenkins,
            runner: Arc::new(orchestrator),
            watch_interval: Duration::from_secs(config.watch_interval_sec),
            cancel: CancellationToken::new(),
        })
    }

    /// Run the daemon: watchdog in the background, HTTP server in front.
    pub async fn run(&self) -> eyre::Result<()> {
        info!("remedyd starting on port {}", self.options.port);
        if self.options.auth_token.is_some() {
            info!("auth token: enabled");
        }

        let watchdog = Arc::new(BuildWatchdog::new(self.watch_interval));
        let watchdog_handle = tokio::spawn(Arc::clone(&watchdog).run(
            Arc::clone(&self.jenkins),
            Arc::clone(&self.runner),
            self.cancel.clone(),
        ));

        let state = Arc::new(AppState {
            runner: Arc::clone(&self.runner),
            cancel: self.cancel.clone(),
            auth_token: self.options.auth_token.clone(),
        });

        let result = server::start_server(state, self.options.port)
            .await
            .map_err(|e| eyre::eyre!("HTTP server error: {e}"));

        // Server exited (shutdown or error); stop the watchdog too.
        self.cancel.cancel();
        let _ = watchdog_handle.await;

        result
    }

    /// Signal the daemon to shut down.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.cancel.cancel();
    }
}
