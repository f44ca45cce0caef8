//! Configuration parsing for the remediation daemon.
//!
//! Plain key=value format: one setting per line, `#` comments, optional
//! quoting. Precedence: CLI flags > `--config` file > defaults.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
}

/// Default parameters submitted when the build job is parameterized.
///
/// The field names mirror the parameter form most front-end deploy jobs
/// expose; empty values are omitted from the request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BuildParams {
    pub tag: String,
    pub env: String,
    pub build_cmd: String,
    pub build_file: String,
    pub app_name: String,
    pub deploy_host: String,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            tag: "origin/develop".to_string(),
            env: "test".to_string(),
            build_cmd: "npm ci && npm run build".to_string(),
            build_file: "dist".to_string(),
            app_name: String::new(),
            deploy_host: String::new(),
        }
    }
}

impl BuildParams {
    /// Form fields for the parameterized-build endpoint.
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("TAG", self.tag.clone()),
            ("APP_ENV", self.env.clone()),
            ("APP_BUILDCMD", self.build_cmd.clone()),
            ("APP_BUILDFILE", self.build_file.clone()),
        ];
        if !self.app_name.is_empty() {
            form.push(("APP_NAME", self.app_name.clone()));
        }
        if !self.deploy_host.is_empty() {
            form.push(("APP_HOSTNAME", self.deploy_host.clone()));
        }
        form
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    // Build server
    pub jenkins_url: String,
    pub jenkins_user: String,
    pub jenkins_token: String,
    /// Slash-delimited nested job path, e.g. `team/web/app`.
    pub job_name: String,

    // Working copy
    pub repo_path: PathBuf,
    pub remote: String,
    /// Branch the webhook filter accepts and fixes are pushed to.
    pub target_branch: String,
    /// Project manifest rewritten for dependency issues.
    pub manifest_file: String,

    // Cycle timing
    pub poll_interval_sec: u64,
    pub poll_timeout_sec: u64,
    pub settle_delay_sec: u64,
    pub watch_interval_sec: u64,

    // Retry policy
    pub max_retries: u32,
    pub fix_retry_backoff_sec: u64,

    // HTTP timeouts
    pub http_timeout_sec: u64,
    pub log_fetch_timeout_sec: u64,
    pub model_timeout_sec: u64,

    // Log bounding
    pub log_max_bytes: usize,
    pub log_head_bytes: usize,
    pub log_tail_bytes: usize,

    // Model endpoint
    pub model_url: String,
    pub model_name: String,
    pub model_api_key: String,
    pub model_max_tokens: u32,

    // Notification sink (empty = disabled)
    pub notify_url: String,

    // Default build parameters
    pub params: BuildParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jenkins_url: "http://127.0.0.1:8080".to_string(),
            jenkins_user: String::new(),
            jenkins_token: String::new(),
            job_name: String::new(),
            repo_path: PathBuf::from("."),
            remote: "origin".to_string(),
            target_branch: "develop".to_string(),
            manifest_file: "package.json".to_string(),
            poll_interval_sec: 10,
            poll_timeout_sec: 300,
            settle_delay_sec: 30,
            watch_interval_sec: 30,
            max_retries: 3,
            fix_retry_backoff_sec: 10,
            http_timeout_sec: 10,
            log_fetch_timeout_sec: 30,
            model_timeout_sec: 60,
            log_max_bytes: 8 * 1024 * 1024,
            log_head_bytes: 32 * 1024,
            log_tail_bytes: 32 * 1024,
            model_url: "http://127.0.0.1:8000/v1/chat/completions".to_string(),
            model_name: String::new(),
            model_api_key: String::new(),
            model_max_tokens: 4096,
            notify_url: String::new(),
            params: BuildParams::default(),
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            // Skip empty lines and comments
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "jenkins_url" => self.jenkins_url = value.trim_end_matches('/').to_string(),
            "jenkins_user" => self.jenkins_user = value.to_string(),
            "jenkins_token" => self.jenkins_token = value.to_string(),
            "job_name" => self.job_name = value.to_string(),
            "repo_path" => self.repo_path = PathBuf::from(value),
            "remote" => self.remote = value.to_string(),
            "target_branch" => self.target_branch = value.to_string(),
            "manifest_file" => self.manifest_file = value.to_string(),
            "poll_interval_sec" => self.poll_interval_sec = Self::parse_int(key, value)?,
            "poll_timeout_sec" => self.poll_timeout_sec = Self::parse_int(key, value)?,
            "settle_delay_sec" => self.settle_delay_sec = Self::parse_int(key, value)?,
            "watch_interval_sec" => self.watch_interval_sec = Self::parse_int(key, value)?,
            "max_retries" => {
                self.max_retries = value.parse().map_err(|_| ConfigError::InvalidInt {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            "fix_retry_backoff_sec" => self.fix_retry_backoff_sec = Self::parse_int(key, value)?,
            "http_timeout_sec" => self.http_timeout_sec = Self::parse_int(key, value)?,
            "log_fetch_timeout_sec" => self.log_fetch_timeout_sec = Self::parse_int(key, value)?,
            "model_timeout_sec" => self.model_timeout_sec = Self::parse_int(key, value)?,
            "log_max_bytes" => {
                self.log_max_bytes = value.parse().map_err(|_| ConfigError::InvalidInt {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            "log_head_bytes" => {
                self.log_head_bytes = value.parse().map_err(|_| ConfigError::InvalidInt {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            "log_tail_bytes" => {
                self.log_tail_bytes = value.parse().map_err(|_| ConfigError::InvalidInt {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            "model_url" => self.model_url = value.to_string(),
            "model_name" => self.model_name = value.to_string(),
            "model_api_key" => self.model_api_key = value.to_string(),
            "model_max_tokens" => {
                self.model_max_tokens = value.parse().map_err(|_| ConfigError::InvalidInt {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            "notify_url" => self.notify_url = value.to_string(),
            "param_tag" => self.params.tag = value.to_string(),
            "param_env" => self.params.env = value.to_string(),
            "param_build_cmd" => self.params.build_cmd = value.to_string(),
            "param_build_file" => self.params.build_file = value.to_string(),
            "param_app_name" => self.params.app_name = value.to_string(),
            "param_deploy_host" => self.params.deploy_host = value.to_string(),
            _ => {
                // Warn but don't fail for unknown keys
                eprintln!("Warning: unknown config key: {key}");
            }
        }
        Ok(())
    }

    fn parse_int(key: &str, value: &str) -> Result<u64, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Resolve the working-copy path against a base directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.repo_path.is_relative() {
            self.repo_path = base.join(&self.repo_path);
        }
    }

    /// Model API key, falling back to the environment.
    pub fn model_api_key(&self) -> Option<String> {
        if !self.model_api_key.is_empty() {
            return Some(self.model_api_key.clone());
        }
        std::env::var("REMEDY_MODEL_API_KEY").ok().filter(|k| !k.is_empty())
    }
}
