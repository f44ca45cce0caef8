//! Build-server client.
//!
//! Jenkins-style HTTP API: nested job paths, optional anti-forgery
//! crumbs, plain vs. parameterized trigger endpoints, JSON build detail
//! and plain-text console logs. The client absorbs that variability so
//! the orchestrator only sees a clean trigger/poll/logs surface.

use std::time::Duration;

use futures_util::StreamExt;
use remedy_core::config::{BuildParams, Config};
use remedy_core::types::{BuildResult, BuildSnapshot, BuildStatus};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Marker class Jenkins attaches to parameterized jobs.
const PARAMETERS_PROPERTY: &str = "hudson.model.ParametersDefinitionProperty";

/// Appended to a console log cut off at the size cap.
const TRUNCATION_MARKER: &str = "\n[log truncated at size cap]\n";

#[derive(Debug, Error)]
pub enum JenkinsError {
    #[error("authentication failed (401): check user and API token")]
    Auth,
    #[error("permission denied (403)")]
    Permission,
    #[error("not found (404): job or build does not exist")]
    NotFound,
    #[error("nothing to build: {0}")]
    NoChanges(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unexpected status {status}: {message}")]
    Unexpected { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, JenkinsError>;

/// Translate a slash-delimited job path into the server's URL nesting.
///
/// `team/web/app` becomes `job/team/job/web/job/app`.
pub fn job_url_path(job: &str) -> String {
    format!("job/{}", job.replace('/', "/job/"))
}

/// Inverse of [`job_url_path`].
pub fn job_from_url_path(path: &str) -> String {
    path.strip_prefix("job/")
        .unwrap_or(path)
        .replace("/job/", "/")
}

/// Anti-forgery token pair; field name varies per installation.
#[derive(Debug, Clone, Deserialize)]
pub struct Crumb {
    #[serde(rename = "crumbRequestField")]
    pub field: String,
    pub crumb: String,
}

#[derive(Debug, Deserialize)]
struct JobInfo {
    #[serde(rename = "lastBuild")]
    last_build: Option<BuildRef>,
    #[serde(default)]
    property: Vec<serde_json::Value>,
}

impl JobInfo {
    fn has_parameters(&self) -> bool {
        self.property
            .iter()
            .any(|p| p.get("_class").and_then(|c| c.as_str()) == Some(PARAMETERS_PROPERTY))
    }
}

#[derive(Debug, Deserialize)]
struct BuildRef {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct BuildDetail {
    number: u64,
    #[serde(default)]
    building: bool,
    result: Option<String>,
    #[serde(default)]
    url: String,
    duration: Option<u64>,
    #[serde(rename = "builtBy")]
    built_by: Option<String>,
}

/// HTTP client for one build job on one server.
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    base_url: String,
    user: String,
    token: String,
    job: String,
    params: BuildParams,
    log_cap: usize,
    log_timeout: Duration,
    http: reqwest::Client,
}

impl JenkinsClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.jenkins_url,
            &config.jenkins_user,
            &config.jenkins_token,
            &config.job_name,
            config.params.clone(),
            config.log_max_bytes,
            Duration::from_secs(config.http_timeout_sec),
            Duration::from_secs(config.log_fetch_timeout_sec),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: &str,
        user: &str,
        token: &str,
        job: &str,
        params: BuildParams,
        log_cap: usize,
        timeout: Duration,
        log_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            token: token.to_string(),
            job: job.to_string(),
            params,
            log_cap,
            log_timeout,
            http,
        })
    }

    fn job_api_url(&self) -> String {
        format!("{}/{}/api/json", self.base_url, job_url_path(&self.job))
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .basic_auth(&self.user, Some(&self.token))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Fetch the anti-forgery crumb, best-effort.
    ///
    /// Some installations disable the protection entirely; any failure
    /// here means "proceed without a crumb", never an error.
    pub async fn fetch_crumb(&self) -> Option<Crumb> {
        let url = format!("{}/crumbIssuer/api/json", self.base_url);
        match self.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(crumb) => Some(crumb),
                Err(err) => {
                    debug!(error = %err, "crumb response did not parse, proceeding without");
                    None
                }
            },
            Ok(response) => {
                debug!(status = %response.status(), "crumb issuer unavailable, proceeding without");
                None
            }
            Err(err) => {
                debug!(error = %err, "crumb fetch failed, proceeding without");
                None
            }
        }
    }

    async fn job_info(&self) -> Result<JobInfo> {
        let response = self.get(&self.job_api_url()).send().await?;
        let status = response.status();
        match status.as_u16() {
            200 => response
                .json()
                .await
                .map_err(|e| JenkinsError::InvalidResponse(e.to_string())),
            401 => Err(JenkinsError::Auth),
            403 => Err(JenkinsError::Permission),
            404 => Err(JenkinsError::NotFound),
            code => Err(JenkinsError::Unexpected {
                status: code,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Trigger a build of the configured job.
    ///
    /// Detects parameterized jobs from their metadata and posts default
    /// parameters when required; metadata failures fall back to the plain
    /// endpoint.
    pub async fn trigger_build(&self) -> Result<()> {
        let parameterized = match self.job_info().await {
            Ok(info) => info.has_parameters(),
            Err(err) => {
                warn!(error = %err, "job metadata unavailable, using plain build endpoint");
                false
            }
        };

        let endpoint = if parameterized {
            "buildWithParameters"
        } else {
            "build"
        };
        let url = format!("{}/{}/{endpoint}", self.base_url, job_url_path(&self.job));
        debug!(%url, parameterized, "triggering build");

        let mut request = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.token))
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(crumb) = self.fetch_crumb().await {
            request = request.header(crumb.field, crumb.crumb);
        }

        if parameterized {
            request = request.form(&self.params.to_form());
        } else {
            request = request.form(&Vec::<(&str, &str)>::new());
        }

        let response = request.send().await?;
        match response.status().as_u16() {
            200 | 201 => Ok(()),
            401 => Err(JenkinsError::Auth),
            403 => Err(JenkinsError::Permission),
            404 => Err(JenkinsError::NotFound),
            400 => {
                let body = response.text().await.unwrap_or_default();
                // The server reports "nothing new to build" as a 400;
                // distinguish it from genuinely malformed requests.
                if body.contains("Nothing is submitted") || body.contains("No changes") {
                    Err(JenkinsError::NoChanges(
                        "server reports no new commits to build".to_string(),
                    ))
                } else {
                    Err(JenkinsError::Unexpected {
                        status: 400,
                        message: body,
                    })
                }
            }
            code => Err(JenkinsError::Unexpected {
                status: code,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Fetch the job's last-build status, normalized.
    ///
    /// A job that has never run yields `BuildStatus::NotBuilt`.
    pub async fn check_build_status(&self) -> Result<BuildStatus> {
        let info = self.job_info().await?;
        let Some(last) = info.last_build else {
            return Ok(BuildStatus::NotBuilt);
        };

        let url = format!(
            "{}/{}/{}/api/json",
            self.base_url,
            job_url_path(&self.job),
            last.number
        );
        let response = self.get(&url).send().await?;
        match response.status().as_u16() {
            200 => {
                let detail: BuildDetail = response
                    .json()
                    .await
                    .map_err(|e| JenkinsError::InvalidResponse(e.to_string()))?;
                Ok(BuildStatus::Build(BuildSnapshot {
                    number: detail.number,
                    building: detail.building,
                    result: detail.result.as_deref().map(BuildResult::from_server),
                    url: detail.url,
                    duration_ms: detail.duration,
                    built_by: detail.built_by,
                }))
            }
            401 => Err(JenkinsError::Auth),
            404 => Err(JenkinsError::NotFound),
            code => Err(JenkinsError::Unexpected {
                status: code,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Fetch the plain-text console log of one build, size-capped.
    ///
    /// The body is streamed and accumulation stops at the cap so a
    /// runaway log cannot exhaust memory.
    pub async fn console_log(&self, build_number: u64) -> Result<String> {
        let url = format!(
            "{}/{}/{build_number}/consoleText",
            self.base_url,
            job_url_path(&self.job)
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.token))
            .header(reqwest::header::ACCEPT, "text/plain")
            .timeout(self.log_timeout)
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            401 => return Err(JenkinsError::Auth),
            404 => return Err(JenkinsError::NotFound),
            code => {
                return Err(JenkinsError::Unexpected {
                    status: code,
                    message: response.text().await.unwrap_or_default(),
                })
            }
        }

        let mut buf: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let remaining = self.log_cap.saturating_sub(buf.len());
            if remaining == 0 {
                truncated = true;
                break;
            }
            let take = chunk.len().min(remaining);
            buf.extend_from_slice(&chunk[..take]);
            if take < chunk.len() {
                truncated = true;
                break;
            }
        }

        let mut log = String::from_utf8_lossy(&buf).into_owned();
        if truncated {
            warn!(build_number, cap = self.log_cap, "console log truncated at size cap");
            log.push_str(TRUNCATION_MARKER);
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> JenkinsClient {
        JenkinsClient::new(
            base_url,
            "builder",
            "secret",
            "team/web/app",
            BuildParams::default(),
            1024 * 1024,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    // --- Path translation ---

    #[test]
    fn job_path_translation_nests_every_segment() {
        assert_eq!(job_url_path("app"), "job/app");
        assert_eq!(job_url_path("team/web/app"), "job/team/job/web/job/app");
    }

    #[test]
    fn job_path_translation_round_trips() {
        for job in ["app", "team/app", "team/web/app", "a/b/c/d"] {
            assert_eq!(job_from_url_path(&job_url_path(job)), job);
        }
    }

    // --- Trigger ---

    #[tokio::test]
    async fn trigger_plain_job_posts_to_build_endpoint() {
        let mut server = mockito::Server::new_async().await;

        let info = server
            .mock("GET", "/job/team/job/web/job/app/api/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"lastBuild": null, "property": []}"#)
            .create_async()
            .await;
        let crumb = server
            .mock("GET", "/crumbIssuer/api/json")
            .with_status(404)
            .create_async()
            .await;
        let build = server
            .mock("POST", "/job/team/job/web/job/app/build")
            .with_status(201)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client.trigger_build().await.unwrap();

        info.assert_async().await;
        crumb.assert_async().await;
        build.assert_async().await;
    }

    #[tokio::test]
    async fn trigger_parameterized_job_posts_default_params() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/job/team/job/web/job/app/api/json")
            .with_status(200)
            .with_body(
                r#"{"lastBuild": null, "property": [{"_class": "hudson.model.ParametersDefinitionProperty"}]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/crumbIssuer/api/json")
            .with_status(200)
            .with_body(r#"{"crumbRequestField": "Jenkins-Crumb", "crumb": "c0ffee"}"#)
            .create_async()
            .await;
        let build = server
            .mock("POST", "/job/team/job/web/job/app/buildWithParameters")
            .match_header("Jenkins-Crumb", "c0ffee")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("TAG".into(), "origin/develop".into()),
                mockito::Matcher::UrlEncoded("APP_ENV".into(), "test".into()),
            ]))
            .with_status(201)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client.trigger_build().await.unwrap();
        build.assert_async().await;
    }

    #[tokio::test]
    async fn trigger_maps_auth_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/api/json")
            .with_status(200)
            .with_body(r#"{"lastBuild": null, "property": []}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/crumbIssuer/api/json")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("POST", "/job/team/job/web/job/app/build")
            .with_status(401)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(matches!(
            client.trigger_build().await,
            Err(JenkinsError::Auth)
        ));
    }

    #[tokio::test]
    async fn trigger_distinguishes_no_changes_from_generic_400() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/api/json")
            .with_status(200)
            .with_body(r#"{"lastBuild": null, "property": []}"#)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/crumbIssuer/api/json")
            .with_status(404)
            .expect(2)
            .create_async()
            .await;
        let no_changes = server
            .mock("POST", "/job/team/job/web/job/app/build")
            .with_status(400)
            .with_body("Nothing is submitted")
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(matches!(
            client.trigger_build().await,
            Err(JenkinsError::NoChanges(_))
        ));
        no_changes.remove_async().await;

        server
            .mock("POST", "/job/team/job/web/job/app/build")
            .with_status(400)
            .with_body("bad form data")
            .create_async()
            .await;
        assert!(matches!(
            client.trigger_build().await,
            Err(JenkinsError::Unexpected { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn trigger_falls_back_to_plain_endpoint_when_metadata_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/api/json")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/crumbIssuer/api/json")
            .with_status(404)
            .create_async()
            .await;
        let build = server
            .mock("POST", "/job/team/job/web/job/app/build")
            .with_status(200)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client.trigger_build().await.unwrap();
        build.assert_async().await;
    }

    // --- Status ---

    #[tokio::test]
    async fn status_of_never_built_job_is_not_built() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/api/json")
            .with_status(200)
            .with_body(r#"{"lastBuild": null, "property": []}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let status = client.check_build_status().await.unwrap();
        assert!(matches!(status, BuildStatus::NotBuilt));
    }

    #[tokio::test]
    async fn status_fetches_last_build_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/api/json")
            .with_status(200)
            .with_body(r#"{"lastBuild": {"number": 42, "url": "ignored"}, "property": []}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/job/team/job/web/job/app/42/api/json")
            .with_status(200)
            .with_body(
                r#"{"number": 42, "building": false, "result": "FAILURE",
                   "url": "http://ci/job/app/42/", "duration": 93000, "builtBy": "timer"}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let status = client.check_build_status().await.unwrap();
        let snap = status.snapshot().unwrap();
        assert_eq!(snap.number, 42);
        assert!(!snap.building);
        assert_eq!(snap.result, Some(BuildResult::Failure));
        assert_eq!(snap.duration_ms, Some(93000));
    }

    #[tokio::test]
    async fn status_while_building_has_no_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/api/json")
            .with_status(200)
            .with_body(r#"{"lastBuild": {"number": 7}, "property": []}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/job/team/job/web/job/app/7/api/json")
            .with_status(200)
            .with_body(r#"{"number": 7, "building": true, "result": null, "url": ""}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let snap = client.check_build_status().await.unwrap();
        let snap = snap.snapshot().unwrap().clone();
        assert!(snap.building);
        assert!(snap.result.is_none());
    }

    // --- Console logs ---

    #[tokio::test]
    async fn console_log_fetches_plain_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/42/consoleText")
            .with_status(200)
            .with_body("Started by timer\nERROR in src/main.js\n")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let log = client.console_log(42).await.unwrap();
        assert!(log.contains("ERROR in src/main.js"));
    }

    #[tokio::test]
    async fn console_log_is_capped_with_marker() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/9/consoleText")
            .with_status(200)
            .with_body("x".repeat(4096))
            .create_async()
            .await;

        let mut client = test_client(&server.url());
        client.log_cap = 1000;
        let log = client.console_log(9).await.unwrap();
        assert!(log.len() < 4096);
        assert!(log.contains("log truncated"));
    }

    #[tokio::test]
    async fn console_log_missing_build_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/web/job/app/9/consoleText")
            .with_status(404)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(matches!(
            client.console_log(9).await,
            Err(JenkinsError::NotFound)
        ));
    }
}
