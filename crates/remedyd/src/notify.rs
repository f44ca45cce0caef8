//! Notification sink.
//!
//! Fire-and-forget webhook for build-status messages. Delivery failures
//! are logged and swallowed; the orchestrator's state transitions never
//! depend on this module.

use std::time::Duration;

use chrono::{DateTime, Utc};
use remedy_core::types::BuildSnapshot;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct Notification<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<&'a BuildSnapshot>,
    timestamp: DateTime<Utc>,
}

/// Webhook notification sink.
#[derive(Debug, Clone)]
pub struct Notifier {
    url: String,
    http: reqwest::Client,
}

impl Notifier {
    /// `None` when no notify URL is configured.
    pub fn from_url(url: &str, timeout: Duration) -> Option<Self> {
        if url.is_empty() {
            return None;
        }
        let http = reqwest::Client::builder().timeout(timeout).build().ok()?;
        Some(Self {
            url: url.to_string(),
            http,
        })
    }

    /// Deliver one build-status message; never fails the caller.
    pub async fn send(&self, text: &str, build: Option<&BuildSnapshot>) {
        let payload = Notification {
            text,
            build,
            timestamp: Utc::now(),
        };
        match self.http.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("notification delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "notification sink returned an error");
            }
            Err(err) => {
                warn!(error = %err, "notification delivery failed");
            }
        }
    }
}
