//! Build-log analysis.
//!
//! Turns raw console text into a structured, classified list of issues
//! via the model capability. Decode failures degrade to a typed default
//! so one malformed reply can never stall the remediation pipeline; only
//! a failed model call itself surfaces as an error.

use std::sync::Arc;

use remedy_core::decode;
use remedy_core::prompt;
use remedy_core::types::AnalysisResult;
use tracing::{debug, warn};

use crate::model::{ModelClient, ModelError};

/// Log analyzer over a model capability.
pub struct LogAnalyzer<M: ModelClient> {
    model: Arc<M>,
    head_bytes: usize,
    tail_bytes: usize,
}

impl<M: ModelClient> LogAnalyzer<M> {
    pub fn new(model: Arc<M>, head_bytes: usize, tail_bytes: usize) -> Self {
        Self {
            model,
            head_bytes,
            tail_bytes,
        }
    }

    /// Analyze one failed build's console log.
    ///
    /// `Err` means the model call itself failed; a reply that completes
    /// but does not decode yields the degraded default instead.
    pub async fn analyze(
        &self,
        build_number: u64,
        log: &str,
        build_url: &str,
    ) -> Result<AnalysisResult, ModelError> {
        let excerpt = prompt::failure_excerpt(log, self.head_bytes, self.tail_bytes);
        debug!(
            build_number,
            log_len = log.len(),
            excerpt_len = excerpt.len(),
            "analyzing build log"
        );

        let request = prompt::analysis_prompt(build_number, build_url, &excerpt);
        let reply = self.model.invoke(&request).await?;

        match decode::decode_json::<AnalysisResult>(&reply) {
            Ok(analysis) => Ok(analysis),
            Err(err) => {
                warn!(build_number, error = %err, "analysis reply did not decode, degrading");
                Ok(AnalysisResult::degraded(&err.to_string()))
            }
        }
    }
}
