//! Decoding of structured model replies.
//!
//! Models regularly wrap the JSON they were asked for in Markdown code
//! fences, sometimes with a language tag. Every structured call site goes
//! through this module: best-effort strip of the known wrapper patterns,
//! then a strict parse. The typed fallback on failure belongs to the
//! caller.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty reply")]
    Empty,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Strip a Markdown code-fence wrapper from a model reply, if present.
///
/// Handles ``` and ```lang opening fences and a trailing closing fence.
/// Text without fences passes through untouched (minus surrounding
/// whitespace).
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the optional language tag on the opening fence line.
    let body = match rest.split_once('\n') {
        Some((_tag, body)) => body,
        None => return trimmed,
    };

    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim()
}

/// Strip wrappers, then strictly parse the reply as JSON.
pub fn decode_json<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let cleaned = strip_code_fences(reply);
    if cleaned.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_str(cleaned)?)
}

/// Strip wrappers from a reply that is expected to be plain text
/// (e.g. corrected source code).
pub fn clean_text(reply: &str) -> String {
    strip_code_fences(reply).to_string()
}
