//! Prompt construction and log excerpting for the analysis and fix calls.
//!
//! Prompts ask for strict output (JSON or bare source) so the decode step
//! stays simple; the excerpt helpers keep the analysis call bounded on
//! very large console logs.

use crate::types::Issue;

/// Markers that identify the interesting section of a failed build log.
///
/// When one of these appears we feed the model the window around the last
/// occurrence instead of the whole log.
const FAILURE_MARKERS: &[&str] = &[
    "error during build",
    "[vite]",
    "Module not found",
    "ERROR in",
    "npm ERR!",
    "SyntaxError",
    "Failed to compile",
];

/// Lines of context kept on either side of a failure marker.
const MARKER_CONTEXT_LINES: usize = 40;

/// Build the analysis prompt for one failed build.
pub fn analysis_prompt(build_number: u64, build_url: &str, log_excerpt: &str) -> String {
    format!(
        r#"You are a build engineer. Build #{build_number} failed ({build_url}).

Extract the build-breaking issues from the console log below and classify
each one. Valid values for "type" are exactly: syntax_error,
dependency_error, configuration_error, module_resolution_error, other.
Valid values for "severity" and "priority" are: high, medium, low.

Respond with a single JSON object and nothing else: no prose, no
Markdown fences:

{{
  "needs_fix": true,
  "issues": [
    {{"type": "syntax_error", "file": "src/example.js", "message": "...", "line": 1, "severity": "high"}}
  ],
  "summary": "one-line description of the failure",
  "recommendations": ["..."],
  "priority": "high"
}}

Set "needs_fix" to false only when the log shows no source-level problem
(e.g. infrastructure flake). Console log:

{log_excerpt}"#
    )
}

/// Prompt for a corrected version of one source file.
pub fn source_fix_prompt(issue: &Issue, source: &str) -> String {
    let location = issue
        .line
        .map(|line| format!(" (around line {line})"))
        .unwrap_or_default();
    format!(
        r#"The build failed with this error in `{file}`{location}:

{message}

Below is the current content of the file. Return the complete corrected
file and nothing else: no commentary, no Markdown fences.

{source}"#,
        file = issue.file,
        message = issue.message,
    )
}

/// Prompt specialized to repairing a broken import reference.
pub fn import_fix_prompt(issue: &Issue, source: &str) -> String {
    format!(
        r#"The build failed because `{file}` references a module that cannot be
resolved:

{message}

Fix or remove the broken import. Below is the current content of the
file. Return the complete corrected file and nothing else: no
commentary, no Markdown fences.

{source}"#,
        file = issue.file,
        message = issue.message,
    )
}

/// Prompt for a corrected project manifest.
pub fn manifest_fix_prompt(issue: &Issue, manifest: &str) -> String {
    format!(
        r#"The build failed with a dependency error:

{message}

Below is the project manifest. Return the complete corrected manifest as
valid JSON and nothing else: no commentary, no Markdown fences.

{manifest}"#,
        message = issue.message,
    )
}

/// Prompt for a corrected configuration file.
pub fn config_fix_prompt(issue: &Issue, content: &str) -> String {
    format!(
        r#"The build failed with a configuration error in `{file}`:

{message}

Below is the current content of the configuration file. Return the
complete corrected file and nothing else: no commentary, no Markdown
fences.

{content}"#,
        file = issue.file,
        message = issue.message,
    )
}

/// Produce the bounded excerpt of a console log fed to the analyzer.
///
/// Prefers the window around the last recognizable failure marker; falls
/// back to middle truncation preserving head and tail.
pub fn failure_excerpt(log: &str, head_bytes: usize, tail_bytes: usize) -> String {
    if log.len() <= head_bytes + tail_bytes {
        return log.to_string();
    }

    if let Some(section) = marker_section(log) {
        if section.len() <= head_bytes + tail_bytes {
            return section;
        }
        return truncate_middle(&section, head_bytes, tail_bytes);
    }

    truncate_middle(log, head_bytes, tail_bytes)
}

/// Window of lines around the last failure marker, if any marker matches.
fn marker_section(log: &str) -> Option<String> {
    let lines: Vec<&str> = log.lines().collect();
    let marker_idx = lines
        .iter()
        .rposition(|line| FAILURE_MARKERS.iter().any(|m| line.contains(m)))?;

    let start = marker_idx.saturating_sub(MARKER_CONTEXT_LINES);
    let end = (marker_idx + MARKER_CONTEXT_LINES + 1).min(lines.len());
    Some(lines[start..end].join("\n"))
}

/// Drop the middle of an oversized text, keeping head and tail.
pub fn truncate_middle(text: &str, head_bytes: usize, tail_bytes: usize) -> String {
    if text.len() <= head_bytes + tail_bytes {
        return text.to_string();
    }

    let head_end = floor_char_boundary(text, head_bytes);
    let tail_start = ceil_char_boundary(text, text.len() - tail_bytes);
    let omitted = tail_start - head_end;

    format!(
        "{}\n[... {omitted} bytes omitted ...]\n{}",
        &text[..head_end],
        &text[tail_start..]
    )
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
