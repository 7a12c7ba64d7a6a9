//! Build-log decoding through `xclogparser`

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use xcauto_common::{
    CommandRunner, CommandSpec, Diagnostics, Error, ParsedBuildResults, Result,
};

use crate::config::DecoderConfig;

const TOOL: &str = "xclogparser";

/// Substrings (lowercase) that mark a log still being written
const TRANSIENT_SIGNATURES: &[&str] = &[
    "corrupted",
    "incomplete",
    "unexpected end",
    "not a valid slf",
    "error while parsing",
    "truncated",
];

pub fn is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Fixed delay table with an attempt cap
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>, max_attempts: u32) -> Self {
        Self {
            delays,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(
            config
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            config.max_attempts,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the `failure`-th transient failure (0-based)
    pub fn delay_after(&self, failure: usize) -> Duration {
        self.delays
            .get(failure)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or_default()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DecoderConfig::default())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Issue {
    #[serde(default, rename = "documentURL")]
    document_url: Option<String>,
    #[serde(default)]
    starting_line_number: Option<u64>,
    #[serde(default)]
    starting_column_number: Option<u64>,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct IssuesReport {
    #[serde(default)]
    errors: Option<Vec<Issue>>,
    #[serde(default)]
    warnings: Option<Vec<Issue>>,
}

impl Issue {
    /// `file[:line[:col]]: title`
    fn render(&self) -> String {
        let file = self
            .document_url
            .as_deref()
            .map(document_path)
            .filter(|path| !path.is_empty());

        let location = match file {
            None => "Unknown file".to_string(),
            Some(file) => match (self.starting_line_number, self.starting_column_number) {
                (Some(line), Some(col)) if line > 0 && col > 0 => format!("{}:{}:{}", file, line, col),
                (Some(line), _) if line > 0 => format!("{}:{}", file, line),
                _ => file,
            },
        };
        format!("{}: {}", location, self.title.trim())
    }
}

/// Percent-decoded path of a `file://` URL, or the raw value
fn document_path(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|| raw.to_string())
}

/// Parse `xclogparser --reporter issues` JSON
pub fn parse_issues(json: &str) -> Result<ParsedBuildResults> {
    let report: IssuesReport =
        serde_json::from_str(json).map_err(|e| Error::unexpected(TOOL, e.to_string()))?;
    let mut results = ParsedBuildResults::default();
    for issue in report.errors.unwrap_or_default() {
        results.push_error(issue.render());
    }
    for issue in report.warnings.unwrap_or_default() {
        results.push_warning(issue.render());
    }
    Ok(results)
}

/// Decodes build logs, retrying while they are still being written
#[derive(Clone)]
pub struct LogDecoder {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
    policy: RetryPolicy,
    diagnostics: Arc<dyn Diagnostics>,
}

impl LogDecoder {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        timeout: Duration,
        policy: RetryPolicy,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            timeout,
            policy,
            diagnostics,
        }
    }

    /// Decode a log.
    ///
    /// Transient corruption is retried per the policy. Once the budget is
    /// spent the result has `decoder_failed` set; it is not an error. A
    /// decoder that fails for any other reason is an error.
    pub async fn decode(&self, log: &Path) -> Result<ParsedBuildResults> {
        let mut last_failure = String::new();

        for attempt in 0..self.policy.max_attempts() {
            match self.decode_once(log).await {
                Ok(results) => {
                    if attempt > 0 {
                        self.diagnostics
                            .info(&format!("Decoded {} after {} retries", log.display(), attempt));
                    }
                    return Ok(results);
                }
                Err(Error::TransientParseFailure(message)) => {
                    last_failure = message;
                    if attempt + 1 < self.policy.max_attempts() {
                        let delay = self.policy.delay_after(attempt as usize);
                        self.diagnostics.debug(&format!(
                            "Build log not readable yet (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.policy.max_attempts(),
                            delay
                        ));
                        sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.diagnostics.warn(&format!(
            "Giving up on {} after {} attempts: {}",
            log.display(),
            self.policy.max_attempts(),
            last_failure
        ));
        Ok(ParsedBuildResults::decoder_failure(format!(
            "Unknown file: build log could not be decoded after {} attempts ({})",
            self.policy.max_attempts(),
            last_failure
        )))
    }

    async fn decode_once(&self, log: &Path) -> Result<ParsedBuildResults> {
        let spec = CommandSpec::new(&self.program, self.timeout)
            .arg("parse")
            .arg("--file")
            .arg(log.to_string_lossy())
            .arg("--reporter")
            .arg("issues");
        let output = self.runner.run(&spec).await?;

        if !output.success() {
            let message = format!("{}\n{}", output.stderr.trim(), output.stdout.trim());
            let message = message.trim().to_string();
            if is_transient(&message) {
                return Err(Error::TransientParseFailure(message));
            }
            return Err(Error::external(
                TOOL,
                if message.is_empty() {
                    format!("exit code {:?}", output.exit_code)
                } else {
                    message
                },
            ));
        }

        match parse_issues(&output.stdout) {
            Err(Error::UnexpectedOutputFormat { message, .. }) if is_transient(&output.stderr) => {
                Err(Error::TransientParseFailure(message))
            }
            other => other,
        }
    }
}
