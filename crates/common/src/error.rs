//! Error types for xcauto

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using xcauto Error
pub type Result<T> = std::result::Result<T, Error>;

/// A scheme or destination that could not be matched against the live list.
///
/// The suggestion is advisory only; nothing is ever substituted for the
/// requested name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameMiss {
    pub kind: String,
    pub requested: String,
    pub candidates: Vec<String>,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for NameMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}' not found", self.kind, self.requested)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{}'?)", suggestion)?;
        }
        if !self.candidates.is_empty() {
            write!(f, ". Available: {}", self.candidates.join(", "))?;
        }
        Ok(())
    }
}

/// xcauto error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound {
        kind: String,
        id: String,
        suggestion: Option<String>,
    },

    #[error("{0}")]
    NameNotFound(NameMiss),

    #[error("{tool} failed: {message}")]
    ExternalToolFailure { tool: String, message: String },

    #[error("Transient parse failure: {0}")]
    TransientParseFailure(String),

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Unexpected output from {tool}: {message}")]
    UnexpectedOutputFormat { tool: String, message: String },

    #[error("Build failed with {count} error(s):\n{summary}")]
    BuildFailed { count: usize, summary: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
            suggestion: None,
        }
    }

    pub fn external(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ExternalToolFailure {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn unexpected(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::UnexpectedOutputFormat {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Machine-readable code carried across the output boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Validation(_) => "invalid_params",
            Error::NotFound { .. } | Error::NameNotFound(_) => "not_found",
            Error::ExternalToolFailure { .. } => "external_tool_failure",
            Error::TransientParseFailure(_) => "transient_parse_failure",
            Error::Timeout { .. } => "timeout",
            Error::UnexpectedOutputFormat { .. } => "unexpected_output",
            Error::BuildFailed { .. } => "build_failed",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Errors that belong in result content rather than being raised.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::NotFound { .. } | Error::NameNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_miss_display() {
        let miss = NameMiss {
            kind: "Scheme".to_string(),
            requested: "MyAp".to_string(),
            candidates: vec!["MyApp".to_string(), "MyAppTests".to_string()],
            suggestion: Some("MyApp".to_string()),
        };
        let text = Error::NameNotFound(miss).to_string();
        assert!(text.contains("Scheme 'MyAp' not found"));
        assert!(text.contains("did you mean 'MyApp'"));
        assert!(text.contains("MyApp, MyAppTests"));
    }

    #[test]
    fn test_codes_and_reportability() {
        assert_eq!(Error::Validation("x".into()).code(), "invalid_params");
        assert!(Error::not_found("Test", "3").is_reportable());
        let timeout = Error::Timeout {
            what: "build log".into(),
            seconds: 5,
        };
        assert_eq!(timeout.code(), "timeout");
        assert!(!timeout.is_reportable());
    }
}
