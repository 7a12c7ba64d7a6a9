//! Core types for xcauto

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// A build log discovered in the artifact cache.
///
/// Re-derived on every poll; never cache one across polling iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLogInfo {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Decoded build diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedBuildResults {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_status: Option<String>,
    /// Set on the terminal result produced after the decoder retry budget
    /// is spent; the log may still be in the middle of being written.
    #[serde(default)]
    pub decoder_failed: bool,
}

impl ParsedBuildResults {
    /// Append unless an identical entry already exists
    pub fn push_error(&mut self, entry: impl Into<String>) {
        push_unique(&mut self.errors, entry.into());
    }

    pub fn push_warning(&mut self, entry: impl Into<String>) {
        push_unique(&mut self.warnings, entry.into());
    }

    /// Terminal result carrying a synthetic diagnostic
    pub fn decoder_failure(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            warnings: Vec::new(),
            build_status: None,
            decoder_failed: true,
        }
    }

    pub fn classify(&self) -> BuildClassification {
        if !self.errors.is_empty() {
            BuildClassification::Failure
        } else if !self.warnings.is_empty() {
            BuildClassification::Warnings
        } else {
            BuildClassification::Success
        }
    }
}

fn push_unique(list: &mut Vec<String>, entry: String) {
    if !list.contains(&entry) {
        list.push(entry);
    }
}

/// Final state of a build-like action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildClassification {
    Success,
    Warnings,
    Failure,
    TimedOut,
}

impl BuildClassification {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Warnings)
    }
}

impl std::fmt::Display for BuildClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Warnings => "success with warnings",
            Self::Failure => "failure",
            Self::TimedOut => "timed out",
        };
        write!(f, "{}", s)
    }
}

/// A single typed block of output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

/// Output envelope returned to callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.content.push(ContentBlock::Text { text: text.into() });
    }

    /// All text blocks joined by blank lines
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserves_order() {
        let mut results = ParsedBuildResults::default();
        results.push_error("a.swift:1:1: boom");
        results.push_error("b.swift:2: bang");
        results.push_error("a.swift:1:1: boom");
        assert_eq!(results.errors, vec!["a.swift:1:1: boom", "b.swift:2: bang"]);
    }

    #[test]
    fn test_classification() {
        let mut results = ParsedBuildResults::default();
        assert_eq!(results.classify(), BuildClassification::Success);
        results.push_warning("Unknown file: deprecated");
        assert_eq!(results.classify(), BuildClassification::Warnings);
        results.push_error("Unknown file: failed");
        assert_eq!(results.classify(), BuildClassification::Failure);
    }

    #[test]
    fn test_content_block_serialization() {
        let output = ToolOutput::text("done");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "done");
    }
}
