//! Result bundle access: tree, console, activities, attachments

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use xcauto_common::{Error, Result};

use crate::attachments::TestAttachment;
use crate::tool::{TestSummary, XcResultTool};
use crate::tree::{TestNode, TestTree};

/// Manifest whose stability marks a finished bundle
pub const BUNDLE_MANIFEST: &str = "Info.plist";

/// An opened `.xcresult` bundle
pub struct ResultBundle {
    tool: XcResultTool,
    tree: TestTree,
}

impl ResultBundle {
    /// Query the full test tree once; it is read-only afterwards
    pub async fn open(tool: XcResultTool) -> Result<Self> {
        let json = tool.tests_json().await?;
        let tree = TestTree::from_json(&json)?;
        debug!(
            "Opened {} ({} test cases)",
            tool.bundle().display(),
            tree.case_count()
        );
        Ok(Self { tool, tree })
    }

    pub fn path(&self) -> &Path {
        self.tool.bundle()
    }

    pub fn tree(&self) -> &TestTree {
        &self.tree
    }

    pub fn tool(&self) -> &XcResultTool {
        &self.tool
    }

    pub async fn summary(&self) -> Result<TestSummary> {
        self.tool.summary().await
    }

    /// Index, exact identifier, or substring
    pub fn find_node(&self, query: &str) -> Result<(usize, &TestNode)> {
        let id = self.tree.find_node(query)?;
        let node = self
            .tree
            .node(id)
            .ok_or_else(|| Error::Internal(format!("dangling node id {}", id)))?;
        Ok((id, node))
    }

    fn identifier_for(&self, query: &str) -> Result<String> {
        let (_, node) = self.find_node(query)?;
        node.node_identifier.clone().ok_or_else(|| {
            Error::Validation(format!(
                "'{}' has no test identifier; pick a test case",
                node.name
            ))
        })
    }

    /// Console output, sliced to one test when the log makes that possible
    pub async fn console_output(&self, query: Option<&str>) -> Result<String> {
        let log = self.tool.console_log().await?;
        let Some(query) = query else {
            return Ok(log);
        };
        let identifier = self.identifier_for(query)?;
        match slice_console_for_test(&log, &identifier) {
            Some(slice) => Ok(slice),
            None => Ok(format!(
                "Note: could not isolate console output for {}; showing the full log.\n\n{}",
                identifier, log
            )),
        }
    }

    pub async fn activities(&self, query: &str) -> Result<serde_json::Value> {
        let identifier = self.identifier_for(query)?;
        self.tool.activities_json(&identifier).await
    }

    /// Canonical attachment records for one test
    pub async fn attachments(&self, query: &str) -> Result<Vec<TestAttachment>> {
        let activities = self.activities(query).await?;
        Ok(TestAttachment::collect(&activities))
    }

    /// Export a payload to a fresh temp path
    pub async fn export_attachment(&self, payload_id: &str, filename: &str) -> Result<PathBuf> {
        let dir = std::env::temp_dir().join("xcauto-attachments");
        tokio::fs::create_dir_all(&dir).await?;
        let output = dir.join(format!("{}-{}", uuid::Uuid::new_v4(), sanitize_filename(filename)));
        self.tool.export_object(payload_id, &output).await?;
        info!("Exported attachment to {}", output.display());
        Ok(output)
    }

    /// Summary plus failing tests with their messages
    pub async fn report(&self) -> Result<TestRunReport> {
        let summary = self.summary().await?;
        let failures = self
            .tree
            .failed_cases()
            .into_iter()
            .map(|(index, node)| {
                let id = self
                    .tree
                    .find_node(&index.to_string())
                    .unwrap_or(self.tree.root_id());
                FailedTest {
                    index,
                    name: node.name.clone(),
                    identifier: node.node_identifier.clone(),
                    messages: self
                        .tree
                        .failure_messages(id)
                        .into_iter()
                        .map(String::from)
                        .collect(),
                }
            })
            .collect();
        Ok(TestRunReport {
            bundle: self.path().to_path_buf(),
            summary,
            failures,
        })
    }
}

/// A failing test case
#[derive(Debug, Clone, Serialize)]
pub struct FailedTest {
    pub index: usize,
    pub name: String,
    pub identifier: Option<String>,
    pub messages: Vec<String>,
}

/// What a test action produced
#[derive(Debug, Clone, Serialize)]
pub struct TestRunReport {
    pub bundle: PathBuf,
    pub summary: TestSummary,
    pub failures: Vec<FailedTest>,
}

impl TestRunReport {
    pub fn passed(&self) -> bool {
        self.summary.failed_tests == 0 && self.failures.is_empty()
    }

    pub fn to_text(&self) -> String {
        let s = &self.summary;
        let mut out = format!(
            "Tests {}: {} total, {} passed, {} failed, {} skipped",
            if self.passed() { "passed" } else { "failed" },
            s.total_test_count,
            s.passed_tests,
            s.failed_tests,
            s.skipped_tests
        );
        if let Some(duration) = s.duration() {
            out.push_str(&format!(" in {:.1}s", duration));
        }
        out.push_str(&format!("\nResult bundle: {}", self.bundle.display()));
        for failure in &self.failures {
            out.push_str(&format!(
                "\n  [{}] {}",
                failure.index,
                failure.identifier.as_deref().unwrap_or(&failure.name)
            ));
            for message in &failure.messages {
                out.push_str(&format!("\n      {}", message));
            }
        }
        out
    }
}

/// Manifest exists with the same non-zero size across two samples
pub async fn bundle_ready(bundle: &Path, interval: Duration) -> bool {
    let manifest = bundle.join(BUNDLE_MANIFEST);
    let Some(first) = file_size(&manifest).await else {
        return false;
    };
    sleep(interval).await;
    let Some(second) = file_size(&manifest).await else {
        return false;
    };
    first > 0 && first == second
}

/// Poll readiness up to `attempts` times, sleeping `interval` between polls
/// even when the manifest has not appeared yet
pub async fn wait_until_ready(bundle: &Path, interval: Duration, attempts: u32) -> Result<()> {
    for attempt in 1..=attempts {
        if bundle_ready(bundle, interval).await {
            return Ok(());
        }
        debug!("Bundle not ready yet (attempt {}/{})", attempt, attempts);
        if attempt < attempts {
            sleep(interval).await;
        }
    }
    Err(Error::Timeout {
        what: format!("{} to finish writing", bundle.display()),
        seconds: interval.as_secs() * u64::from(attempts),
    })
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == ':' || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.trim().is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

/// Lines from `Test Case '...' started` to its passed/failed/skipped line
pub fn slice_console_for_test(log: &str, identifier: &str) -> Option<String> {
    let (class, method) = split_identifier(identifier)?;
    let selector = format!("{} {}]", class, method);
    let is_marker = |line: &str| line.contains("Test Case") && line.contains(&selector);

    let lines: Vec<&str> = log.lines().collect();
    let start = lines
        .iter()
        .position(|line| is_marker(line) && line.contains("started"))?;
    let end = lines[start..]
        .iter()
        .position(|line| {
            is_marker(line)
                && (line.contains("passed") || line.contains("failed") || line.contains("skipped"))
        })
        .map(|offset| start + offset)
        .unwrap_or(lines.len() - 1);

    Some(lines[start..=end].join("\n"))
}

/// `Suite/testName()` -> (`Suite`, `testName`)
fn split_identifier(identifier: &str) -> Option<(&str, &str)> {
    let (class, method) = identifier.rsplit_once('/')?;
    let class = class.rsplit('/').next().unwrap_or(class);
    let method = method.trim_end_matches("()");
    (!class.is_empty() && !method.is_empty()).then_some((class, method))
}
