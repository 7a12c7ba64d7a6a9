//! `xcrun xcresulttool` invocations

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use xcauto_common::{CommandRunner, CommandSpec, Error, Result};

const TOOL: &str = "xcresulttool";

/// Condensed `get test-results summary` output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub total_test_count: u64,
    #[serde(default)]
    pub passed_tests: u64,
    #[serde(default)]
    pub failed_tests: u64,
    #[serde(default)]
    pub skipped_tests: u64,
    #[serde(default)]
    pub expected_failures: u64,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub finish_time: Option<f64>,
    #[serde(default)]
    pub test_failures: Vec<SummaryFailure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryFailure {
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub target_name: Option<String>,
    #[serde(default)]
    pub failure_text: String,
    #[serde(default)]
    pub test_identifier_string: Option<String>,
}

impl TestSummary {
    pub fn duration(&self) -> Option<f64> {
        match (self.start_time, self.finish_time) {
            (Some(start), Some(finish)) if finish >= start => Some(finish - start),
            _ => None,
        }
    }
}

/// Thin wrapper around the query CLI scoped to one bundle
#[derive(Clone)]
pub struct XcResultTool {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
    bundle: PathBuf,
}

impl XcResultTool {
    pub fn new(runner: Arc<dyn CommandRunner>, bundle: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: "xcrun".to_string(),
            timeout: Duration::from_secs(60),
            bundle: bundle.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    fn command(&self, args: &[&str]) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program, self.timeout);
        if self.program.ends_with("xcrun") {
            spec = spec.arg(TOOL);
        }
        spec.args(args.iter().copied())
            .arg("--path")
            .arg(self.bundle.to_string_lossy())
    }

    async fn query(&self, args: &[&str]) -> Result<String> {
        let spec = self.command(args);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            let stderr = output.stderr.trim();
            return Err(Error::external(
                TOOL,
                if stderr.is_empty() {
                    format!("exit code {:?}", output.exit_code)
                } else {
                    stderr.to_string()
                },
            ));
        }
        Ok(output.stdout)
    }

    pub async fn summary(&self) -> Result<TestSummary> {
        let json = self.query(&["get", "test-results", "summary", "--compact"]).await?;
        serde_json::from_str(&json).map_err(|e| Error::unexpected(TOOL, format!("summary: {}", e)))
    }

    /// Raw JSON of the full test tree
    pub async fn tests_json(&self) -> Result<String> {
        self.query(&["get", "test-results", "tests", "--compact"]).await
    }

    /// Raw JSON activities for one test identifier
    pub async fn activities_json(&self, test_id: &str) -> Result<serde_json::Value> {
        let json = self
            .query(&["get", "test-results", "activities", "--test-id", test_id, "--compact"])
            .await?;
        serde_json::from_str(&json)
            .map_err(|e| Error::unexpected(TOOL, format!("activities for {}: {}", test_id, e)))
    }

    /// Console log text for the whole run
    pub async fn console_log(&self) -> Result<String> {
        self.query(&["get", "log", "--type", "console"]).await
    }

    /// Materialize an object payload at `output`
    pub async fn export_object(&self, id: &str, output: &Path) -> Result<()> {
        let output_str = output.to_string_lossy();
        debug!("Exporting {} to {}", id, output.display());
        self.query(&[
            "export",
            "object",
            "--legacy",
            "--id",
            id,
            "--output-path",
            &output_str,
            "--type",
            "file",
        ])
        .await?;
        if !output.exists() {
            return Err(Error::unexpected(
                TOOL,
                format!("export of {} produced no file", id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use xcauto_common::CommandOutput;

    struct Recorder {
        seen: Mutex<Vec<CommandSpec>>,
        reply: CommandOutput,
    }

    #[async_trait]
    impl CommandRunner for Recorder {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.seen.lock().unwrap().push(spec.clone());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_summary_command_and_parse() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            reply: CommandOutput::ok(
                r#"{"title":"Test - MyApp","result":"Failed","totalTestCount":3,"passedTests":1,"failedTests":1,"skippedTests":1,"expectedFailures":0,"startTime":100.0,"finishTime":112.5,"testFailures":[{"testName":"testBadPassword()","failureText":"boom"}]}"#,
            ),
        });
        let tool = XcResultTool::new(recorder.clone(), "/tmp/Run.xcresult");

        let summary = tool.summary().await.unwrap();
        assert_eq!(summary.failed_tests, 1);
        assert_eq!(summary.duration(), Some(12.5));
        assert_eq!(summary.test_failures[0].failure_text, "boom");

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].program, "xcrun");
        assert_eq!(
            seen[0].args,
            vec!["xcresulttool", "get", "test-results", "summary", "--compact", "--path", "/tmp/Run.xcresult"]
        );
    }

    #[tokio::test]
    async fn test_failure_surfaces_stderr() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            reply: CommandOutput::failed(1, "Error: bundle is invalid"),
        });
        let tool = XcResultTool::new(recorder, "/tmp/Bad.xcresult");
        let err = tool.console_log().await.unwrap_err();
        assert!(err.to_string().contains("bundle is invalid"));
    }
}
