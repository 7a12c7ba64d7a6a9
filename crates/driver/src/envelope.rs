//! Output envelope: typed content blocks or a coded error

use xcauto_common::{BuildClassification, Error, ParsedBuildResults, Result, ToolOutput};
use xcauto_results::{ScreenshotResult, TestRunReport};

use crate::orchestrator::{
    ActionOutcome, BuildReport, CleanReport, DebugReport, Destination, TestReport, WorkspaceInfo,
};

/// Rendering of an operation's value into output content
pub trait IntoToolOutput {
    fn into_tool_output(self) -> Result<ToolOutput>;
}

/// Reportable errors and name misses become content; everything else is
/// raised with its code.
pub fn respond<T: IntoToolOutput>(result: Result<T>) -> Result<ToolOutput> {
    match result {
        Ok(value) => value.into_tool_output(),
        Err(e) if e.is_reportable() => Ok(ToolOutput::text(reportable_text(&e))),
        Err(e) => Err(e),
    }
}

fn reportable_text(error: &Error) -> String {
    match error {
        Error::NotFound {
            suggestion: Some(suggestion),
            ..
        } => format!("{} ({})", error, suggestion),
        _ => error.to_string(),
    }
}

impl<T: IntoToolOutput> IntoToolOutput for ActionOutcome<T> {
    fn into_tool_output(self) -> Result<ToolOutput> {
        match self {
            ActionOutcome::Completed(value) => value.into_tool_output(),
            ActionOutcome::NameNotFound(miss) => Ok(ToolOutput::text(miss.to_string())),
        }
    }
}

fn build_failed(results: &ParsedBuildResults) -> Error {
    Error::BuildFailed {
        count: results.errors.len(),
        summary: results.errors.join("\n"),
    }
}

impl IntoToolOutput for BuildReport {
    /// Decoded errors fail the calling operation
    fn into_tool_output(self) -> Result<ToolOutput> {
        if self.classification == BuildClassification::Failure {
            return Err(build_failed(&self.results));
        }
        Ok(ToolOutput::text(self.to_text()))
    }
}

impl IntoToolOutput for ParsedBuildResults {
    fn into_tool_output(self) -> Result<ToolOutput> {
        let classification = self.classify();
        if classification == BuildClassification::Failure {
            return Err(build_failed(&self));
        }
        let mut text = format!("Log decoded: {}", classification);
        for warning in &self.warnings {
            text.push_str(&format!("\n  - {}", warning));
        }
        Ok(ToolOutput::text(text))
    }
}

impl IntoToolOutput for TestReport {
    fn into_tool_output(self) -> Result<ToolOutput> {
        Ok(ToolOutput::text(self.to_text()))
    }
}

impl IntoToolOutput for TestRunReport {
    fn into_tool_output(self) -> Result<ToolOutput> {
        Ok(ToolOutput::text(self.to_text()))
    }
}

impl IntoToolOutput for CleanReport {
    fn into_tool_output(self) -> Result<ToolOutput> {
        Ok(ToolOutput::text(self.to_text()))
    }
}

impl IntoToolOutput for DebugReport {
    fn into_tool_output(self) -> Result<ToolOutput> {
        let mut text = format!("Debug session started (action {})", self.action_id);
        if let Some(scheme) = &self.scheme {
            text.push_str(&format!(" for scheme '{}'", scheme));
        }
        if self.skip_building {
            text.push_str(", build skipped");
        }
        Ok(ToolOutput::text(text))
    }
}

impl IntoToolOutput for ScreenshotResult {
    fn into_tool_output(self) -> Result<ToolOutput> {
        Ok(ToolOutput::text(self.to_text()))
    }
}

impl IntoToolOutput for Vec<Destination> {
    fn into_tool_output(self) -> Result<ToolOutput> {
        let lines: Vec<String> = self
            .iter()
            .map(|d| match (&d.platform, &d.architecture) {
                (Some(p), Some(a)) => format!("{} ({}, {})", d.name, p, a),
                (Some(p), None) => format!("{} ({})", d.name, p),
                _ => d.name.clone(),
            })
            .collect();
        Ok(ToolOutput::text(lines.join("\n")))
    }
}

impl IntoToolOutput for WorkspaceInfo {
    fn into_tool_output(self) -> Result<ToolOutput> {
        Ok(ToolOutput::text(format!(
            "{} ({})\nLoaded: {}\nScheme: {}\nDestination: {}",
            self.name,
            self.path,
            self.loaded,
            self.active_scheme.as_deref().unwrap_or("-"),
            self.active_run_destination.as_deref().unwrap_or("-")
        )))
    }
}

impl IntoToolOutput for Vec<String> {
    fn into_tool_output(self) -> Result<ToolOutput> {
        Ok(ToolOutput::text(self.join("\n")))
    }
}

impl IntoToolOutput for String {
    fn into_tool_output(self) -> Result<ToolOutput> {
        Ok(ToolOutput::text(self))
    }
}

impl IntoToolOutput for () {
    fn into_tool_output(self) -> Result<ToolOutput> {
        Ok(ToolOutput::text("OK"))
    }
}
